use std::path::Path;

use paralog::{filter_residues, Db, DbParams, DbReader, Pool};

/// Parameters small enough that short test sequences can actually match.
fn small_params() -> DbParams {
    DbParams {
        min_match_len: 8,
        match_kmer_size: 3,
        map_seed_size: 3,
        ext_seed_size: 1,
        ..DbParams::default()
    }
}

fn build_db(dir: &Path, params: DbParams, workers: usize, inputs: &[(&str, &[u8])]) {
    let db = Db::create(dir, params, false).unwrap();
    let mut pool = Pool::start(&db, workers).unwrap();
    for (name, residues) in inputs {
        pool.compress(name.to_string(), filter_residues(residues))
            .unwrap();
    }
    pool.finish().unwrap();
    db.save(false).unwrap();
}

#[test]
fn compress_then_expand_returns_the_originals() {
    let dir = tempfile::tempdir().unwrap();
    build_db(
        dir.path(),
        DbParams::default(),
        1,
        &[
            ("one", b"MSEQUENCEONE"),
            ("two", b"MSEQUENCEONEANDSOMEDIFFERENT"),
        ],
    );

    let mut reader = DbReader::open(dir.path()).unwrap();
    assert_eq!(reader.num_sequences(), 2);
    let first = reader.read_seq(0).unwrap();
    assert_eq!(first.name, "one");
    assert_eq!(first.residues, filter_residues(b"MSEQUENCEONE"));
    let second = reader.read_seq(1).unwrap();
    assert_eq!(second.residues, filter_residues(b"MSEQUENCEONEANDSOMEDIFFERENT"));
}

#[test]
fn short_input_becomes_one_identity_link() {
    let dir = tempfile::tempdir().unwrap();
    build_db(dir.path(), small_params(), 1, &[("tiny", b"MSTNPK")]);

    let mut reader = DbReader::open(dir.path()).unwrap();
    let record = {
        let mut r = paralog::CompressedReader::open(dir.path()).unwrap();
        r.read_record(0).unwrap()
    };
    assert_eq!(record.links.len(), 1);
    assert_eq!(record.links[0].coarse_seq_id, 0);
    assert_eq!(record.links[0].coarse_start, 0);
    assert_eq!(record.links[0].coarse_end, 6);
    assert_eq!(record.links[0].diff, "");
    assert_eq!(reader.coarse_residues(0).unwrap(), b"MSTNPK");
    assert_eq!(reader.read_seq(0).unwrap().residues, b"MSTNPK");
}

#[test]
fn prefix_of_a_coarse_sequence_compresses_to_one_link() {
    let dir = tempfile::tempdir().unwrap();
    let long = b"MSTNPKPQRKTKRNTNRRPQDVKFPGG";
    // A prefix the ungapped extender covers exactly (a multiple of the
    // match k-mer size), so no tail stretching is needed.
    let prefix = &long[..18];
    build_db(
        dir.path(),
        small_params(),
        1,
        &[("long", long), ("prefix", prefix)],
    );

    let mut r = paralog::CompressedReader::open(dir.path()).unwrap();
    let record = r.read_record(1).unwrap();
    assert_eq!(record.links.len(), 1, "links: {:?}", record.links);
    assert_eq!(record.links[0].coarse_seq_id, 0);
    assert_eq!(record.links[0].coarse_start, 0);
    assert_eq!(record.links[0].coarse_end, prefix.len() as u16);
    assert_eq!(record.links[0].diff, "");

    let mut reader = DbReader::open(dir.path()).unwrap();
    assert_eq!(reader.read_seq(1).unwrap().residues, prefix);
}

#[test]
fn divergent_sequences_round_trip_under_many_workers() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<(String, Vec<u8>)> = (0..40)
        .map(|i| {
            let name = format!("seq{i}");
            let mut residues = b"MSTNPKPQRKTKRNTNRRPQDVKFPGGDEERRKHLI".to_vec();
            residues.rotate_left(i % 7);
            residues.extend(std::iter::repeat(b"GAVLIMFW"[i % 8]).take(i % 5));
            (name, residues)
        })
        .collect();
    let borrowed: Vec<(&str, &[u8])> = inputs
        .iter()
        .map(|(n, r)| (n.as_str(), r.as_slice()))
        .collect();
    build_db(dir.path(), small_params(), 4, &borrowed);

    let mut reader = DbReader::open(dir.path()).unwrap();
    assert_eq!(reader.num_sequences(), 40);
    for (i, (name, residues)) in inputs.iter().enumerate() {
        let seq = reader.read_seq(i as u32).unwrap();
        assert_eq!(&seq.name, name, "name of sequence {i}");
        assert_eq!(seq.residues, filter_residues(residues), "residues of sequence {i}");
    }
}

#[test]
fn appended_sequences_extend_the_database() {
    let dir = tempfile::tempdir().unwrap();
    build_db(
        dir.path(),
        small_params(),
        1,
        &[("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG")],
    );

    let params = DbParams::load(dir.path()).unwrap();
    let db = Db::append(dir.path(), params).unwrap();
    let mut pool = Pool::start(&db, 1).unwrap();
    pool.compress("b".to_string(), b"MSTNPKPQRKTKRNTNRRPQ".to_vec())
        .unwrap();
    pool.compress("c".to_string(), b"GAVLIMFWPSTCYNQDEKRHGAVLIMFW".to_vec())
        .unwrap();
    pool.finish().unwrap();
    db.save(false).unwrap();

    let mut reader = DbReader::open(dir.path()).unwrap();
    assert_eq!(reader.num_sequences(), 3);
    assert_eq!(reader.read_seq(0).unwrap().residues, b"MSTNPKPQRKTKRNTNRRPQDVKFPGG");
    assert_eq!(reader.read_seq(1).unwrap().residues, b"MSTNPKPQRKTKRNTNRRPQ");
    assert_eq!(reader.read_seq(2).unwrap().residues, b"GAVLIMFWPSTCYNQDEKRHGAVLIMFW");
}

#[test]
fn cancelled_pools_still_finish_accepted_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::create(dir.path(), small_params(), false).unwrap();
    let mut pool = Pool::start(&db, 2).unwrap();
    pool.compress("a".to_string(), b"MSTNPKPQRKTKRNTNRRPQDVKFPGG".to_vec())
        .unwrap();
    pool.compress("b".to_string(), b"GAVLIMFWPSTCYNQDEKRH".to_vec())
        .unwrap();
    pool.cancel();
    assert!(matches!(
        pool.compress("c".to_string(), b"MSTNPK".to_vec()),
        Err(paralog::ParalogError::WorkerCancelled)
    ));
    let written = pool.finish().unwrap();
    assert_eq!(written, 2);
    db.save(false).unwrap();

    let mut reader = DbReader::open(dir.path()).unwrap();
    assert_eq!(reader.num_sequences(), 2);
    assert_eq!(reader.read_seq(1).unwrap().name, "b");
}
