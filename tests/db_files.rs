use std::fs;
use std::path::Path;

use paralog::{
    filter_residues, num_sequences, Db, DbParams, DbReader, Pool, FILE_COARSE_FASTA,
    FILE_COARSE_FASTA_INDEX, FILE_COARSE_LINKS, FILE_COARSE_LINKS_INDEX, FILE_COMPRESSED,
    FILE_COMPRESSED_INDEX, FILE_PARAMS,
};

fn params() -> DbParams {
    DbParams {
        min_match_len: 8,
        match_kmer_size: 3,
        map_seed_size: 3,
        ext_seed_size: 1,
        ..DbParams::default()
    }
}

fn build(dir: &Path, inputs: &[(&str, &[u8])]) {
    let db = Db::create(dir, params(), false).unwrap();
    let mut pool = Pool::start(&db, 1).unwrap();
    for (name, residues) in inputs {
        pool.compress(name.to_string(), filter_residues(residues))
            .unwrap();
    }
    pool.finish().unwrap();
    db.save(true).unwrap();
}

fn be64_at(bytes: &[u8], i: usize) -> u64 {
    u64::from_be_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap())
}

#[test]
fn params_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path(), &[("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG")]);

    let text = fs::read_to_string(dir.path().join(FILE_PARAMS)).unwrap();
    assert!(text.contains("map-seed-size:3"));
    assert!(text.contains("min-match-len:8"));

    let loaded = DbParams::load(dir.path()).unwrap();
    assert_eq!(loaded, params());
}

#[test]
fn unknown_params_keys_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(FILE_PARAMS), "no-such-knob:1\n").unwrap();
    assert!(matches!(
        DbParams::load(dir.path()),
        Err(paralog::ParalogError::Config(_))
    ));
}

#[test]
fn fasta_index_entries_point_at_record_starts() {
    let dir = tempfile::tempdir().unwrap();
    build(
        dir.path(),
        &[
            ("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG"),
            ("b", b"GAVLIMFWPSTCYNQDEKRH"),
        ],
    );

    let fasta = fs::read(dir.path().join(FILE_COARSE_FASTA)).unwrap();
    let index = fs::read(dir.path().join(FILE_COARSE_FASTA_INDEX)).unwrap();
    assert_eq!(index.len() % 8, 0);
    let n = index.len() / 8;
    assert_eq!(num_sequences(dir.path()).unwrap(), n as u32);

    for id in 0..n {
        let offset = be64_at(&index, id) as usize;
        assert_eq!(fasta[offset], b'>', "record {id} offset");
        let header: String = fasta[offset..]
            .iter()
            .take_while(|&&b| b != b'\n')
            .map(|&b| b as char)
            .collect();
        assert_eq!(header, format!("> {id}"));
    }
}

#[test]
fn compressed_index_offsets_are_ascending_and_valid() {
    let dir = tempfile::tempdir().unwrap();
    build(
        dir.path(),
        &[
            ("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG"),
            ("b", b"GAVLIMFWPSTCYNQDEKRH"),
            ("c", b"MSTNPKPQRKTKRNTNRR"),
        ],
    );

    let records = fs::read(dir.path().join(FILE_COMPRESSED)).unwrap();
    let index = fs::read(dir.path().join(FILE_COMPRESSED_INDEX)).unwrap();
    assert_eq!(index.len(), 3 * 8);

    let names = ["a", "b", "c"];
    let mut prev = None;
    for id in 0..3 {
        let offset = be64_at(&index, id) as usize;
        if let Some(p) = prev {
            assert!(offset > p, "offsets must ascend");
        }
        prev = Some(offset);
        // Each record starts with its sequence name.
        let rest = &records[offset..];
        assert!(rest.starts_with(names[id].as_bytes()));
        // Offset 0 for the first record.
        if id == 0 {
            assert_eq!(offset, 0);
        }
    }
}

#[test]
fn links_file_sections_match_their_index() {
    let dir = tempfile::tempdir().unwrap();
    build(
        dir.path(),
        &[
            ("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG"),
            ("b", b"GAVLIMFWPSTCYNQDEKRH"),
        ],
    );

    let links = fs::read(dir.path().join(FILE_COARSE_LINKS)).unwrap();
    let index = fs::read(dir.path().join(FILE_COARSE_LINKS_INDEX)).unwrap();
    let n = index.len() / 8;
    assert_eq!(n, num_sequences(dir.path()).unwrap() as usize);

    let mut expected_offset = 0u64;
    for id in 0..n {
        let offset = be64_at(&index, id);
        assert_eq!(offset, expected_offset, "section offset of coarse {id}");
        let count = u32::from_be_bytes(links[offset as usize..offset as usize + 4].try_into().unwrap());
        assert!(count >= 1, "every coarse sequence backs at least one original");
        expected_offset += 4 + 8 * count as u64;
    }
    assert_eq!(expected_offset, links.len() as u64);
}

#[test]
fn plain_dumps_are_written_on_request() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path(), &[("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG")]);
    assert!(dir.path().join("coarse.links.plain").exists());
    assert!(dir.path().join("coarse.seeds.plain").exists());
}

#[test]
fn requesting_past_the_index_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path(), &[("a", b"MSTNPKPQRKTKRNTNRRPQDVKFPGG")]);

    let mut reader = DbReader::open(dir.path()).unwrap();
    assert!(matches!(
        reader.read_seq(5),
        Err(paralog::ParalogError::IndexOutOfRange { id: 5, len: 1 })
    ));
}
