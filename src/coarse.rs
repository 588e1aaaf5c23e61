//! Coarse database: representative sequences and their back-links.
//!
//! Coarse sequences are created when a compressor worker flushes an
//! unmatched region; they are immutable once created and are never
//! removed during a run. The sequence list sits behind one read-write
//! lock; each sequence carries its own lock for back-link appends, which
//! are O(1) and contended by many workers.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{io_error, ParalogError, Result};
use crate::seeds::SeedTable;

pub const FILE_COARSE_FASTA: &str = "coarse.fasta";
pub const FILE_COARSE_FASTA_INDEX: &str = "coarse.fasta.index";
pub const FILE_COARSE_LINKS: &str = "coarse.links";
pub const FILE_COARSE_LINKS_INDEX: &str = "coarse.links.index";
pub const FILE_COARSE_SEEDS: &str = "coarse.seeds";
pub const FILE_COARSE_LINKS_PLAIN: &str = "coarse.links.plain";
pub const FILE_COARSE_SEEDS_PLAIN: &str = "coarse.seeds.plain";

/// A range of a coarse sequence that appears, modulo an edit script, in
/// the named original sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackLink {
    pub orig_seq_id: u32,
    pub coarse_start: u16,
    pub coarse_end: u16,
}

pub struct CoarseSeq {
    pub id: u32,
    pub residues: Vec<u8>,
    links: Mutex<Vec<BackLink>>,
}

impl CoarseSeq {
    fn new(id: u32, residues: Vec<u8>) -> CoarseSeq {
        CoarseSeq {
            id,
            residues,
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn add_link(&self, link: BackLink) {
        self.links.lock().unwrap().push(link);
    }

    /// Snapshot of the back-links. Only the set is meaningful; the order
    /// reflects worker scheduling.
    pub fn links(&self) -> Vec<BackLink> {
        self.links.lock().unwrap().clone()
    }
}

pub struct CoarseDB {
    seqs: RwLock<Vec<Arc<CoarseSeq>>>,
    pub seeds: SeedTable,
    /// First coarse id created by this run; earlier ids were loaded from
    /// disk and their FASTA records are already persisted.
    start_index: usize,
}

impl CoarseDB {
    pub fn new(seed_size: usize, seed_low_complexity: usize) -> CoarseDB {
        CoarseDB {
            seqs: RwLock::new(Vec::new()),
            seeds: SeedTable::new(seed_size, seed_low_complexity),
            start_index: 0,
        }
    }

    /// Append a new coarse sequence and index its K-mers.
    ///
    /// The residues are copied; incoming slices may alias reader
    /// buffers. Seed insertion happens after the sequence is visible in
    /// the list, so a worker that finds a seed can always resolve it.
    pub fn add(&self, residues: &[u8]) -> (u32, Arc<CoarseSeq>) {
        let seq;
        let id;
        {
            let mut seqs = self.seqs.write().unwrap();
            id = seqs.len() as u32;
            seq = Arc::new(CoarseSeq::new(id, residues.to_vec()));
            seqs.push(Arc::clone(&seq));
        }
        self.seeds.add(id, &seq.residues);
        (id, seq)
    }

    pub fn seq(&self, id: u32) -> Option<Arc<CoarseSeq>> {
        self.seqs.read().unwrap().get(id as usize).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.seqs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_residues(&self) -> u64 {
        self.seqs
            .read()
            .unwrap()
            .iter()
            .map(|s| s.residues.len() as u64)
            .sum()
    }

    /// Append this run's new sequences to the coarse FASTA and its
    /// byte-offset index.
    pub fn save_fasta(&self, dir: &Path) -> Result<()> {
        let fasta_path = dir.join(FILE_COARSE_FASTA);
        let index_path = dir.join(FILE_COARSE_FASTA_INDEX);

        let fasta_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&fasta_path)
            .map_err(|e| io_error("opening", &fasta_path, e))?;
        let mut offset = fasta_file
            .metadata()
            .map_err(|e| io_error("inspecting", &fasta_path, e))?
            .len();
        let mut fasta = BufWriter::new(fasta_file);

        let index_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .map_err(|e| io_error("opening", &index_path, e))?;
        let mut index = BufWriter::new(index_file);

        let seqs = self.seqs.read().unwrap();
        for seq in seqs.iter().skip(self.start_index) {
            index
                .write_all(&offset.to_be_bytes())
                .map_err(|e| io_error("writing", &index_path, e))?;
            let header = format!("> {}\n", seq.id);
            fasta
                .write_all(header.as_bytes())
                .and_then(|_| fasta.write_all(&seq.residues))
                .and_then(|_| fasta.write_all(b"\n"))
                .map_err(|e| io_error("writing", &fasta_path, e))?;
            offset += header.len() as u64 + seq.residues.len() as u64 + 1;
        }
        fasta
            .flush()
            .map_err(|e| io_error("writing", &fasta_path, e))?;
        index
            .flush()
            .map_err(|e| io_error("writing", &index_path, e))?;
        Ok(())
    }

    /// Rewrite the links file and its index from the in-memory state.
    /// Back-link sections of old sequences can grow during an append
    /// run, so these two files are always written whole.
    pub fn save_links(&self, dir: &Path) -> Result<()> {
        let links_path = dir.join(FILE_COARSE_LINKS);
        let index_path = dir.join(FILE_COARSE_LINKS_INDEX);

        let mut links = BufWriter::new(
            File::create(&links_path).map_err(|e| io_error("creating", &links_path, e))?,
        );
        let mut index = BufWriter::new(
            File::create(&index_path).map_err(|e| io_error("creating", &index_path, e))?,
        );

        let mut offset = 0u64;
        let seqs = self.seqs.read().unwrap();
        for seq in seqs.iter() {
            index
                .write_all(&offset.to_be_bytes())
                .map_err(|e| io_error("writing", &index_path, e))?;
            let seq_links = seq.links();
            links
                .write_all(&(seq_links.len() as u32).to_be_bytes())
                .map_err(|e| io_error("writing", &links_path, e))?;
            for link in &seq_links {
                links
                    .write_all(&link.orig_seq_id.to_be_bytes())
                    .and_then(|_| links.write_all(&link.coarse_start.to_be_bytes()))
                    .and_then(|_| links.write_all(&link.coarse_end.to_be_bytes()))
                    .map_err(|e| io_error("writing", &links_path, e))?;
            }
            offset += 4 + 8 * seq_links.len() as u64;
        }
        links
            .flush()
            .map_err(|e| io_error("writing", &links_path, e))?;
        index
            .flush()
            .map_err(|e| io_error("writing", &index_path, e))?;
        Ok(())
    }

    /// Text rendering of every back-link for debugging.
    pub fn save_links_plain(&self, dir: &Path) -> Result<()> {
        let path = dir.join(FILE_COARSE_LINKS_PLAIN);
        let file = File::create(&path).map_err(|e| io_error("creating", &path, e))?;
        let mut w = csv::Writer::from_writer(BufWriter::new(file));
        let seqs = self.seqs.read().unwrap();
        for seq in seqs.iter() {
            for link in seq.links() {
                w.write_record(&[
                    seq.id.to_string(),
                    link.orig_seq_id.to_string(),
                    link.coarse_start.to_string(),
                    link.coarse_end.to_string(),
                ])
                .map_err(|e| io_error("writing", &path, std::io::Error::other(e)))?;
            }
        }
        w.flush().map_err(|e| io_error("writing", &path, e))?;
        Ok(())
    }

    pub fn save_seeds(&self, dir: &Path) -> Result<()> {
        self.seeds.save(&dir.join(FILE_COARSE_SEEDS))
    }

    pub fn save_seeds_plain(&self, dir: &Path) -> Result<()> {
        self.seeds.save_plain(&dir.join(FILE_COARSE_SEEDS_PLAIN))
    }

    /// Rebuild the in-memory state of an existing database so that more
    /// sequences can be appended to it.
    pub fn open_for_append(dir: &Path, seed_size: usize, seed_low_complexity: usize) -> Result<CoarseDB> {
        let residues = load_coarse_fasta(dir)?;
        let db = CoarseDB::new(seed_size, seed_low_complexity);
        {
            let mut seqs = db.seqs.write().unwrap();
            for (id, res) in residues.into_iter().enumerate() {
                seqs.push(Arc::new(CoarseSeq::new(id as u32, res)));
            }
        }
        {
            let seqs = db.seqs.read().unwrap();
            let links_path = dir.join(FILE_COARSE_LINKS);
            let index_path = dir.join(FILE_COARSE_LINKS_INDEX);
            let mut links =
                File::open(&links_path).map_err(|e| io_error("opening", &links_path, e))?;
            let mut index =
                File::open(&index_path).map_err(|e| io_error("opening", &index_path, e))?;
            for seq in seqs.iter() {
                for link in read_link_section(&mut links, &mut index, seq.id, seqs.len() as u32)? {
                    seq.add_link(link);
                }
            }
        }
        db.seeds.load(&dir.join(FILE_COARSE_SEEDS))?;
        let mut db = db;
        db.start_index = db.len();
        Ok(db)
    }
}

/// Number of coarse sequences persisted in `dir`, from the FASTA index
/// size.
pub fn num_sequences(dir: &Path) -> Result<u32> {
    let path = dir.join(FILE_COARSE_FASTA_INDEX);
    let len = std::fs::metadata(&path)
        .map_err(|e| io_error("inspecting", &path, e))?
        .len();
    Ok((len / 8) as u32)
}

/// Load every coarse residue string from the FASTA file.
pub fn load_coarse_fasta(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let path = dir.join(FILE_COARSE_FASTA);
    let file = File::open(&path).map_err(|e| io_error("opening", &path, e))?;
    let mut seqs: Vec<Vec<u8>> = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| io_error("reading", &path, e))?;
        if let Some(stripped) = line.strip_prefix('>') {
            let id: u32 = stripped.trim().parse().map_err(|_| {
                ParalogError::Internal(format!(
                    "coarse FASTA header '>{stripped}' is not a sequence id"
                ))
            })?;
            if id as usize != seqs.len() {
                return Err(ParalogError::Internal(format!(
                    "coarse FASTA id {id} out of order, expected {}",
                    seqs.len()
                )));
            }
            seqs.push(Vec::new());
        } else if let Some(seq) = seqs.last_mut() {
            seq.extend_from_slice(line.trim_end().as_bytes());
        }
    }
    Ok(seqs)
}

/// Read the persisted back-link section of one coarse sequence.
pub fn read_link_section(
    links: &mut File,
    links_index: &mut File,
    id: u32,
    num_coarse: u32,
) -> Result<Vec<BackLink>> {
    let links_path = PathBuf::from(FILE_COARSE_LINKS);
    let index_path = PathBuf::from(FILE_COARSE_LINKS_INDEX);

    if id >= num_coarse {
        return Err(ParalogError::SequenceOutOfRange {
            id,
            len: num_coarse,
        });
    }

    links_index
        .seek(SeekFrom::Start(id as u64 * 8))
        .map_err(|e| io_error("seeking", &index_path, e))?;
    let mut offset_buf = [0u8; 8];
    links_index
        .read_exact(&mut offset_buf)
        .map_err(|e| io_error("reading", &index_path, e))?;
    let offset = u64::from_be_bytes(offset_buf);

    links
        .seek(SeekFrom::Start(offset))
        .map_err(|e| io_error("seeking", &links_path, e))?;
    let mut count_buf = [0u8; 4];
    links
        .read_exact(&mut count_buf)
        .map_err(|e| io_error("reading", &links_path, e))?;
    let count = u32::from_be_bytes(count_buf);

    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut rec = [0u8; 8];
        links
            .read_exact(&mut rec)
            .map_err(|e| io_error("reading", &links_path, e))?;
        out.push(BackLink {
            orig_seq_id: u32::from_be_bytes([rec[0], rec[1], rec[2], rec[3]]),
            coarse_start: u16::from_be_bytes([rec[4], rec[5]]),
            coarse_end: u16::from_be_bytes([rec[6], rec[7]]),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_insertion_order() {
        let db = CoarseDB::new(3, 6);
        let (id0, _) = db.add(b"ACDEFGHIK");
        let (id1, _) = db.add(b"LMNPQRSTV");
        assert_eq!((id0, id1), (0, 1));
        assert_eq!(db.len(), 2);
        assert_eq!(db.seq(1).unwrap().residues, b"LMNPQRSTV");
        assert!(db.seq(2).is_none());
    }

    #[test]
    fn added_sequences_are_seed_searchable() {
        let db = CoarseDB::new(3, 6);
        let (id, _) = db.add(b"ACDEFGHIK");
        let locs = db.seeds.lookup(b"CDE");
        assert!(locs.iter().any(|l| l.coarse_seq_id == id && l.residue_index == 1));
    }
}
