//! FASTA intake and output.
//!
//! The intake wraps `bio`'s FASTA reader and normalizes records the way
//! the compressor expects: residues are uppercased and the ignorable
//! residues J, O and U are rewritten to X before anything else sees
//! them. Output writing is done by hand so callers can account for
//! every byte.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use bio::io::fasta;

use crate::alphabet::IGNORED_RESIDUES;
use crate::error::{io_error, ParalogError, Result};

/// An input sequence, immutable once read. `id` is its position in the
/// input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalSeq {
    pub id: u32,
    pub name: String,
    pub residues: Vec<u8>,
}

/// Rewrite a raw residue string into the compressor's alphabet.
pub fn filter_residues(residues: &[u8]) -> Vec<u8> {
    residues
        .iter()
        .map(|&b| {
            let b = b.to_ascii_uppercase();
            if IGNORED_RESIDUES.contains(&b) {
                b'X'
            } else {
                b
            }
        })
        .collect()
}

/// Iterator over the normalized sequences of one FASTA file.
pub struct FastaSource {
    records: fasta::Records<BufReader<File>>,
    path: std::path::PathBuf,
    next_id: u32,
}

impl FastaSource {
    /// Open `path`, continuing the id sequence at `next_id`.
    pub fn open(path: &Path, next_id: u32) -> Result<FastaSource> {
        let file = File::open(path).map_err(|e| io_error("opening", path, e))?;
        Ok(FastaSource {
            records: fasta::Reader::new(file).records(),
            path: path.to_path_buf(),
            next_id,
        })
    }
}

impl Iterator for FastaSource {
    type Item = Result<OriginalSeq>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(r) => r,
            Err(e) => return Some(Err(io_error("reading", &self.path, e))),
        };
        if record.id().is_empty() {
            return Some(Err(ParalogError::Config(format!(
                "'{}' contains a sequence with an empty name",
                self.path.display()
            ))));
        }
        let name = match record.desc() {
            Some(desc) => format!("{} {}", record.id(), desc),
            None => record.id().to_string(),
        };
        let id = self.next_id;
        self.next_id += 1;
        Some(Ok(OriginalSeq {
            id,
            name,
            residues: filter_residues(record.seq()),
        }))
    }
}

/// Write one FASTA record with the sequence on a single line.
pub fn write_fasta_record<W: Write>(w: &mut W, name: &str, residues: &[u8]) -> std::io::Result<()> {
    write!(w, ">{name}\n")?;
    w.write_all(residues)?;
    w.write_all(b"\n")
}
