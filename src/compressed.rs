//! Compressed database: one CSV record per original sequence.
//!
//! A record holds the sequence name followed by four fields per coarse
//! link: coarse id, start, end and the edit script. A sibling index file
//! stores an 8-byte big-endian offset to the start of each record, so a
//! single sequence can be reconstructed with two seeks.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::edit_script::EditScript;
use crate::error::{io_error, ParalogError, Result};
use crate::fasta::OriginalSeq;

pub const FILE_COMPRESSED: &str = "compressed";
pub const FILE_COMPRESSED_INDEX: &str = "compressed.index";

/// A slice of a coarse sequence plus the edit script that turns it into
/// a slice of the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToCoarse {
    pub coarse_seq_id: u32,
    pub coarse_start: u16,
    pub coarse_end: u16,
    pub diff: String,
}

impl LinkToCoarse {
    pub fn no_diff(coarse_seq_id: u32, coarse_start: u16, coarse_end: u16) -> LinkToCoarse {
        LinkToCoarse {
            coarse_seq_id,
            coarse_start,
            coarse_end,
            diff: String::new(),
        }
    }
}

/// An original sequence expressed as an ordered list of coarse links.
/// Applying every link's script to its coarse slice and concatenating
/// the results yields the original residue string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSeq {
    pub id: u32,
    pub name: String,
    pub links: Vec<LinkToCoarse>,
}

impl CompressedSeq {
    pub fn new(id: u32, name: String) -> CompressedSeq {
        CompressedSeq {
            id,
            name,
            links: Vec::new(),
        }
    }

    pub fn add(&mut self, link: LinkToCoarse) {
        self.links.push(link);
    }

    /// Render the CSV record, including the terminating newline.
    pub fn to_record(&self) -> Vec<u8> {
        let mut fields = Vec::with_capacity(1 + self.links.len() * 4);
        fields.push(self.name.clone());
        for link in &self.links {
            fields.push(link.coarse_seq_id.to_string());
            fields.push(link.coarse_start.to_string());
            fields.push(link.coarse_end.to_string());
            fields.push(link.diff.clone());
        }
        let mut w = csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_writer(Vec::new());
        w.write_record(&fields).expect("writing to memory");
        w.into_inner().expect("flushing to memory")
    }

    /// Parse a CSV record back into a compressed sequence.
    pub fn parse_record(id: u32, record: &[u8]) -> Result<CompressedSeq> {
        let mut r = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(record);
        let mut rec = csv::StringRecord::new();
        let got = r
            .read_record(&mut rec)
            .map_err(|e| ParalogError::EditScriptSyntax(format!("record {id}: {e}")))?;
        if !got || rec.len() == 0 {
            return Err(ParalogError::EditScriptSyntax(format!("record {id} is empty")));
        }
        if (rec.len() - 1) % 4 != 0 {
            return Err(ParalogError::EditScriptSyntax(format!(
                "record {id} has {} fields, expected a name plus groups of four",
                rec.len()
            )));
        }

        fn field<T: std::str::FromStr>(id: u32, f: &str) -> Result<T> {
            f.parse::<T>().map_err(|_| {
                ParalogError::EditScriptSyntax(format!("record {id}: '{f}' is not a number"))
            })
        }

        let mut seq = CompressedSeq::new(id, rec[0].to_string());
        for chunk in 1..=(rec.len() - 1) / 4 {
            let base = 1 + (chunk - 1) * 4;
            seq.add(LinkToCoarse {
                coarse_seq_id: field(id, &rec[base])?,
                coarse_start: field(id, &rec[base + 1])?,
                coarse_end: field(id, &rec[base + 2])?,
                diff: rec[base + 3].to_string(),
            });
        }
        Ok(seq)
    }
}

/// Append-only writer for the record and index streams. Owned by the
/// single writer thread during compression.
pub struct CompressedWriter {
    records: BufWriter<File>,
    index: BufWriter<File>,
    records_path: PathBuf,
    index_path: PathBuf,
    offset: u64,
    count: u32,
}

impl CompressedWriter {
    pub fn open(dir: &Path) -> Result<CompressedWriter> {
        let records_path = dir.join(FILE_COMPRESSED);
        let index_path = dir.join(FILE_COMPRESSED_INDEX);
        let records_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&records_path)
            .map_err(|e| io_error("opening", &records_path, e))?;
        let offset = records_file
            .metadata()
            .map_err(|e| io_error("inspecting", &records_path, e))?
            .len();
        let index_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .map_err(|e| io_error("opening", &index_path, e))?;
        let count = (index_file
            .metadata()
            .map_err(|e| io_error("inspecting", &index_path, e))?
            .len()
            / 8) as u32;
        Ok(CompressedWriter {
            records: BufWriter::new(records_file),
            index: BufWriter::new(index_file),
            records_path,
            index_path,
            offset,
            count,
        })
    }

    /// Next original id this writer expects.
    pub fn next_id(&self) -> u32 {
        self.count
    }

    pub fn write(&mut self, seq: &CompressedSeq) -> Result<()> {
        let record = seq.to_record();
        self.index
            .write_all(&self.offset.to_be_bytes())
            .map_err(|e| io_error("writing", &self.index_path, e))?;
        self.records
            .write_all(&record)
            .map_err(|e| io_error("writing", &self.records_path, e))?;
        self.offset += record.len() as u64;
        self.count += 1;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.records
            .flush()
            .map_err(|e| io_error("writing", &self.records_path, e))?;
        self.index
            .flush()
            .map_err(|e| io_error("writing", &self.index_path, e))?;
        Ok(())
    }
}

/// Random-access reader over the record and index streams.
pub struct CompressedReader {
    records: File,
    index: File,
    records_path: PathBuf,
    index_path: PathBuf,
    count: u32,
}

impl CompressedReader {
    pub fn open(dir: &Path) -> Result<CompressedReader> {
        let records_path = dir.join(FILE_COMPRESSED);
        let index_path = dir.join(FILE_COMPRESSED_INDEX);
        let records =
            File::open(&records_path).map_err(|e| io_error("opening", &records_path, e))?;
        let index = File::open(&index_path).map_err(|e| io_error("opening", &index_path, e))?;
        let count = (index
            .metadata()
            .map_err(|e| io_error("inspecting", &index_path, e))?
            .len()
            / 8) as u32;
        Ok(CompressedReader {
            records,
            index,
            records_path,
            index_path,
            count,
        })
    }

    pub fn num_sequences(&self) -> u32 {
        self.count
    }

    /// Read the raw compressed record of one original sequence.
    pub fn read_record(&mut self, id: u32) -> Result<CompressedSeq> {
        if id >= self.count {
            return Err(ParalogError::IndexOutOfRange {
                id,
                len: self.count,
            });
        }
        self.index
            .seek(SeekFrom::Start(id as u64 * 8))
            .map_err(|e| io_error("seeking", &self.index_path, e))?;
        let mut offset_buf = [0u8; 8];
        self.index
            .read_exact(&mut offset_buf)
            .map_err(|e| io_error("reading", &self.index_path, e))?;
        let offset = u64::from_be_bytes(offset_buf);

        self.records
            .seek(SeekFrom::Start(offset))
            .map_err(|e| io_error("seeking", &self.records_path, e))?;
        let mut line = Vec::new();
        BufReader::new(&mut self.records)
            .read_until(b'\n', &mut line)
            .map_err(|e| io_error("reading", &self.records_path, e))?;
        CompressedSeq::parse_record(id, &line)
    }

    /// Reconstruct one original sequence against the coarse residues.
    pub fn read_seq(&mut self, coarse: &[Vec<u8>], id: u32) -> Result<OriginalSeq> {
        let cseq = self.read_record(id)?;
        let mut residues = Vec::new();
        for link in &cseq.links {
            let cor = coarse.get(link.coarse_seq_id as usize).ok_or(
                ParalogError::SequenceOutOfRange {
                    id: link.coarse_seq_id,
                    len: coarse.len() as u32,
                },
            )?;
            let (start, end) = (link.coarse_start as usize, link.coarse_end as usize);
            if start > end || end > cor.len() {
                return Err(ParalogError::EditScriptSyntax(format!(
                    "record {id}: link range [{start}, {end}) outside coarse sequence {}",
                    link.coarse_seq_id
                )));
            }
            let script = EditScript::parse(&link.diff)?;
            residues.extend_from_slice(&script.apply(&cor[start..end])?);
        }
        Ok(OriginalSeq {
            id,
            name: cseq.name,
            residues,
        })
    }
}
