//! Database directory lifecycle and tuning parameters.
//!
//! A database directory holds the coarse FASTA and links, the
//! compressed stream, their byte-offset indexes, the optional seed file
//! and a human-editable `params` file recording the tuning knobs the
//! database was built with. `Db` is the write side used during
//! compression; `DbReader` is the seek-based read side used by the
//! decompress and search drivers.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use log::warn;

use crate::coarse::{self, CoarseDB, FILE_COARSE_LINKS, FILE_COARSE_LINKS_INDEX};
use crate::compressed::CompressedReader;
use crate::error::{io_error, ParalogError, Result};
use crate::fasta::OriginalSeq;

pub const FILE_PARAMS: &str = "params";

/// Tuning parameters, persisted as colon-separated `key:value` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParams {
    /// Minimum original-side length for an acceptable match.
    pub min_match_len: usize,
    /// K-mer size used by ungapped extension.
    pub match_kmer_size: usize,
    /// Window size of one gapped extension step.
    pub gapped_window_size: usize,
    /// Window size of one ungapped extension step.
    pub ungapped_window_size: usize,
    /// Identity percentage gate for extension windows.
    pub ext_seq_id_threshold: i32,
    /// Identity percentage gate for a whole match.
    pub match_seq_id_threshold: i32,
    /// Residues a match may be stretched to reach a boundary.
    pub match_extend: usize,
    /// Seed index K-mer size. Frozen once the database is created.
    pub map_seed_size: usize,
    /// Residues after a seed that must match exactly.
    pub ext_seed_size: usize,
    /// Repeat-region size for low-complexity skipping, 0 to disable.
    pub low_complexity: usize,
    /// Repeat-window size excluded from seeding.
    pub seed_low_complexity: usize,
    /// Databases created read-only carry no seed file and cannot be
    /// appended to.
    pub read_only: bool,
}

impl Default for DbParams {
    fn default() -> Self {
        DbParams {
            min_match_len: 40,
            match_kmer_size: 4,
            gapped_window_size: 25,
            ungapped_window_size: 10,
            ext_seq_id_threshold: 50,
            match_seq_id_threshold: 60,
            match_extend: 30,
            map_seed_size: 5,
            ext_seed_size: 4,
            low_complexity: 10,
            seed_low_complexity: 6,
            read_only: false,
        }
    }
}

impl DbParams {
    pub fn validate(&self) -> Result<()> {
        if self.min_match_len == 0 {
            return Err(ParalogError::Config("min-match-len must be positive".into()));
        }
        if self.match_kmer_size == 0 || self.ungapped_window_size == 0 || self.gapped_window_size == 0
        {
            return Err(ParalogError::Config(
                "window and k-mer sizes must be positive".into(),
            ));
        }
        if !(1..=8).contains(&self.map_seed_size) {
            return Err(ParalogError::Config(
                "map-seed-size must be between 1 and 8".into(),
            ));
        }
        for (name, v) in [
            ("ext-seq-id-threshold", self.ext_seq_id_threshold),
            ("match-seq-id-threshold", self.match_seq_id_threshold),
        ] {
            if !(0..=100).contains(&v) {
                return Err(ParalogError::Config(format!(
                    "{name} must be between 0 and 100, got {v}"
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(FILE_PARAMS);
        let mut out = String::new();
        out.push_str("# paralog database parameters\n");
        out.push_str(&format!("min-match-len:{}\n", self.min_match_len));
        out.push_str(&format!("match-kmer-size:{}\n", self.match_kmer_size));
        out.push_str(&format!("gapped-window-size:{}\n", self.gapped_window_size));
        out.push_str(&format!("ungapped-window-size:{}\n", self.ungapped_window_size));
        out.push_str(&format!("ext-seq-id-threshold:{}\n", self.ext_seq_id_threshold));
        out.push_str(&format!("match-seq-id-threshold:{}\n", self.match_seq_id_threshold));
        out.push_str(&format!("match-extend:{}\n", self.match_extend));
        out.push_str(&format!("map-seed-size:{}\n", self.map_seed_size));
        out.push_str(&format!("ext-seed-size:{}\n", self.ext_seed_size));
        out.push_str(&format!("low-complexity:{}\n", self.low_complexity));
        out.push_str(&format!("seed-low-complexity:{}\n", self.seed_low_complexity));
        out.push_str(&format!("read-only:{}\n", self.read_only));
        std::fs::write(&path, out).map_err(|e| io_error("writing", &path, e))
    }

    pub fn load(dir: &Path) -> Result<DbParams> {
        let path = dir.join(FILE_PARAMS);
        let file = File::open(&path).map_err(|e| io_error("opening", &path, e))?;
        let mut params = DbParams::default();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| io_error("reading", &path, e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                ParalogError::Config(format!("params line '{line}' is not key:value"))
            })?;
            let parse_usize = || {
                value.parse::<usize>().map_err(|_| {
                    ParalogError::Config(format!("params key '{key}' has bad value '{value}'"))
                })
            };
            let parse_i32 = || {
                value.parse::<i32>().map_err(|_| {
                    ParalogError::Config(format!("params key '{key}' has bad value '{value}'"))
                })
            };
            match key {
                "min-match-len" => params.min_match_len = parse_usize()?,
                "match-kmer-size" => params.match_kmer_size = parse_usize()?,
                "gapped-window-size" => params.gapped_window_size = parse_usize()?,
                "ungapped-window-size" => params.ungapped_window_size = parse_usize()?,
                "ext-seq-id-threshold" => params.ext_seq_id_threshold = parse_i32()?,
                "match-seq-id-threshold" => params.match_seq_id_threshold = parse_i32()?,
                "match-extend" => params.match_extend = parse_usize()?,
                "map-seed-size" => params.map_seed_size = parse_usize()?,
                "ext-seed-size" => params.ext_seed_size = parse_usize()?,
                "low-complexity" => params.low_complexity = parse_usize()?,
                "seed-low-complexity" => params.seed_low_complexity = parse_usize()?,
                "read-only" => {
                    params.read_only = value.parse::<bool>().map_err(|_| {
                        ParalogError::Config(format!("params key '{key}' has bad value '{value}'"))
                    })?
                }
                _ => {
                    return Err(ParalogError::Config(format!("unknown params key '{key}'")));
                }
            }
        }
        params.validate()?;
        Ok(params)
    }
}

/// Write side of a database directory.
pub struct Db {
    pub dir: PathBuf,
    pub params: DbParams,
    pub coarse: Arc<CoarseDB>,
}

impl Db {
    /// Create a fresh database directory.
    pub fn create(dir: &Path, params: DbParams, overwrite: bool) -> Result<Db> {
        params.validate()?;
        if dir.join(FILE_PARAMS).exists() {
            if !overwrite {
                return Err(ParalogError::Config(format!(
                    "database directory '{}' already exists; pass --append or --overwrite",
                    dir.display()
                )));
            }
            std::fs::remove_dir_all(dir).map_err(|e| io_error("removing", dir, e))?;
        }
        std::fs::create_dir_all(dir).map_err(|e| io_error("creating", dir, e))?;
        params.save(dir)?;
        let coarse = Arc::new(CoarseDB::new(params.map_seed_size, params.seed_low_complexity));
        Ok(Db {
            dir: dir.to_path_buf(),
            params,
            coarse,
        })
    }

    /// Open an existing database directory for appending. `params` must
    /// already carry the stored `map-seed-size`.
    pub fn append(dir: &Path, params: DbParams) -> Result<Db> {
        params.validate()?;
        if params.read_only {
            return Err(ParalogError::Config(format!(
                "database '{}' was created read-only and cannot be appended to",
                dir.display()
            )));
        }
        let coarse = Arc::new(CoarseDB::open_for_append(
            dir,
            params.map_seed_size,
            params.seed_low_complexity,
        )?);
        Ok(Db {
            dir: dir.to_path_buf(),
            params,
            coarse,
        })
    }

    /// Persist the coarse side of the database. The FASTA, links and
    /// seed files are independent and are written concurrently.
    pub fn save(&self, plain: bool) -> Result<()> {
        self.params.save(&self.dir)?;
        let mut results: Vec<Result<()>> = Vec::new();
        thread::scope(|scope| {
            let mut handles = Vec::new();
            handles.push(scope.spawn(|| self.coarse.save_fasta(&self.dir)));
            handles.push(scope.spawn(|| self.coarse.save_links(&self.dir)));
            if !self.params.read_only {
                handles.push(scope.spawn(|| self.coarse.save_seeds(&self.dir)));
            }
            if plain {
                handles.push(scope.spawn(|| self.coarse.save_links_plain(&self.dir)));
                handles.push(scope.spawn(|| self.coarse.save_seeds_plain(&self.dir)));
            }
            for handle in handles {
                results.push(handle.join().expect("save thread panicked"));
            }
        });
        results.into_iter().collect()
    }
}

/// Seek-based read side of a database directory.
pub struct DbReader {
    pub params: DbParams,
    coarse_residues: Vec<Vec<u8>>,
    links: File,
    links_index: File,
    compressed: CompressedReader,
}

impl DbReader {
    pub fn open(dir: &Path) -> Result<DbReader> {
        let params = DbParams::load(dir)?;
        let coarse_residues = coarse::load_coarse_fasta(dir)?;
        let links_path = dir.join(FILE_COARSE_LINKS);
        let links = File::open(&links_path).map_err(|e| io_error("opening", &links_path, e))?;
        let index_path = dir.join(FILE_COARSE_LINKS_INDEX);
        let links_index =
            File::open(&index_path).map_err(|e| io_error("opening", &index_path, e))?;
        let compressed = CompressedReader::open(dir)?;
        Ok(DbReader {
            params,
            coarse_residues,
            links,
            links_index,
            compressed,
        })
    }

    /// Number of original sequences in the database.
    pub fn num_sequences(&self) -> u32 {
        self.compressed.num_sequences()
    }

    pub fn num_coarse_sequences(&self) -> u32 {
        self.coarse_residues.len() as u32
    }

    pub fn coarse_residues(&self, id: u32) -> Option<&[u8]> {
        self.coarse_residues.get(id as usize).map(|v| v.as_slice())
    }

    /// Reconstruct one original sequence.
    pub fn read_seq(&mut self, id: u32) -> Result<OriginalSeq> {
        self.compressed.read_seq(&self.coarse_residues, id)
    }

    /// All original sequences whose link on coarse sequence `id`
    /// overlaps `[start, end)`, in link order, deduplicated.
    ///
    /// Records with malformed edit scripts are skipped with a warning so
    /// one corrupt record cannot sink a whole search.
    pub fn expand(&mut self, id: u32, start: usize, end: usize) -> Result<Vec<OriginalSeq>> {
        let num_coarse = self.coarse_residues.len() as u32;
        let links = coarse::read_link_section(&mut self.links, &mut self.links_index, id, num_coarse)?;

        let mut seen: HashSet<u32> = HashSet::new();
        let mut out = Vec::new();
        for link in links {
            if end < link.coarse_start as usize || start > link.coarse_end as usize {
                continue;
            }
            if !seen.insert(link.orig_seq_id) {
                continue;
            }
            match self.read_seq(link.orig_seq_id) {
                Ok(seq) => out.push(seq),
                Err(e @ ParalogError::EditScriptSyntax(_)) => {
                    warn!("skipping sequence {} during expansion: {e}", link.orig_seq_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Write every original sequence in `[first, last]` as FASTA.
    pub fn write_fasta_range<W: Write>(&mut self, w: &mut W, first: u32, last: u32) -> Result<()> {
        for id in first..=last {
            let seq = self.read_seq(id)?;
            crate::fasta::write_fasta_record(w, &seq.name, &seq.residues).map_err(|e| {
                io_error("writing", Path::new("<output>"), e)
            })?;
        }
        Ok(())
    }
}
