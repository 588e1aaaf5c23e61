//! Shared K-mer seed index over the coarse database.
//!
//! K-mers hash to one of `20^K` buckets in base-20 over the seed
//! alphabet. The whole table sits behind a single read-write lock:
//! lookups take it shared and return a snapshot of the bucket, inserts
//! and wipes take it exclusively. Buckets are boxed so empty buckets
//! cost one pointer.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::RwLock;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::alphabet::{seed_index, SEED_ALPHA_SIZE};
use crate::error::{io_error, ParalogError, Result};

/// Bytes of estimated memory per stored seed location.
const BYTES_PER_SEED: i64 = 16;

/// One occurrence of a K-mer in the coarse database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedLoc {
    pub coarse_seq_id: u32,
    pub residue_index: u16,
}

struct Buckets {
    buckets: Vec<Option<Box<Vec<SeedLoc>>>>,
    count: i64,
}

pub struct SeedTable {
    seed_size: usize,
    low_complexity_window: usize,
    inner: RwLock<Buckets>,
}

impl SeedTable {
    pub fn new(seed_size: usize, low_complexity_window: usize) -> SeedTable {
        let buckets = SEED_ALPHA_SIZE.pow(seed_size as u32);
        SeedTable {
            seed_size,
            low_complexity_window,
            inner: RwLock::new(Buckets {
                buckets: vec![None; buckets],
                count: 0,
            }),
        }
    }

    pub fn seed_size(&self) -> usize {
        self.seed_size
    }

    /// Base-20 bucket of a K-mer, or `None` if any residue does not seed.
    pub fn hash(&self, kmer: &[u8]) -> Option<usize> {
        debug_assert_eq!(kmer.len(), self.seed_size);
        let mut h = 0usize;
        for &b in kmer {
            h = h * SEED_ALPHA_SIZE + seed_index(b)?;
        }
        Some(h)
    }

    /// Register every K-mer of a freshly added coarse sequence.
    pub fn add(&self, coarse_seq_id: u32, residues: &[u8]) {
        let k = self.seed_size;
        if residues.len() < k {
            return;
        }
        let mut inner = self.inner.write().unwrap();
        for i in 0..residues.len() - k {
            // Residue indexes are stored as u16; anything past that
            // cannot be represented as a seed location.
            if i > u16::MAX as usize {
                break;
            }
            if is_low_complexity(residues, i, self.low_complexity_window) {
                continue;
            }
            let Some(h) = self.hash(&residues[i..i + k]) else {
                continue;
            };
            inner.buckets[h]
                .get_or_insert_with(|| Box::new(Vec::new()))
                .push(SeedLoc {
                    coarse_seq_id,
                    residue_index: i as u16,
                });
            inner.count += 1;
        }
    }

    /// Snapshot of the bucket holding `kmer`.
    pub fn lookup(&self, kmer: &[u8]) -> Vec<SeedLoc> {
        let Some(h) = self.hash(kmer) else {
            return Vec::new();
        };
        let inner = self.inner.read().unwrap();
        match &inner.buckets[h] {
            Some(bucket) => bucket.as_ref().clone(),
            None => Vec::new(),
        }
    }

    pub fn num_seeds(&self) -> i64 {
        self.inner.read().unwrap().count
    }

    /// Estimated memory footprint in bytes.
    pub fn estimated_bytes(&self) -> i64 {
        self.num_seeds() * BYTES_PER_SEED
    }

    /// Clear every bucket if the estimated footprint exceeds `max_gb`.
    /// Existing coarse links stay valid; the wiped K-mers are simply not
    /// reused until future coarse insertions re-add them.
    pub fn maybe_wipe(&self, max_gb: f64) -> bool {
        let mut inner = self.inner.write().unwrap();
        let used = inner.count * BYTES_PER_SEED;
        if (used as f64) <= max_gb * (1u64 << 30) as f64 {
            return false;
        }
        for bucket in inner.buckets.iter_mut() {
            *bucket = None;
        }
        inner.count = 0;
        true
    }

    /// Persist non-empty buckets as a gzip stream of
    /// `(i32 hash, i32 count, count * (u32 id, u16 index))` records,
    /// all big-endian.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| io_error("creating", path, e))?;
        let mut w = GzEncoder::new(BufWriter::new(file), Compression::default());
        let inner = self.inner.read().unwrap();
        for (h, bucket) in inner.buckets.iter().enumerate() {
            let Some(bucket) = bucket else { continue };
            if bucket.is_empty() {
                continue;
            }
            w.write_all(&(h as i32).to_be_bytes())
                .and_then(|_| w.write_all(&(bucket.len() as i32).to_be_bytes()))
                .map_err(|e| io_error("writing", path, e))?;
            for loc in bucket.iter() {
                w.write_all(&loc.coarse_seq_id.to_be_bytes())
                    .and_then(|_| w.write_all(&loc.residue_index.to_be_bytes()))
                    .map_err(|e| io_error("writing", path, e))?;
            }
        }
        let mut inner = w.finish().map_err(|e| io_error("closing", path, e))?;
        inner.flush().map_err(|e| io_error("writing", path, e))?;
        Ok(())
    }

    /// Reload a previously saved table.
    pub fn load(&self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| io_error("opening", path, e))?;
        let mut r = GzDecoder::new(BufReader::new(file));
        let mut inner = self.inner.write().unwrap();
        loop {
            let mut hash_buf = [0u8; 4];
            match r.read_exact(&mut hash_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(io_error("reading", path, e)),
            }
            let h = i32::from_be_bytes(hash_buf) as usize;
            let mut count_buf = [0u8; 4];
            r.read_exact(&mut count_buf)
                .map_err(|e| io_error("reading", path, e))?;
            let n = i32::from_be_bytes(count_buf) as usize;
            if h >= inner.buckets.len() {
                return Err(ParalogError::Config(format!(
                    "seed file '{}' does not match map-seed-size {}",
                    path.display(),
                    self.seed_size
                )));
            }
            let mut bucket = Vec::with_capacity(n);
            for _ in 0..n {
                let mut rec = [0u8; 6];
                r.read_exact(&mut rec)
                    .map_err(|e| io_error("reading", path, e))?;
                bucket.push(SeedLoc {
                    coarse_seq_id: u32::from_be_bytes([rec[0], rec[1], rec[2], rec[3]]),
                    residue_index: u16::from_be_bytes([rec[4], rec[5]]),
                });
            }
            inner.count += bucket.len() as i64;
            inner.buckets[h] = Some(Box::new(bucket));
        }
        Ok(())
    }

    /// Text rendering of the table for debugging, one CSV record per
    /// stored location.
    pub fn save_plain(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| io_error("creating", path, e))?;
        let mut w = csv::Writer::from_writer(BufWriter::new(file));
        let inner = self.inner.read().unwrap();
        for (h, bucket) in inner.buckets.iter().enumerate() {
            let Some(bucket) = bucket else { continue };
            for loc in bucket.iter() {
                w.write_record(&[
                    h.to_string(),
                    loc.coarse_seq_id.to_string(),
                    loc.residue_index.to_string(),
                ])
                .map_err(|e| {
                    io_error("writing", path, std::io::Error::other(e))
                })?;
            }
        }
        w.flush().map_err(|e| io_error("writing", path, e))?;
        Ok(())
    }
}

/// True when a run of `window` contiguous equal residues touches the
/// neighborhood `[offset - window, offset + window)`.
pub fn is_low_complexity(residues: &[u8], offset: usize, window: usize) -> bool {
    if window == 0 || residues.is_empty() {
        return false;
    }
    let mut start = offset.saturating_sub(window).min(residues.len());
    let mut end = (offset + window).min(residues.len());
    // A run is counted at its full length even when only part of it
    // falls inside the neighborhood.
    while start > 0 && start < residues.len() && residues[start - 1] == residues[start] {
        start -= 1;
    }
    while end > 0 && end < residues.len() && residues[end] == residues[end - 1] {
        end += 1;
    }
    let mut repeats = 1usize;
    let mut last: Option<u8> = None;
    for &b in &residues[start..end] {
        if Some(b) == last {
            repeats += 1;
            if repeats >= window {
                return true;
            }
        } else {
            repeats = 1;
            last = Some(b);
        }
    }
    false
}
