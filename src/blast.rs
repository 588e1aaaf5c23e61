//! External aligner plumbing for the search driver.
//!
//! The search driver never aligns anything itself; it shells out to a
//! BLAST-compatible aligner, reads the 12-column tab-separated output of
//! the coarse pass, and hands the expanded sequences to a fine pass.

use std::io::BufRead;
use std::path::Path;
use std::process::{Command, Stdio};

use log::info;

use crate::error::{io_error, ParalogError, Result};

/// One hit in the standard 12-column tabular output.
#[derive(Debug, Clone, PartialEq)]
pub struct BlastHit {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: f64,
    pub alignment_len: u64,
    pub mismatches: u64,
    pub gap_opens: u64,
    pub query_start: u64,
    pub query_end: u64,
    pub subject_start: u64,
    pub subject_end: u64,
    pub evalue: f64,
    pub bit_score: f64,
}

/// Parse tab-separated 12-column hits, skipping comment lines.
pub fn parse_tabular<R: BufRead>(reader: R) -> Result<Vec<BlastHit>> {
    let mut hits = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| io_error("reading", Path::new("<aligner output>"), e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            return Err(ParalogError::Internal(format!(
                "aligner output line {} has {} fields, expected 12",
                lineno + 1,
                fields.len()
            )));
        }
        let num = |i: usize| -> Result<f64> {
            fields[i].parse::<f64>().map_err(|_| {
                ParalogError::Internal(format!(
                    "aligner output line {}: '{}' is not a number",
                    lineno + 1,
                    fields[i]
                ))
            })
        };
        hits.push(BlastHit {
            query_id: fields[0].to_string(),
            subject_id: fields[1].to_string(),
            percent_identity: num(2)?,
            alignment_len: num(3)? as u64,
            mismatches: num(4)? as u64,
            gap_opens: num(5)? as u64,
            query_start: num(6)? as u64,
            query_end: num(7)? as u64,
            subject_start: num(8)? as u64,
            subject_end: num(9)? as u64,
            evalue: num(10)?,
            bit_score: num(11)?,
        });
    }
    Ok(hits)
}

/// Run an aligner and capture its standard output.
pub fn run_aligner_capture(program: &str, args: &[String]) -> Result<Vec<u8>> {
    info!("running {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| io_error("running", Path::new(program), e))?;
    if !output.status.success() {
        return Err(ParalogError::Internal(format!(
            "{program} exited with {}",
            output.status
        )));
    }
    Ok(output.stdout)
}

/// Run an aligner with its output streaming straight through.
pub fn run_aligner_passthrough(program: &str, args: &[String]) -> Result<()> {
    info!("running {program} {}", args.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| io_error("running", Path::new(program), e))?;
    if !status.success() {
        return Err(ParalogError::Internal(format!(
            "{program} exited with {status}"
        )));
    }
    Ok(())
}
