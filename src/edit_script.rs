//! Edit script codec.
//!
//! An edit script records the difference between a coarse sub-sequence and
//! an original sub-sequence as an ordered list of substitutions, insertions
//! and deletions derived from a pair of aligned rows. Scripts serialize to
//! a compact ASCII form, one letter per modification followed by a decimal
//! offset delta and the payload, e.g. `s6Gd1--s7ATi2TTs4A`.

use std::fmt;

use crate::alphabet::GAP_BYTE;
use crate::error::{ParalogError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModKind {
    Substitute,
    Insert,
    Delete,
}

impl ModKind {
    fn letter(self) -> char {
        match self {
            ModKind::Substitute => 's',
            ModKind::Insert => 'i',
            ModKind::Delete => 'd',
        }
    }
}

/// One coalesced run of identical modifications.
///
/// `start` is the position in the gap-free `from` sequence at the first
/// column of the run. The payload holds the replacement residues for
/// substitutions and insertions, and one `-` per deleted residue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMod {
    pub kind: ModKind,
    pub start: usize,
    pub payload: Vec<u8>,
}

impl EditMod {
    /// Position in the `from` sequence just past the run. Insertions do
    /// not consume `from` residues, so their end equals their start.
    pub fn end(&self) -> usize {
        match self.kind {
            ModKind::Substitute | ModKind::Delete => self.start + self.payload.len(),
            ModKind::Insert => self.start,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    pub mods: Vec<EditMod>,
}

impl EditScript {
    /// Encode the difference between two equal-length aligned rows.
    ///
    /// `from_row` is the coarse side, `to_row` the original side; both may
    /// contain `-`. Identical rows produce an empty script.
    pub fn from_alignment(from_row: &[u8], to_row: &[u8]) -> EditScript {
        assert_eq!(
            from_row.len(),
            to_row.len(),
            "alignment rows must have equal length"
        );

        let mut mods = Vec::new();
        let mut current: Option<EditMod> = None;
        let mut from_index = 0usize;

        for (&f, &t) in from_row.iter().zip(to_row.iter()) {
            let kind = if f == t {
                None
            } else if f == GAP_BYTE {
                Some(ModKind::Insert)
            } else if t == GAP_BYTE {
                Some(ModKind::Delete)
            } else {
                Some(ModKind::Substitute)
            };

            match kind {
                None => {
                    if let Some(m) = current.take() {
                        mods.push(m);
                    }
                }
                Some(kind) => {
                    let extend = matches!(&current, Some(m) if m.kind == kind);
                    if !extend {
                        if let Some(m) = current.take() {
                            mods.push(m);
                        }
                        current = Some(EditMod {
                            kind,
                            start: from_index,
                            payload: Vec::new(),
                        });
                    }
                    let m = current.as_mut().unwrap();
                    m.payload.push(match kind {
                        ModKind::Delete => GAP_BYTE,
                        _ => t,
                    });
                }
            }

            if f != GAP_BYTE {
                from_index += 1;
            }
        }
        if let Some(m) = current.take() {
            mods.push(m);
        }

        EditScript { mods }
    }

    /// Parse the ASCII form back into a script.
    pub fn parse(s: &str) -> Result<EditScript> {
        let bytes = s.as_bytes();
        let mut pos = 0usize;
        let mut prev_start = 0usize;
        let mut mods = Vec::new();

        while pos < bytes.len() {
            let kind = match bytes[pos] {
                b's' => ModKind::Substitute,
                b'i' => ModKind::Insert,
                b'd' => ModKind::Delete,
                other => {
                    return Err(ParalogError::EditScriptSyntax(format!(
                        "unexpected byte '{}' at offset {pos}",
                        other as char
                    )))
                }
            };
            pos += 1;

            let digit_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos == digit_start {
                return Err(ParalogError::EditScriptSyntax(format!(
                    "missing offset delta at offset {pos}"
                )));
            }
            let delta: usize = s[digit_start..pos].parse().map_err(|_| {
                ParalogError::EditScriptSyntax(format!(
                    "offset delta out of range at offset {digit_start}"
                ))
            })?;

            let payload_start = pos;
            match kind {
                ModKind::Delete => {
                    while pos < bytes.len() && bytes[pos] == GAP_BYTE {
                        pos += 1;
                    }
                }
                _ => {
                    while pos < bytes.len() && bytes[pos].is_ascii_uppercase() {
                        pos += 1;
                    }
                }
            }
            if pos == payload_start {
                return Err(ParalogError::EditScriptSyntax(format!(
                    "empty modification payload at offset {pos}"
                )));
            }

            let start = prev_start + delta;
            prev_start = start;
            mods.push(EditMod {
                kind,
                start,
                payload: bytes[payload_start..pos].to_vec(),
            });
        }

        Ok(EditScript { mods })
    }

    /// Apply the script to a gap-free coarse slice, producing the original
    /// slice. Fails if a modification reaches outside `from`.
    pub fn apply(&self, from: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(from.len());
        let mut last_end = 0usize;

        for m in &self.mods {
            if m.start < last_end || m.start > from.len() || m.end() > from.len() {
                return Err(ParalogError::EditScriptSyntax(format!(
                    "modification [{}, {}) outside sequence of length {}",
                    m.start,
                    m.end(),
                    from.len()
                )));
            }
            out.extend_from_slice(&from[last_end..m.start]);
            match m.kind {
                ModKind::Substitute | ModKind::Insert => out.extend_from_slice(&m.payload),
                ModKind::Delete => {}
            }
            last_end = m.end();
        }
        out.extend_from_slice(&from[last_end..]);
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

impl fmt::Display for EditScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prev_start = 0usize;
        for m in &self.mods {
            write!(f, "{}{}", m.kind.letter(), m.start - prev_start)?;
            for &b in &m.payload {
                write!(f, "{}", b as char)?;
            }
            prev_start = m.start;
        }
        Ok(())
    }
}

/// Strip gap characters from an aligned row.
pub fn strip_gaps(row: &[u8]) -> Vec<u8> {
    row.iter().copied().filter(|&b| b != GAP_BYTE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_reference_alignment() {
        let from = b"GTTCACTTATGTATTC--ATATGATTTTGGCAA";
        let to = b"GTTCACG--TGTATATTTATATAATTTTGGCAA";
        let script = EditScript::from_alignment(from, to);
        assert_eq!(script.to_string(), "s6Gd1--s7ATi2TTs4A");
    }

    #[test]
    fn applies_the_reference_script() {
        let script = EditScript::parse("s6Gd1--s7ATi2TTs4A").unwrap();
        let out = script.apply(b"GTTCACTTATGTATTCATATGATTTTGGCAA").unwrap();
        assert_eq!(out, b"GTTCACGTGTATATTTATATAATTTTGGCAA");
    }

    #[test]
    fn identical_rows_encode_to_the_empty_script() {
        let script = EditScript::from_alignment(b"ABCD", b"ABCD");
        assert!(script.is_empty());
        assert_eq!(script.to_string(), "");
        assert_eq!(script.apply(b"ABCD").unwrap(), b"ABCD");
    }

    #[test]
    fn rejects_malformed_scripts() {
        assert!(EditScript::parse("x1A").is_err());
        assert!(EditScript::parse("s").is_err());
        assert!(EditScript::parse("s1").is_err());
        assert!(EditScript::parse("d2AB").is_err());
    }

    #[test]
    fn apply_rejects_out_of_range_modifications() {
        let script = EditScript::parse("s9ZZZ").unwrap();
        assert!(script.apply(b"ABC").is_err());
    }
}
