//! Per-sequence compression loop.
//!
//! Each original sequence is scanned K-mer by K-mer against the seed
//! index. A candidate seed is verified, extended in both directions and
//! aligned; an accepted match becomes a coarse link with an edit script.
//! Residues between matches are flushed verbatim as new coarse
//! sequences, so every input is reconstructible no matter how little of
//! it matches.

use crate::align::{identity, nw_align, AlignMem};
use crate::alphabet::seed_index;
use crate::coarse::{BackLink, CoarseDB};
use crate::compressed::{CompressedSeq, LinkToCoarse};
use crate::db::DbParams;
use crate::edit_script::EditScript;
use crate::extend::extend_match;

/// Largest coarse range representable in a link.
const MAX_LINK_LEN: usize = u16::MAX as usize;

/// Compress one original sequence against the growing coarse database.
pub fn compress_seq(
    coarse: &CoarseDB,
    params: &DbParams,
    mem: &mut AlignMem,
    id: u32,
    name: &str,
    seq: &[u8],
) -> CompressedSeq {
    let olen = seq.len();
    let k = params.map_seed_size;
    let ext = params.ext_seed_size;
    let mut cseq = CompressedSeq::new(id, name.to_string());
    let mut last_match = 0usize;
    let mut current = 0usize;

    let limit = olen as i64 - k as i64 - ext as i64;
    while (current as i64) <= limit {
        let kmer = &seq[current..current + k];
        if kmer.iter().any(|&b| seed_index(b).is_none()) {
            current += 1;
            continue;
        }

        if params.low_complexity > 0 {
            let skip = skip_low_complexity(&seq[current..], params.min_match_len, params.low_complexity);
            if skip > 0 {
                current += skip;
                continue;
            }
        }

        for loc in coarse.seeds.lookup(kmer) {
            let Some(cor_seq) = coarse.seq(loc.coarse_seq_id) else {
                continue;
            };
            let cor_res = &cor_seq.residues;
            let cor_ind = loc.residue_index as usize;
            if cor_ind + k + ext >= cor_res.len() {
                continue;
            }
            if cor_res[cor_ind + k..cor_ind + k + ext] != seq[current + k..current + k + ext] {
                continue;
            }

            let (cor_match_len, org_match_len) = extend_match(
                mem,
                &cor_res[cor_ind..],
                &seq[current..],
                params.gapped_window_size,
                params.ungapped_window_size,
                params.match_kmer_size,
                params.ext_seq_id_threshold,
            );
            if org_match_len < params.min_match_len {
                continue;
            }

            let cor_start = cor_ind;
            let cor_end = cor_start + cor_match_len;
            if cor_end > MAX_LINK_LEN {
                continue;
            }
            let cor_match = &cor_res[cor_start..cor_end];
            let mut org_start = current;
            let mut org_end = current + org_match_len;

            let mut aln = nw_align(mem, cor_match, &seq[org_start..org_end]);
            if identity(&aln.ref_row, &aln.org_row) < params.match_seq_id_threshold {
                continue;
            }

            // Boundary extension: absorb a short tail of the original,
            // and a short gap back to the previous match. Both may fire
            // in the same iteration; re-align once afterwards.
            let mut changed = false;
            if org_match_len + params.match_extend >= olen - current {
                org_end = olen;
                changed = true;
            }
            if current - last_match <= params.match_extend {
                org_start = last_match;
                current = last_match;
                changed = true;
            }
            if changed {
                aln = nw_align(mem, cor_match, &seq[org_start..org_end]);
            }

            if org_start - last_match > 0 {
                add_without_match(&mut cseq, coarse, id, &seq[last_match..org_start]);
            }

            cseq.add(LinkToCoarse {
                coarse_seq_id: loc.coarse_seq_id,
                coarse_start: cor_start as u16,
                coarse_end: cor_end as u16,
                diff: EditScript::from_alignment(&aln.ref_row, &aln.org_row).to_string(),
            });
            cor_seq.add_link(BackLink {
                orig_seq_id: id,
                coarse_start: cor_start as u16,
                coarse_end: cor_end as u16,
            });

            last_match = org_end;
            current = org_end - 1;
            break;
        }

        current += 1;
    }

    if olen - last_match > 0 {
        add_without_match(&mut cseq, coarse, id, &seq[last_match..]);
    }
    cseq
}

/// Flush an unmatched region as fresh coarse sequences with identity
/// links. Regions longer than a link can address are split.
fn add_without_match(cseq: &mut CompressedSeq, coarse: &CoarseDB, orig_id: u32, sub: &[u8]) {
    for chunk in sub.chunks(MAX_LINK_LEN) {
        let (cor_id, cor_seq) = coarse.add(chunk);
        cor_seq.add_link(BackLink {
            orig_seq_id: orig_id,
            coarse_start: 0,
            coarse_end: chunk.len() as u16,
        });
        cseq.add(LinkToCoarse::no_diff(cor_id, 0, chunk.len() as u16));
    }
}

/// Look for a low-complexity region within the first `window_size`
/// residues of `seq`. Returns the number of residues to skip to get
/// past it, or 0 if none starts in the window.
pub fn skip_low_complexity(seq: &[u8], window_size: usize, region_size: usize) -> usize {
    if region_size == 0 {
        return 0;
    }
    let upto = window_size.min(seq.len());
    let mut repeats = 1usize;
    let mut last: Option<u8> = None;
    let mut skip = 0usize;
    let mut found = false;
    for (i, &b) in seq[..upto].iter().enumerate() {
        if Some(b) == last {
            repeats += 1;
            if repeats >= region_size {
                found = true;
                skip = i;
            }
        } else {
            if found {
                break;
            }
            repeats = 1;
            last = Some(b);
        }
    }
    if !found {
        return 0;
    }
    let res = seq[skip];
    while skip < seq.len() && seq[skip] == res {
        skip += 1;
    }
    skip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_past_a_repeat_region_found_in_the_window() {
        assert_eq!(skip_low_complexity(b"ABCDDDDDDDDDDDDDDDDDDXYZ", 10, 5), 21);
    }

    #[test]
    fn skips_a_leading_repeat_run() {
        assert_eq!(skip_low_complexity(b"DDDDDDABCDEF", 10, 5), 6);
    }

    #[test]
    fn clean_sequences_are_not_skipped() {
        assert_eq!(skip_low_complexity(b"ACDEFGHIKLMNPQRSTVWY", 10, 5), 0);
        assert_eq!(skip_low_complexity(b"", 10, 5), 0);
    }
}
