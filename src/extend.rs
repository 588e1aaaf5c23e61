//! Ungapped and gapped match extension.
//!
//! [`ungapped_extend`] greedily grows a gap-free match window by window,
//! accepting a K-mer only when the residues since the last accepted match
//! clear an identity threshold. [`extend_match`] interleaves it with
//! bounded Needleman–Wunsch windows to carry a match across gaps.

use crate::align::{identity, nw_align, AlignMem, Alignment};

/// Greedy gap-free extension of two sequences from their starts.
///
/// Returns the number of residues of each sequence covered by the
/// accepted extension.
pub fn ungapped_extend(
    rseq: &[u8],
    oseq: &[u8],
    window_size: usize,
    kmer_size: usize,
    id_threshold: i32,
) -> usize {
    let mut length = 0usize;
    let mut scanned = 0usize;
    let mut successive = 0usize;

    let mut try_next_window = true;
    while try_next_window {
        try_next_window = false;
        let mut i = 0;
        while i < window_size {
            if scanned >= rseq.len() || scanned >= oseq.len() {
                break;
            }
            if rseq[scanned] == oseq[scanned] {
                successive += 1;
            } else {
                successive = 0;
            }
            scanned += 1;

            if successive == kmer_size {
                // The candidate K-mer only counts if everything between
                // the previous accepted match and the K-mer is close
                // enough; otherwise un-count one residue and keep going.
                let id = identity(
                    &rseq[length..scanned - kmer_size],
                    &oseq[length..scanned - kmer_size],
                );
                if id < id_threshold {
                    successive -= 1;
                    i += 1;
                    continue;
                }
                length = scanned;
                successive = 0;
                try_next_window = true;
                break;
            }
            i += 1;
        }
    }
    length
}

/// Extend a seed match as far as possible over both sequences.
///
/// Alternates ungapped extension with gapped windows of `gapped_window`
/// residues; stops when a gapped window falls below `ext_id_threshold`
/// identity or either sequence is exhausted. Returns the covered prefix
/// lengths `(cor_len, org_len)`.
pub fn extend_match(
    mem: &mut AlignMem,
    cor: &[u8],
    org: &[u8],
    gapped_window: usize,
    ungapped_window: usize,
    kmer_size: usize,
    ext_id_threshold: i32,
) -> (usize, usize) {
    let mut cor_len = 0usize;
    let mut org_len = 0usize;

    loop {
        if cor_len == cor.len() || org_len == org.len() {
            break;
        }

        let delta = ungapped_extend(
            &cor[cor_len..],
            &org[org_len..],
            ungapped_window,
            kmer_size,
            ext_id_threshold,
        );
        cor_len += delta;
        org_len += delta;

        let cor_win = &cor[cor_len..(cor_len + gapped_window).min(cor.len())];
        let org_win = &org[org_len..(org_len + gapped_window).min(org.len())];
        let aln = nw_align(mem, cor_win, org_win);
        if identity(&aln.ref_row, &aln.org_row) < ext_id_threshold {
            break;
        }
        cor_len += Alignment::len_without_gaps(&aln.ref_row);
        org_len += Alignment::len_without_gaps(&aln.org_row);
    }

    (cor_len, org_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungapped_stops_at_an_unrecoverable_mismatch() {
        assert_eq!(ungapped_extend(b"ABCYEFG", b"ABCZEFG", 10, 3, 50), 3);
    }

    #[test]
    fn ungapped_recovers_across_a_narrow_miss() {
        assert_eq!(ungapped_extend(b"ABCYEFGH", b"ABCZEFGH", 10, 3, 50), 8);
    }

    #[test]
    fn ungapped_stops_at_sequence_end() {
        assert_eq!(ungapped_extend(b"ABC", b"ABCDEF", 10, 3, 50), 3);
    }

    #[test]
    fn extension_carries_across_an_insertion() {
        let mut mem = AlignMem::new();
        let cor = b"ABCDEFGHIKLMNPQRSTVW";
        let org = b"ABCDEFGAAAHIKLMNPQRSTVW";
        let (cor_len, org_len) = extend_match(&mut mem, cor, org, 25, 10, 3, 50);
        assert_eq!(&cor[..cor_len], cor.as_slice());
        assert_eq!(&org[..org_len], org.as_slice());
    }

    #[test]
    fn extension_stops_at_a_divergent_window() {
        let mut mem = AlignMem::new();
        let cor = b"ABCDEFGHIKLMNPQRSTVW";
        let org = b"ABCDEFGAAAHIKLMNPQRSTBBBBBBBBBBBBBBBBBBBVW";
        let (cor_len, org_len) = extend_match(&mut mem, cor, org, 25, 10, 3, 50);
        assert_eq!(&cor[..cor_len], b"ABCDEF");
        assert_eq!(&org[..org_len], b"ABCDEF");
    }
}
