//! Compressive protein sequence database.
//!
//! Compression maps every input sequence onto a small set of coarse
//! representative sequences plus edit scripts, so the originals can be
//! reconstructed byte for byte. A similarity search runs against the
//! coarse set first, expands the hits back to the originals they were
//! built from, and only then runs the expensive fine alignment on that
//! much smaller set.

pub mod alphabet;
mod align;
pub mod blast;
mod coarse;
mod compress;
mod compressed;
mod db;
mod edit_script;
mod error;
mod extend;
mod fasta;
pub mod io_utils;
mod pool;
mod seeds;

pub use align::{identity, nw_align, AlignMem, Alignment};
pub use coarse::{
    load_coarse_fasta, num_sequences, read_link_section, BackLink, CoarseDB, CoarseSeq,
    FILE_COARSE_FASTA, FILE_COARSE_FASTA_INDEX, FILE_COARSE_LINKS, FILE_COARSE_LINKS_INDEX,
    FILE_COARSE_LINKS_PLAIN, FILE_COARSE_SEEDS, FILE_COARSE_SEEDS_PLAIN,
};
pub use compress::{compress_seq, skip_low_complexity};
pub use compressed::{
    CompressedReader, CompressedSeq, CompressedWriter, LinkToCoarse, FILE_COMPRESSED,
    FILE_COMPRESSED_INDEX,
};
pub use db::{Db, DbParams, DbReader, FILE_PARAMS};
pub use edit_script::{strip_gaps, EditMod, EditScript, ModKind};
pub use error::{io_error, ParalogError, Result};
pub use extend::{extend_match, ungapped_extend};
pub use fasta::{filter_residues, write_fasta_record, FastaSource, OriginalSeq};
pub use pool::Pool;
pub use seeds::{is_low_complexity, SeedLoc, SeedTable};
