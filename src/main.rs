//! Command line front end.
//!
//! Compression, decompression and search are exposed as subcommands.
//! The binary performs argument handling and progress reporting before
//! delegating to the library APIs in this crate.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use paralog::io_utils::{paralog_cli_error, simple_cli_error, CliError};
use paralog::{
    blast, write_fasta_record, Db, DbParams, DbReader, FastaSource, Pool, FILE_COARSE_FASTA,
};

fn report_error(err: &CliError) {
    eprintln!("paralog: {}", err.msg);
    let mut cause = std::error::Error::source(err);
    while let Some(e) = cause {
        eprintln!("  caused by: {e}");
        cause = e.source();
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        report_error(&e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Compress(args) => run_compress(args),
        Command::Decompress(args) => run_decompress(args),
        Command::Search(args) => run_search(args),
    }
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or extend a compressive database from FASTA input
    #[command(alias = "c")]
    Compress(CompressArgs),
    /// Reconstruct original sequences from a database
    #[command(alias = "d")]
    Decompress(DecompressArgs),
    /// Coarse-search a database and fine-align the expanded hits
    #[command(alias = "s")]
    Search(SearchArgs),
}

#[derive(Args)]
struct CompressArgs {
    /// Database directory to create or extend
    db_dir: PathBuf,
    /// Input FASTA files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Open an existing database and continue appending
    #[arg(long)]
    append: bool,
    /// Delete an existing database directory before starting
    #[arg(long)]
    overwrite: bool,
    /// Minimum original-side length of an acceptable match
    #[arg(long)]
    min_match_len: Option<usize>,
    /// K-mer size used by ungapped extension
    #[arg(long)]
    match_kmer_size: Option<usize>,
    /// Gapped extension window size
    #[arg(long)]
    gapped_window_size: Option<usize>,
    /// Ungapped extension window size
    #[arg(long)]
    ungapped_window_size: Option<usize>,
    /// Identity percentage gate for extension windows (0-100)
    #[arg(long)]
    ext_seq_id_threshold: Option<i32>,
    /// Identity percentage gate for a whole match (0-100)
    #[arg(long)]
    match_seq_id_threshold: Option<i32>,
    /// Residues a match may be stretched to reach a boundary
    #[arg(long)]
    match_extend: Option<usize>,
    /// Seed index K-mer size; frozen after the database is created
    #[arg(long)]
    map_seed_size: Option<usize>,
    /// Residues after a seed that must match exactly
    #[arg(long)]
    ext_seed_size: Option<usize>,
    /// Repeat-region size for low-complexity skipping, 0 to disable
    #[arg(long)]
    low_complexity: Option<usize>,
    /// Repeat-window size excluded from seeding
    #[arg(long)]
    seed_low_complexity: Option<usize>,
    /// Seed table memory budget in gigabytes; 0 disables the wipe
    #[arg(long, default_value_t = 8.0)]
    max_seeds: f64,
    /// Number of compression workers
    #[arg(short = 'p', long = "parallelism")]
    parallelism: Option<usize>,
    /// Also write plain-text debugging dumps
    #[arg(long)]
    plain: bool,
    /// Create the database without a persisted seed table
    #[arg(long)]
    read_only: bool,
    /// Emit a JSON summary after completion
    #[arg(long)]
    json: bool,
}

/// How many sequences go between seed-table budget checks.
const WIPE_CHECK_INTERVAL: u32 = 10_000;

fn apply_overrides(mut params: DbParams, args: &CompressArgs, frozen: bool) -> Result<DbParams, CliError> {
    if let Some(v) = args.map_seed_size {
        if frozen && v != params.map_seed_size {
            return Err(simple_cli_error(&format!(
                "map-seed-size is frozen at {} for this database and cannot be changed to {v}",
                params.map_seed_size
            )));
        }
        params.map_seed_size = v;
    }
    if let Some(v) = args.min_match_len {
        params.min_match_len = v;
    }
    if let Some(v) = args.match_kmer_size {
        params.match_kmer_size = v;
    }
    if let Some(v) = args.gapped_window_size {
        params.gapped_window_size = v;
    }
    if let Some(v) = args.ungapped_window_size {
        params.ungapped_window_size = v;
    }
    if let Some(v) = args.ext_seq_id_threshold {
        params.ext_seq_id_threshold = v;
    }
    if let Some(v) = args.match_seq_id_threshold {
        params.match_seq_id_threshold = v;
    }
    if let Some(v) = args.match_extend {
        params.match_extend = v;
    }
    if let Some(v) = args.ext_seed_size {
        params.ext_seed_size = v;
    }
    if let Some(v) = args.low_complexity {
        params.low_complexity = v;
    }
    if let Some(v) = args.seed_low_complexity {
        params.seed_low_complexity = v;
    }
    if !frozen {
        params.read_only = args.read_only;
    }
    Ok(params)
}

fn run_compress(args: CompressArgs) -> Result<(), CliError> {
    if args.append && args.overwrite {
        return Err(simple_cli_error(
            "--append and --overwrite are mutually exclusive",
        ));
    }

    let start_time = Instant::now();
    let db = if args.append {
        let stored = DbParams::load(&args.db_dir)
            .map_err(|e| paralog_cli_error("opening database", e))?;
        let params = apply_overrides(stored, &args, true)?;
        Db::append(&args.db_dir, params)
            .map_err(|e| paralog_cli_error("opening database", e))?
    } else {
        let params = apply_overrides(DbParams::default(), &args, false)?;
        Db::create(&args.db_dir, params, args.overwrite)
            .map_err(|e| paralog_cli_error("creating database", e))?
    };

    let workers = args.parallelism.unwrap_or_else(num_cpus::get);
    let mut pool =
        Pool::start(&db, workers).map_err(|e| paralog_cli_error("starting workers", e))?;

    let progress = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {pos} sequences compressed ({per_sec})")
            .expect("static template"),
    );

    let mut residues_in: u64 = 0;
    let mut processed: u32 = 0;
    for input in &args.inputs {
        let source = FastaSource::open(input, pool.sequences_submitted())
            .map_err(|e| paralog_cli_error("reading input", e))?;
        for record in source {
            let seq = record.map_err(|e| paralog_cli_error("reading input", e))?;
            residues_in += seq.residues.len() as u64;
            pool.compress(seq.name, seq.residues)
                .map_err(|e| paralog_cli_error("compressing", e))?;
            processed += 1;
            progress.inc(1);
            if args.max_seeds > 0.0 && processed % WIPE_CHECK_INTERVAL == 0 {
                if db.coarse.seeds.maybe_wipe(args.max_seeds) {
                    info!("seed table exceeded {} GB and was wiped", args.max_seeds);
                }
            }
        }
    }

    let written = pool
        .finish()
        .map_err(|e| paralog_cli_error("finishing compression", e))?;
    db.save(args.plain)
        .map_err(|e| paralog_cli_error("saving database", e))?;
    progress.finish_and_clear();

    let coarse_seqs = db.coarse.len();
    let coarse_residues = db.coarse.total_residues();
    let ratio = if residues_in == 0 {
        1.0
    } else {
        coarse_residues as f64 / residues_in as f64
    };
    let elapsed = start_time.elapsed();

    if args.json {
        let summary = serde_json::json!({
            "sequences": written,
            "residues": residues_in,
            "coarse_sequences": coarse_seqs,
            "coarse_residues": coarse_residues,
            "coarse_ratio": ratio,
            "seconds": elapsed.as_secs_f64(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("json serialization error: {e}"),
        }
    } else {
        eprintln!(
            "Compressed {} sequences ({} residues) onto {} coarse sequences ({:.2}% of input) in {:.2?}",
            written,
            residues_in,
            coarse_seqs,
            ratio * 100.0,
            elapsed
        );
    }
    Ok(())
}

#[derive(Args)]
struct DecompressArgs {
    /// Database directory to read
    db_dir: PathBuf,
    /// Output FASTA file (stdout if omitted)
    output: Option<PathBuf>,
    /// First original id to reconstruct
    #[arg(long, default_value_t = 0)]
    id_start: u32,
    /// Last original id to reconstruct (defaults to the final sequence)
    #[arg(long)]
    id_end: Option<u32>,
}

fn run_decompress(args: DecompressArgs) -> Result<(), CliError> {
    let mut reader =
        DbReader::open(&args.db_dir).map_err(|e| paralog_cli_error("opening database", e))?;
    if reader.num_sequences() == 0 {
        return Err(simple_cli_error("database contains no sequences"));
    }
    let last = args.id_end.unwrap_or(reader.num_sequences() - 1);

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| paralog::io_utils::io_cli_error("creating output file", path, e))?;
            let mut w = BufWriter::new(file);
            reader
                .write_fasta_range(&mut w, args.id_start, last)
                .map_err(|e| paralog_cli_error("decompressing", e))?;
            w.flush()
                .map_err(|e| paralog::io_utils::io_cli_error("writing output file", path, e))?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut w = BufWriter::new(stdout.lock());
            reader
                .write_fasta_range(&mut w, args.id_start, last)
                .map_err(|e| paralog_cli_error("decompressing", e))?;
            w.flush()
                .map_err(|e| simple_cli_error(&format!("writing to stdout: {e}")))?;
        }
    }
    Ok(())
}

#[derive(Args)]
struct SearchArgs {
    /// Database directory to search
    db_dir: PathBuf,
    /// Query FASTA file
    query: PathBuf,
    /// Aligner run against the coarse database
    #[arg(long, default_value = "blastp")]
    coarse_aligner: String,
    /// Extra arguments passed to the coarse aligner
    #[arg(long = "coarse-flag")]
    coarse_flags: Vec<String>,
    /// Aligner run against the expanded hits
    #[arg(long, default_value = "blastp")]
    fine_aligner: String,
    /// Extra arguments passed to the fine aligner
    #[arg(long = "fine-flag")]
    fine_flags: Vec<String>,
}

fn run_search(args: SearchArgs) -> Result<(), CliError> {
    let mut reader =
        DbReader::open(&args.db_dir).map_err(|e| paralog_cli_error("opening database", e))?;

    let coarse_fasta = args.db_dir.join(FILE_COARSE_FASTA);
    let mut coarse_args = vec![
        "-query".to_string(),
        args.query.display().to_string(),
        "-subject".to_string(),
        coarse_fasta.display().to_string(),
        "-outfmt".to_string(),
        "6".to_string(),
    ];
    coarse_args.extend(args.coarse_flags.iter().cloned());
    let output = blast::run_aligner_capture(&args.coarse_aligner, &coarse_args)
        .map_err(|e| paralog_cli_error("running coarse search", e))?;
    let hits = blast::parse_tabular(&output[..])
        .map_err(|e| paralog_cli_error("parsing coarse search output", e))?;
    info!("coarse search produced {} hits", hits.len());

    if hits.is_empty() {
        eprintln!("No coarse hits; nothing to fine-align.");
        return Ok(());
    }

    let mut expanded_ids = std::collections::HashSet::new();
    let mut expanded = tempfile::Builder::new()
        .prefix("paralog-expanded")
        .suffix(".fasta")
        .tempfile()
        .map_err(|e| simple_cli_error(&format!("creating temporary file: {e}")))?;
    for hit in &hits {
        let coarse_id: u32 = hit
            .subject_id
            .parse()
            .map_err(|_| simple_cli_error(&format!("coarse hit id '{}' is not numeric", hit.subject_id)))?;
        let seqs = reader
            .expand(coarse_id, hit.subject_start as usize, hit.subject_end as usize)
            .map_err(|e| paralog_cli_error("expanding coarse hits", e))?;
        for seq in seqs {
            if expanded_ids.insert(seq.id) {
                write_fasta_record(&mut expanded, &seq.name, &seq.residues)
                    .map_err(|e| simple_cli_error(&format!("writing expanded hits: {e}")))?;
            }
        }
    }
    expanded
        .flush()
        .map_err(|e| simple_cli_error(&format!("writing expanded hits: {e}")))?;
    info!("expanded {} original sequences", expanded_ids.len());

    let mut fine_args = vec![
        "-query".to_string(),
        args.query.display().to_string(),
        "-subject".to_string(),
        expanded.path().display().to_string(),
    ];
    fine_args.extend(args.fine_flags.iter().cloned());
    blast::run_aligner_passthrough(&args.fine_aligner, &fine_args)
        .map_err(|e| paralog_cli_error("running fine search", e))
}
