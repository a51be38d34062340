use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::info;
use rover::{run, CallerConfig};

/// Call variants from paired-end amplicon reads, requiring both mates to agree
#[derive(Parser, Debug)]
#[command(name = "rover", version)]
struct Args {
    /// Primer coordinate table: chrom, start, end, forward id, reverse id
    #[arg(long, value_name = "FILE")]
    primers: String,

    /// Variant output file
    #[arg(long, value_name = "FILE")]
    out: String,

    /// Indexed BAM files, one per sample
    #[arg(required = true, value_name = "BAM")]
    bams: Vec<String>,

    /// Minimum proportion of a block a read must cover
    #[arg(long, default_value_t = 0.9)]
    overlap: f64,

    /// Minimum proportion of read pairs supporting a variant
    #[arg(long = "proportionthresh", default_value_t = 0.05)]
    proportion_threshold: f64,

    /// Minimum number of read pairs supporting a variant
    #[arg(long = "absthresh", default_value_t = 2)]
    absolute_threshold: usize,

    /// Minimum phred base quality
    #[arg(long = "qualthresh")]
    quality_threshold: Option<u8>,

    /// Primer sequence table; enables primer checking
    #[arg(long = "primercheck", value_name = "FILE")]
    primer_check: Option<String>,

    /// Maximum primer mismatch score in either direction
    #[arg(long = "primerthresh", default_value_t = 5)]
    primer_threshold: i32,

    /// Score deducted per gap when aligning primers
    #[arg(long = "gap-penalty", alias = "gap_penalty", default_value_t = 0)]
    gap_penalty: i32,

    /// Indexed VCF of known variants used to fill the ID column
    #[arg(long = "id-info", alias = "id_info", value_name = "FILE")]
    id_info: Option<String>,

    /// Directory for per-sample coverage files
    #[arg(long, default_value = ".")]
    coverdir: PathBuf,

    /// Directory for primer mismatch reports
    #[arg(long = "primer-report-dir", default_value = ".")]
    primer_report_dir: PathBuf,

    /// Reference FASTA, recorded in the output header
    #[arg(long, value_name = "FILE")]
    reference: Option<String>,

    /// Log file (default: stderr)
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Number of BAM files processed in parallel
    #[arg(long, default_value_t = 1)]
    threads: usize,
}

impl From<Args> for CallerConfig {
    fn from(args: Args) -> Self {
        CallerConfig {
            primers: args.primers,
            out: args.out,
            bams: args.bams,
            overlap: args.overlap,
            proportion_threshold: args.proportion_threshold,
            absolute_threshold: args.absolute_threshold,
            quality_threshold: args.quality_threshold,
            primer_check: args.primer_check,
            primer_threshold: args.primer_threshold,
            gap_penalty: args.gap_penalty,
            id_info: args.id_info,
            coverdir: args.coverdir,
            primer_report_dir: args.primer_report_dir,
            reference: args.reference,
            threads: args.threads,
        }
    }
}

fn init_logging(log: Option<&PathBuf>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(path) = log {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    // Capture the command line before clap consumes it
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();

    init_logging(args.log.as_ref())?;
    info!("program started");
    info!("command line: {}", command_line);

    let config = CallerConfig::from(args);
    let summary = run(&config)?;

    info!(
        "program finished: {} samples, {} blocks, {} variants ({} PASS), {} pairs discarded",
        summary.samples, summary.blocks, summary.variants, summary.passing, summary.discarded_pairs
    );
    Ok(())
}
