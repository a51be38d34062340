//! Variant calling pipeline
//!
//! Drives one run end to end:
//!
//! 1. load the block table (and primer sequences when primer checking)
//! 2. per BAM: derive the sample name, then select pairs and call every block
//! 3. write variant records, per-sample coverage and primer reports
//!
//! BAM files are independent. With `threads > 1` they are processed on a
//! rayon pool, each worker with its own indexed reader. Results are collected
//! in input order, so the output does not depend on the thread count.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;
use rayon::prelude::*;

use crate::bam_source::{AlignmentSource, IndexedBamSource};
use crate::blocks::{load_blocks, load_primer_sequences, Block};
use crate::consensus::{call_block, BlockResult, CallThresholds, MismatchHistogram};
use crate::error::RoverError;
use crate::id_lookup::{IndexedVcfLookup, VariantIdLookup};
use crate::primer::PrimerChecker;
use crate::read_pairer::{select_reads, PairingStats};
use crate::report;

// ============================================================================
// Configuration and Statistics
// ============================================================================

/// Configuration for a calling run
#[derive(Debug, Clone)]
pub struct CallerConfig {
    /// Block coordinate table
    pub primers: String,
    /// Variant output path
    pub out: String,
    /// Indexed BAM files, one sample each
    pub bams: Vec<String>,
    /// A read must cover strictly more than this proportion of a block
    pub overlap: f64,
    pub proportion_threshold: f64,
    pub absolute_threshold: usize,
    pub quality_threshold: Option<u8>,
    /// Primer sequence table; enables primer checking
    pub primer_check: Option<String>,
    pub primer_threshold: i32,
    pub gap_penalty: i32,
    /// Indexed VCF of known variant IDs
    pub id_info: Option<String>,
    pub coverdir: PathBuf,
    pub primer_report_dir: PathBuf,
    /// Reference FASTA, only echoed into the output header
    pub reference: Option<String>,
    /// BAM files processed in parallel
    pub threads: usize,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            primers: String::new(),
            out: String::new(),
            bams: Vec::new(),
            overlap: 0.9,
            proportion_threshold: 0.05,
            absolute_threshold: 2,
            quality_threshold: None,
            primer_check: None,
            primer_threshold: 5,
            gap_penalty: 0,
            id_info: None,
            coverdir: PathBuf::from("."),
            primer_report_dir: PathBuf::from("."),
            reference: None,
            threads: 1,
        }
    }
}

impl CallerConfig {
    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.overlap) {
            return Err(RoverError::invalid_parameter(
                "overlap",
                format!("must be between 0 and 1, got {}", self.overlap),
            ));
        }
        if !(0.0..=1.0).contains(&self.proportion_threshold) {
            return Err(RoverError::invalid_parameter(
                "proportionthresh",
                format!("must be between 0 and 1, got {}", self.proportion_threshold),
            ));
        }
        if self.primer_threshold < 0 {
            return Err(RoverError::invalid_parameter(
                "primerthresh",
                format!("must be >= 0, got {}", self.primer_threshold),
            ));
        }
        if self.gap_penalty < 0 {
            return Err(RoverError::invalid_parameter(
                "gap_penalty",
                format!("must be >= 0, got {}", self.gap_penalty),
            ));
        }
        if self.threads == 0 {
            return Err(RoverError::invalid_parameter("threads", "must be at least 1"));
        }
        if self.bams.is_empty() {
            return Err(RoverError::invalid_parameter("bams", "at least one BAM file is required"));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> CallThresholds {
        CallThresholds {
            quality: self.quality_threshold,
            absolute: self.absolute_threshold,
            proportion: self.proportion_threshold,
        }
    }

    fn header_info(&self) -> report::HeaderInfo {
        report::HeaderInfo {
            reference: self.reference.clone(),
            quality_threshold: self.quality_threshold,
            absolute_threshold: self.absolute_threshold,
            proportion_threshold: self.proportion_threshold,
        }
    }
}

/// Everything called for one BAM file
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub sample: String,
    pub bam: String,
    /// One entry per block, in block table order
    pub blocks: Vec<BlockResult>,
}

impl SampleResult {
    /// Primer mismatch scores of every block of this sample
    pub fn histogram(&self) -> MismatchHistogram {
        let mut total = MismatchHistogram::default();
        for block in &self.blocks {
            total.merge(&block.histogram);
        }
        total
    }

    pub fn pairing(&self) -> PairingStats {
        let mut total = PairingStats::default();
        for block in &self.blocks {
            total.merge(&block.pairing);
        }
        total
    }
}

/// Totals reported at the end of a run
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub samples: usize,
    pub blocks: usize,
    pub pairs: usize,
    pub discarded_pairs: usize,
    pub variants: usize,
    pub passing: usize,
    pub elapsed_ms: u64,
}

// ============================================================================
// Core Functions
// ============================================================================

/// Sample name of a BAM: its file name up to the first `.`
pub fn sample_name(bam_path: &str) -> crate::error::Result<String> {
    let name = Path::new(bam_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sample = name.split('.').next().unwrap_or_default();

    if sample.is_empty() {
        return Err(RoverError::InvalidSampleName {
            path: bam_path.to_string(),
        });
    }
    Ok(sample.to_string())
}

/// Call every block of one sample against an alignment source
pub fn process_sample<S: AlignmentSource + ?Sized>(
    sample: &str,
    source: &mut S,
    blocks: &[Block],
    config: &CallerConfig,
    primers: Option<&PrimerChecker>,
) -> Result<Vec<BlockResult>> {
    let thresholds = config.thresholds();
    let mut results = Vec::with_capacity(blocks.len());

    for block in blocks {
        info!(
            "processing block chr: {}, start: {}, end: {}",
            block.chrom, block.start, block.end
        );
        let (pairs, pairing) = select_reads(&block.interval(), config.overlap, source)?;
        let result = call_block(block, &pairs, pairing, sample, &thresholds, primers)
            .with_context(|| format!("Failed to call block {}:{}-{}", block.chrom, block.start, block.end))?;
        results.push(result);
    }

    Ok(results)
}

fn process_bam(
    bam: &str,
    blocks: &[Block],
    config: &CallerConfig,
    primers: Option<&PrimerChecker>,
) -> Result<SampleResult> {
    let sample = sample_name(bam)?;
    let mut source = IndexedBamSource::from_path(bam)?;
    info!("processing bam file {}", bam);

    let results = process_sample(&sample, &mut source, blocks, config, primers)
        .with_context(|| format!("Failed to process {}", bam))?;

    Ok(SampleResult {
        sample,
        bam: bam.to_string(),
        blocks: results,
    })
}

/// Process every BAM, in parallel when `config.threads > 1`.
///
/// Results are returned in the order of `config.bams`.
pub fn process_bams(
    blocks: &[Block],
    config: &CallerConfig,
    primers: Option<&PrimerChecker>,
) -> Result<Vec<SampleResult>> {
    if config.threads <= 1 || config.bams.len() <= 1 {
        return config
            .bams
            .iter()
            .map(|bam| process_bam(bam, blocks, config, primers))
            .collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .context("Failed to build Rayon thread pool")?;

    pool.install(|| {
        config
            .bams
            .par_iter()
            .map(|bam| process_bam(bam, blocks, config, primers))
            .collect()
    })
}

/// Write variant records of every sample, in sample then block order.
///
/// Only PASS variants are looked up in `ids`.
pub fn write_calls<W: Write>(
    out: &mut W,
    samples: &[SampleResult],
    mut ids: Option<&mut dyn VariantIdLookup>,
) -> Result<()> {
    for sample in samples {
        for block in &sample.blocks {
            for variant in &block.variants {
                let id = match ids.as_deref_mut() {
                    Some(lookup) if variant.filters.is_pass() => lookup.lookup(
                        &variant.chrom,
                        variant.position(),
                        &variant.ref_allele(),
                        &variant.alt_allele(),
                    )?,
                    _ => None,
                };
                report::write_variant(out, variant, id.as_deref())?;
            }
        }
    }
    Ok(())
}

fn write_sample_reports(
    sample: &SampleResult,
    blocks: &[Block],
    config: &CallerConfig,
    primer_check: bool,
) -> Result<()> {
    let stats: Vec<_> = sample.blocks.iter().map(|b| b.stats.clone()).collect();
    report::write_coverage(&report::coverage_path(&config.coverdir, &sample.sample), &stats)?;

    if primer_check {
        let histograms: Vec<(String, MismatchHistogram)> = blocks
            .iter()
            .zip(&sample.blocks)
            .map(|(block, result)| (block.forward_primer.clone(), result.histogram.clone()))
            .collect();
        report::write_block_histograms(
            &report::primer_blocks_path(&config.primer_report_dir, &sample.sample),
            &histograms,
        )?;
    }
    Ok(())
}

/// Run the caller as configured
pub fn run(config: &CallerConfig) -> Result<RunSummary> {
    let start = Instant::now();
    config.validate()?;

    let blocks = load_blocks(&config.primers)?;
    info!("loaded {} blocks from {}", blocks.len(), config.primers);

    let primers = match &config.primer_check {
        Some(path) => {
            let sequences = load_primer_sequences(path)?;
            info!("loaded {} primer sequences from {}", sequences.len(), path);
            Some(PrimerChecker::new(
                sequences,
                config.gap_penalty,
                config.primer_threshold,
                &blocks,
            )?)
        }
        None => None,
    };

    let mut ids = match &config.id_info {
        Some(path) => Some(IndexedVcfLookup::from_path(path)?),
        None => None,
    };

    let file = File::create(&config.out)
        .with_context(|| format!("Failed to create output file {}", config.out))?;
    let mut out = BufWriter::new(file);
    report::write_vcf_header(&mut out, &config.header_info(), &report::today_yyyymmdd())?;

    let samples = process_bams(&blocks, config, primers.as_ref())?;

    write_calls(
        &mut out,
        &samples,
        ids.as_mut().map(|l| l as &mut dyn VariantIdLookup),
    )?;
    out.flush()
        .with_context(|| format!("Failed to write output file {}", config.out))?;

    let mut total_histogram = MismatchHistogram::default();
    let mut summary = RunSummary {
        samples: samples.len(),
        blocks: blocks.len(),
        ..RunSummary::default()
    };

    for sample in &samples {
        write_sample_reports(sample, &blocks, config, primers.is_some())?;
        total_histogram.merge(&sample.histogram());

        let pairing = sample.pairing();
        info!(
            "sample {}: {} pairs, {} singletons, {} over-paired names",
            sample.sample, pairing.pairs, pairing.singletons, pairing.overpaired
        );

        for block in &sample.blocks {
            summary.pairs += block.pairing.pairs;
            summary.discarded_pairs += block.discarded_pairs;
            summary.variants += block.variants.len();
            summary.passing += block.variants.iter().filter(|v| v.filters.is_pass()).count();
        }
    }

    if primers.is_some() {
        report::write_total_histogram(
            &report::primer_totals_path(&config.primer_report_dir),
            &total_histogram,
        )?;
    }

    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        "done: samples={} pairs={} variants={} passing={} in {}ms",
        summary.samples, summary.pairs, summary.variants, summary.passing, summary.elapsed_ms
    );
    Ok(summary)
}

// ============================================================================
// Tests
// ============================================================================
