//! Output writers
//!
//! - variant calls: VCF 4.2 style text, header first, one record per variant
//! - coverage: per-sample TSV of valid pairs per block
//! - primer reports: mismatch score histograms per block and for the whole run

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::consensus::{BlockStats, MismatchHistogram};
use crate::variant::{FilterTag, Variant};

pub const VCF_SOURCE: &str = "ROVER-PCR Variant Caller";

/// Column header line of the variant output
pub const VCF_COLUMNS: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO";

/// Settings echoed into the VCF header
#[derive(Debug, Clone, Default)]
pub struct HeaderInfo {
    pub reference: Option<String>,
    pub quality_threshold: Option<u8>,
    pub absolute_threshold: usize,
    pub proportion_threshold: f64,
}

// ============================================================================
// Variant calls
// ============================================================================

/// Write meta-information lines and the column header
pub fn write_vcf_header<W: Write>(out: &mut W, header: &HeaderInfo, file_date: &str) -> io::Result<()> {
    writeln!(out, "##fileformat=VCFv4.2")?;
    writeln!(out, "##fileDate={}", file_date)?;
    writeln!(out, "##source={}", VCF_SOURCE)?;
    if let Some(reference) = &header.reference {
        writeln!(out, "##reference=file:///{}", reference)?;
    }

    let info_lines = [
        ("Sample", "1", "String", "Sample Name"),
        ("NV", "1", "Float", "Number of read pairs with variant"),
        ("NP", "1", "Float", "Number of read pairs at POS"),
        ("PCT", "1", "Float", "Percentage of read pairs at POS with variant"),
        (
            "BS",
            "1",
            "String",
            "Context base cannot be determined as indel is located near a region not covered by the MD string",
        ),
        (
            "HC",
            "1",
            "String",
            "Context base cannot be determined due to hard clipping on the aligned sequence prior to indel event",
        ),
        (
            "SC",
            "1",
            "String",
            "Context base cannot be determined due to soft clipping on the aligned sequence prior to indel event",
        ),
        ("IP", "1", "String", "Misaligned or incorrect base sequence in primer region"),
    ];
    for (id, number, kind, description) in info_lines {
        writeln!(
            out,
            "##INFO=<ID={},Number={},Type={},Description=\"{}\">",
            id, number, kind, description
        )?;
    }

    if let Some(qual) = header.quality_threshold {
        writeln!(
            out,
            "##FILTER=<ID={},Description=\"Variant has phred quality score below {}\">",
            FilterTag::LowQuality.id(),
            qual
        )?;
    }
    if header.absolute_threshold > 0 {
        writeln!(
            out,
            "##FILTER=<ID={},Description=\"Variant does not appear in at least {} read pairs\">",
            FilterTag::BelowAbsoluteSupport.id(),
            header.absolute_threshold
        )?;
    }
    if header.proportion_threshold > 0.0 {
        writeln!(
            out,
            "##FILTER=<ID={},Description=\"Variant does not appear in at least {}% of read pairs for the given region\">",
            FilterTag::BelowProportionSupport.id(),
            header.proportion_threshold * 100.0
        )?;
    }

    writeln!(out, "{}", VCF_COLUMNS)
}

/// Write one variant record; `id` is `.` when unknown
pub fn write_variant<W: Write>(out: &mut W, variant: &Variant, id: Option<&str>) -> io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t.\t{}\t{}",
        variant.chrom,
        variant.position(),
        id.unwrap_or("."),
        variant.ref_allele(),
        variant.alt_allele(),
        variant.filters,
        variant.info_string()
    )
}

// ============================================================================
// Coverage
// ============================================================================

pub fn coverage_path(coverdir: &Path, sample: &str) -> PathBuf {
    coverdir.join(format!("{}.coverage", sample))
}

/// Write block coverage, ascending by pair count (ties keep block order)
pub fn write_coverage(path: &Path, blocks: &[BlockStats]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create coverage file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let mut sorted: Vec<&BlockStats> = blocks.iter().collect();
    sorted.sort_by_key(|b| b.valid_pairs);

    writeln!(out, "chr\tblock_start\tblock_end\tnum_pairs")?;
    for b in sorted {
        writeln!(out, "{}\t{}\t{}\t{}", b.chrom, b.start, b.end, b.valid_pairs)?;
    }
    out.flush()
        .with_context(|| format!("Failed to write coverage file {}", path.display()))?;
    Ok(())
}

// ============================================================================
// Primer histograms
// ============================================================================

pub fn primer_blocks_path(dir: &Path, sample: &str) -> PathBuf {
    dir.join(format!("{}.primer_blocks.tsv", sample))
}

pub fn primer_totals_path(dir: &Path) -> PathBuf {
    dir.join("primer_totals.tsv")
}

/// `score<TAB>percentage` rows for scores below the report limit
pub fn write_histogram_rows<W: Write>(out: &mut W, histogram: &MismatchHistogram) -> io::Result<()> {
    for (score, fraction) in histogram.report_rows() {
        writeln!(out, "{}\t{:.2}%", score, fraction * 100.0)?;
    }
    Ok(())
}

/// Per-block histograms, each headed by the block's forward primer id
/// and followed by two blank lines
pub fn write_block_histograms(path: &Path, blocks: &[(String, MismatchHistogram)]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create primer report {}", path.display()))?;
    let mut out = BufWriter::new(file);

    for (primer_id, histogram) in blocks {
        writeln!(out, "# {}", primer_id)?;
        write_histogram_rows(&mut out, histogram)?;
        write!(out, "\n\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Run-wide histogram merged over every block of every sample
pub fn write_total_histogram(path: &Path, histogram: &MismatchHistogram) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create primer report {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_histogram_rows(&mut out, histogram)?;
    out.flush()?;
    Ok(())
}

// ============================================================================
// Dates
// ============================================================================

/// Today's UTC date as `YYYYMMDD`
pub fn today_yyyymmdd() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    format!("{:04}{:02}{:02}", y, m, d)
}

/// Gregorian `(year, month, day)` of a day count since 1970-01-01
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

// ============================================================================
// Tests
// ============================================================================
