//! Alignment-record source
//!
//! The caller only needs "all reads intersecting this block". `AlignmentSource`
//! is that contract; `IndexedBamSource` fulfils it with rust-htslib's indexed
//! reader, converting each record into an owned `AlignedRead` (1-based
//! position, decoded CIGAR, MD text, bases paired with qualities).

use anyhow::{Context, Result};
use log::{debug, warn};
use rust_htslib::bam::record::Aux;
use rust_htslib::{bam, bam::Read as BamRead};

use crate::cigar_utils::{self, CigarOp};
use crate::coords::{to_one_based, Interval};
use crate::seq_decode::{ascii_qualities_into, decode_seq_into, make_base_seq, Base};

/// A mapped read, owned by the block being processed
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRead {
    pub name: String,
    pub chrom: String,
    /// Leftmost mapped reference position (1-based)
    pub pos: i64,
    pub cigar: Vec<CigarOp>,
    /// MD tag text, if the record carries one
    pub md: Option<String>,
    pub bases: Vec<Base>,
}

impl AlignedRead {
    /// Build a read from raw parts; `qualities` is the printable (phred+33) string
    pub fn new(
        name: &str,
        chrom: &str,
        pos: i64,
        cigar: Vec<CigarOp>,
        md: Option<&str>,
        seq: &[u8],
        qualities: &[u8],
    ) -> Self {
        Self {
            name: name.to_string(),
            chrom: chrom.to_string(),
            pos,
            cigar,
            md: md.map(str::to_string),
            bases: make_base_seq(name, seq, qualities),
        }
    }

    /// Number of stored read bases
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// Anything that can answer region queries with mapped reads
pub trait AlignmentSource {
    /// Reads whose alignment intersects `region` (1-based, inclusive)
    fn fetch(&mut self, region: &Interval) -> Result<Vec<AlignedRead>>;
}

/// Convert a rust-htslib record, reusing the decode buffers
pub fn aligned_read_from_record(
    record: &bam::Record,
    chrom: &str,
    seq_buf: &mut Vec<u8>,
    qual_buf: &mut Vec<u8>,
) -> AlignedRead {
    let name = String::from_utf8_lossy(record.qname()).into_owned();

    let md = match record.aux(b"MD") {
        Ok(Aux::String(md)) => Some(md.to_string()),
        _ => {
            debug!("read {} has no MD tag", name);
            None
        }
    };

    decode_seq_into(record, seq_buf);
    ascii_qualities_into(record, qual_buf);
    let bases = make_base_seq(&name, seq_buf, qual_buf);

    AlignedRead {
        chrom: chrom.to_string(),
        pos: to_one_based(record.pos()),
        cigar: cigar_utils::from_htslib(record.cigar().iter()),
        md,
        bases,
        name,
    }
}

// ============================================================================
// Indexed BAM
// ============================================================================

/// Region queries against a coordinate-sorted, indexed BAM file
pub struct IndexedBamSource {
    reader: bam::IndexedReader,
    path: String,
    seq_buf: Vec<u8>,
    qual_buf: Vec<u8>,
}

impl IndexedBamSource {
    pub fn from_path(bam_path: &str) -> Result<Self> {
        let reader = bam::IndexedReader::from_path(bam_path)
            .with_context(|| format!("Failed to open indexed BAM {}", bam_path))?;

        Ok(Self {
            reader,
            path: bam_path.to_string(),
            seq_buf: Vec::with_capacity(512),
            qual_buf: Vec::with_capacity(512),
        })
    }
}

impl AlignmentSource for IndexedBamSource {
    fn fetch(&mut self, region: &Interval) -> Result<Vec<AlignedRead>> {
        if self.reader.header().tid(region.chrom.as_bytes()).is_none() {
            warn!(
                "chromosome {} not present in {}, block has no reads",
                region.chrom, self.path
            );
            return Ok(Vec::new());
        }

        let (start, end) = region.to_zero_based_half_open();
        self.reader
            .fetch((region.chrom.as_str(), start, end))
            .with_context(|| {
                format!(
                    "Failed to fetch {}:{}-{} from {}",
                    region.chrom, region.start, region.end, self.path
                )
            })?;

        let mut reads = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result.with_context(|| format!("Failed to read record from {}", self.path))?;

            if record.is_unmapped() {
                debug!(
                    "skipping unmapped read {}",
                    String::from_utf8_lossy(record.qname())
                );
                continue;
            }

            reads.push(aligned_read_from_record(
                &record,
                &region.chrom,
                &mut self.seq_buf,
                &mut self.qual_buf,
            ));
        }

        Ok(reads)
    }
}

// ============================================================================
// Tests
// ============================================================================
