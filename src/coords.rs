//! Genomic coordinate conventions
//!
//! Everything inside the caller speaks 1-based, inclusive coordinates (the
//! convention of the primer table and of VCF output). rust-htslib speaks
//! 0-based, half-open coordinates. The functions here are the only place the
//! two meet; `bam_source` and `id_lookup` call them at the library boundary.

/// A 1-based, inclusive genomic range on one chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub chrom: String,
    /// First covered base (1-based)
    pub start: i64,
    /// Last covered base (1-based, inclusive)
    pub end: i64,
}

impl Interval {
    pub fn new(chrom: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// Number of bases covered; 0 for an inverted range
    pub fn len(&self) -> i64 {
        (self.end - self.start + 1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos <= self.end
    }

    /// The same range as 0-based, half-open `(start, end)` for htslib fetches
    pub fn to_zero_based_half_open(&self) -> (i64, i64) {
        (self.start - 1, self.end)
    }
}

/// Convert a 0-based position reported by htslib to 1-based
#[inline]
pub fn to_one_based(zero_based: i64) -> i64 {
    zero_based + 1
}

/// Convert a 1-based position to the 0-based position htslib expects
#[inline]
pub fn to_zero_based(one_based: i64) -> i64 {
    one_based - 1
}
