//! CIGAR model used by the variant extractor
//!
//! rust-htslib's `Cigar` carries the length inside each variant, which makes
//! the co-walk (where a match op is consumed piecemeal against MD runs)
//! awkward. We convert once at the BAM boundary into `(kind, length)` pairs.
//!
//! ## CIGAR Operations
//! - M/=/X: consume both ref and query (1:1 mapping)
//! - I: consume query only (insertion in read)
//! - D/N: consume ref only (deletion/skip in read)
//! - S: consume query only (soft clip)
//! - H/P: consume neither

use rust_htslib::bam::record::Cigar;
use std::fmt;

/// Kind of a CIGAR operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarKind {
    Match,
    Insertion,
    Deletion,
    RefSkip,
    SoftClip,
    HardClip,
    Pad,
    Equal,
    Diff,
}

impl CigarKind {
    /// SAM character for this operation
    pub fn code(self) -> char {
        match self {
            CigarKind::Match => 'M',
            CigarKind::Insertion => 'I',
            CigarKind::Deletion => 'D',
            CigarKind::RefSkip => 'N',
            CigarKind::SoftClip => 'S',
            CigarKind::HardClip => 'H',
            CigarKind::Pad => 'P',
            CigarKind::Equal => '=',
            CigarKind::Diff => 'X',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'M' => CigarKind::Match,
            'I' => CigarKind::Insertion,
            'D' => CigarKind::Deletion,
            'N' => CigarKind::RefSkip,
            'S' => CigarKind::SoftClip,
            'H' => CigarKind::HardClip,
            'P' => CigarKind::Pad,
            '=' => CigarKind::Equal,
            'X' => CigarKind::Diff,
            _ => return None,
        })
    }

    /// Whether the operation consumes read (query) bases
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarKind::Match
                | CigarKind::Insertion
                | CigarKind::SoftClip
                | CigarKind::Equal
                | CigarKind::Diff
        )
    }
}

/// A single CIGAR operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32,
}

impl CigarOp {
    pub fn new(kind: CigarKind, len: u32) -> Self {
        Self { kind, len }
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.code())
    }
}

impl From<&Cigar> for CigarOp {
    fn from(op: &Cigar) -> Self {
        match *op {
            Cigar::Match(len) => CigarOp::new(CigarKind::Match, len),
            Cigar::Ins(len) => CigarOp::new(CigarKind::Insertion, len),
            Cigar::Del(len) => CigarOp::new(CigarKind::Deletion, len),
            Cigar::RefSkip(len) => CigarOp::new(CigarKind::RefSkip, len),
            Cigar::SoftClip(len) => CigarOp::new(CigarKind::SoftClip, len),
            Cigar::HardClip(len) => CigarOp::new(CigarKind::HardClip, len),
            Cigar::Pad(len) => CigarOp::new(CigarKind::Pad, len),
            Cigar::Equal(len) => CigarOp::new(CigarKind::Equal, len),
            Cigar::Diff(len) => CigarOp::new(CigarKind::Diff, len),
        }
    }
}

/// Convert rust-htslib CIGAR operations
pub fn from_htslib<'a>(ops: impl IntoIterator<Item = &'a Cigar>) -> Vec<CigarOp> {
    ops.into_iter().map(CigarOp::from).collect()
}

/// Parse CIGAR text such as `5M2I5M`; `None` if it is not valid CIGAR
pub fn parse_cigar(text: &str) -> Option<Vec<CigarOp>> {
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut seen_digit = false;

    for c in text.chars() {
        if let Some(d) = c.to_digit(10) {
            len = len.checked_mul(10)?.checked_add(d)?;
            seen_digit = true;
        } else {
            let kind = CigarKind::from_code(c)?;
            if !seen_digit {
                return None;
            }
            ops.push(CigarOp::new(kind, len));
            len = 0;
            seen_digit = false;
        }
    }

    if seen_digit {
        return None;
    }
    Some(ops)
}

/// Number of read bases the CIGAR accounts for
pub fn query_len(ops: &[CigarOp]) -> usize {
    ops.iter()
        .filter(|op| op.kind.consumes_query())
        .map(|op| op.len as usize)
        .sum()
}

/// Render operations back to CIGAR text
pub fn to_cigar_string(ops: &[CigarOp]) -> String {
    ops.iter().map(|op| op.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================
