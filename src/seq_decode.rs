use log::warn;
use rust_htslib::bam;

// Matches rust-htslib's internal decode table for BAM 4-bit base encoding.
// See: rust-htslib bam/record.rs `DECODE_BASE`.
const DECODE_BASE: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

/// Offset of the printable quality encoding used by SAM text
pub const PHRED_OFFSET: u8 = 33;

/// BAM stores this in the first quality byte when qualities are absent
const MISSING_QUALITY: u8 = 0xFF;

/// A read base paired with its phred quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Base {
    pub base: u8,
    pub qual: u8,
}

impl Base {
    pub fn new(base: u8, qual: u8) -> Self {
        Self { base, qual }
    }
}

/// Decode one printable quality character
#[inline]
pub fn ascii_to_phred(ascii: u8) -> u8 {
    ascii.saturating_sub(PHRED_OFFSET)
}

/// Pair read bases with their qualities.
///
/// `qualities` is the printable (phred+33) quality string. A read with fewer
/// qualities than bases is padded with phred 0 and a warning is logged; extra
/// qualities are ignored.
pub fn make_base_seq(name: &str, bases: &[u8], qualities: &[u8]) -> Vec<Base> {
    if qualities.len() < bases.len() {
        warn!(
            "In read {} fewer quality scores {} than bases {}",
            name,
            qualities.len(),
            bases.len()
        );
    }

    let padded = qualities
        .iter()
        .map(|&q| ascii_to_phred(q))
        .chain(std::iter::repeat(0));

    bases
        .iter()
        .zip(padded)
        .map(|(&b, q)| Base::new(b, q))
        .collect()
}

/// Decode a BAM record's 4-bit encoded sequence into `out`.
///
/// This avoids the heavy `read.seq().as_bytes()` allocation by reusing `out`.
pub fn decode_seq_into(read: &bam::Record, out: &mut Vec<u8>) {
    let seq = read.seq();
    let len = seq.len();
    let encoded = seq.encoded;

    out.clear();
    out.resize(len, 0);

    // Decode two bases per packed byte (high then low nibble).
    for (i, packed) in encoded.iter().copied().enumerate() {
        let pos = i * 2;
        if pos >= len {
            break;
        }
        let hi = (packed >> 4) as usize;
        out[pos] = DECODE_BASE[hi];
        let pos2 = pos + 1;
        if pos2 < len {
            let lo = (packed & 0x0F) as usize;
            out[pos2] = DECODE_BASE[lo];
        }
    }
}

/// Copy a BAM record's qualities into `out` in printable (phred+33) form.
///
/// A record stored without qualities yields an empty string, so the caller
/// treats it like any other short quality string.
pub fn ascii_qualities_into(read: &bam::Record, out: &mut Vec<u8>) {
    let qual = read.qual();
    out.clear();
    if qual.first() == Some(&MISSING_QUALITY) {
        return;
    }
    out.extend(qual.iter().map(|&q| q.saturating_add(PHRED_OFFSET)));
}
