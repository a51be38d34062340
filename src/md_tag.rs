//! MD tag decoding
//!
//! The MD auxiliary tag records the reference bases at every mismatch and
//! deletion of an alignment, so mismatches can be recovered without a
//! reference FASTA. Grammar (SAMv1 section 1.5):
//!
//! ```text
//! [0-9]+(([A-Z]|\^[A-Z]+)[0-9]+)*
//! ```
//!
//! `parse_md` is a greedy left-to-right descent. Text that cannot continue the
//! grammar ends the token stream silently, since it cannot be legal MD.

use std::fmt;

/// One element of a parsed MD string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdToken {
    /// Run of reference-matching bases (may be 0 between adjacent events)
    Match(u32),
    /// Single mismatched reference base
    Mismatch(u8),
    /// Reference bases deleted from the read
    Deletion(Vec<u8>),
}

impl fmt::Display for MdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdToken::Match(size) => write!(f, "{}", size),
            MdToken::Mismatch(base) => write!(f, "{}", *base as char),
            MdToken::Deletion(bases) => write!(f, "^{}", String::from_utf8_lossy(bases)),
        }
    }
}

/// Parse an MD string into its token sequence
pub fn parse_md(md: &str) -> Vec<MdToken> {
    let bytes = md.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    loop {
        // Every event is preceded by a match run
        let digits_end = scan(bytes, i, |b| b.is_ascii_digit());
        if digits_end == i {
            break;
        }
        let size = match md[i..digits_end].parse::<u32>() {
            Ok(size) => size,
            Err(_) => break,
        };
        tokens.push(MdToken::Match(size));
        i = digits_end;

        match bytes.get(i) {
            Some(b) if b.is_ascii_uppercase() => {
                tokens.push(MdToken::Mismatch(*b));
                i += 1;
            }
            Some(b'^') => {
                let deleted_end = scan(bytes, i + 1, |b| b.is_ascii_uppercase());
                if deleted_end == i + 1 {
                    break;
                }
                tokens.push(MdToken::Deletion(bytes[i + 1..deleted_end].to_vec()));
                i = deleted_end;
            }
            _ => break,
        }
    }

    tokens
}

/// Serialise tokens back into MD text
pub fn to_md_string(tokens: &[MdToken]) -> String {
    tokens.iter().map(|t| t.to_string()).collect()
}

fn scan(bytes: &[u8], from: usize, pred: impl Fn(u8) -> bool) -> usize {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|&b| !pred(b))
        .map_or(bytes.len(), |offset| from + offset)
}

// ============================================================================
// Tests
// ============================================================================
