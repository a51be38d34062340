//! Error types for variant calling.
//!
//! Only conditions that stop the run live here. Recoverable per-read problems
//! (unpaired reads, short quality strings, clipped indel anchors) are logged
//! where they occur and never surface as errors.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, RoverError>;

/// Fatal error raised by the caller core
#[derive(Error, Debug)]
pub enum RoverError {
    /// CIGAR and MD disagree, or the CIGAR uses an operation we cannot decode
    #[error("Malformed alignment for read '{read}': {reason}")]
    MalformedAlignment {
        /// Name of the offending read
        read: String,
        /// What contradiction was found
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A row of a tab-separated input table could not be parsed
    #[error("Invalid table '{path}' at line {line}: {reason}")]
    InvalidTable {
        /// Path to the table
        path: String,
        /// 1-based line number
        line: usize,
        /// Explanation of the problem
        reason: String,
    },

    /// A block references a primer with no known sequence
    #[error("Primer '{primer_id}' of block {chrom}:{start}-{end} has no sequence in the primer table")]
    MissingPrimer {
        /// The primer identifier
        primer_id: String,
        /// Block chromosome
        chrom: String,
        /// Block start (1-based)
        start: i64,
        /// Block end (1-based, inclusive)
        end: i64,
    },

    /// No sample name can be derived from the BAM path
    #[error("Cannot deduce sample name from bam filename '{path}'")]
    InvalidSampleName {
        /// The BAM path
        path: String,
    },
}

impl RoverError {
    pub(crate) fn malformed(read: &str, reason: impl Into<String>) -> Self {
        RoverError::MalformedAlignment {
            read: read.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        RoverError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}
