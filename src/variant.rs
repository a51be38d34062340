//! Variant candidates and their annotations
//!
//! A `Variant` is created by the extractor for one read, compared against the
//! mate's candidates, tallied per block, and finally annotated and written.
//! Two candidates are the same variant when chromosome, position and allele
//! agree; quality, filters, info and indel anchor context do not take part in
//! equality or hashing.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// Annotations
// ============================================================================

/// Reference base preceding an indel, needed for VCF-style REF/ALT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    /// Anchor base is known
    Base(u8),
    /// A soft clip precedes the indel
    SoftClip,
    /// A hard clip precedes the indel
    HardClip,
    /// The indel sits at the start of the aligned read
    Boundary,
}

impl Context {
    /// Anchor character for REF/ALT, `-` when unknown
    pub fn anchor(self) -> char {
        match self {
            Context::Base(b) => b as char,
            _ => '-',
        }
    }

    /// Info flag explaining an unknown anchor
    fn info_flag(self) -> Option<InfoTag> {
        match self {
            Context::Base(_) => None,
            Context::SoftClip => Some(InfoTag::SoftClipContext),
            Context::HardClip => Some(InfoTag::HardClipContext),
            Context::Boundary => Some(InfoTag::BoundaryContext),
        }
    }
}

/// Reason a variant fails filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterTag {
    /// A supporting base is below the quality threshold
    LowQuality,
    /// Supported by fewer pairs than the absolute threshold
    BelowAbsoluteSupport,
    /// Supported by a smaller share of pairs than the proportion threshold
    BelowProportionSupport,
}

impl FilterTag {
    /// Identifier used in the FILTER column and header
    pub fn id(self) -> &'static str {
        match self {
            FilterTag::LowQuality => "qlt",
            FilterTag::BelowAbsoluteSupport => "at",
            FilterTag::BelowProportionSupport => "pt",
        }
    }
}

/// Set of filter tags; empty means PASS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(BTreeSet<FilterTag>);

impl Filters {
    pub fn insert(&mut self, tag: FilterTag) {
        self.0.insert(tag);
    }

    pub fn contains(&self, tag: FilterTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn is_pass(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pass() {
            return f.write_str("PASS");
        }
        let ids: Vec<&str> = self.0.iter().map(|t| t.id()).collect();
        f.write_str(&ids.join(";"))
    }
}

/// One entry of the INFO column
#[derive(Debug, Clone, PartialEq)]
pub enum InfoTag {
    BoundaryContext,
    SoftClipContext,
    HardClipContext,
    Sample(String),
    /// Pairs supporting the variant
    SupportCount(usize),
    /// Valid pairs in the block
    PairCount(usize),
    /// Support as a fraction of valid pairs (rendered as a percentage)
    Proportion(f64),
}

impl fmt::Display for InfoTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoTag::BoundaryContext => f.write_str("BS=T"),
            InfoTag::SoftClipContext => f.write_str("SC=T"),
            InfoTag::HardClipContext => f.write_str("HC=T"),
            InfoTag::Sample(name) => write!(f, "Sample={}", name),
            InfoTag::SupportCount(n) => write!(f, "NV={}", n),
            InfoTag::PairCount(n) => write!(f, "NP={}", n),
            InfoTag::Proportion(p) => write!(f, "PCT={:.2}%", p * 100.0),
        }
    }
}

// ============================================================================
// Variant
// ============================================================================

/// Allele-specific payload of a variant
#[derive(Debug, Clone)]
pub enum VariantKind {
    Snv {
        ref_base: u8,
        alt_base: u8,
        /// Phred quality of the read base
        quality: u8,
    },
    Insertion {
        inserted: Vec<u8>,
        context: Context,
    },
    Deletion {
        deleted: Vec<u8>,
        context: Context,
    },
}

#[derive(PartialEq, Eq, Hash)]
enum AlleleKey<'a> {
    Snv(u8, u8),
    Insertion(&'a [u8]),
    Deletion(&'a [u8]),
}

/// A candidate or called variant
#[derive(Debug, Clone)]
pub struct Variant {
    pub chrom: String,
    /// 1-based coordinate of the event (first inserted/deleted position for indels)
    pub pos: i64,
    pub kind: VariantKind,
    pub filters: Filters,
    pub info: Vec<InfoTag>,
}

impl Variant {
    pub fn snv(chrom: &str, pos: i64, ref_base: u8, alt_base: u8, quality: u8) -> Self {
        Self {
            chrom: chrom.to_string(),
            pos,
            kind: VariantKind::Snv {
                ref_base,
                alt_base,
                quality,
            },
            filters: Filters::default(),
            info: Vec::new(),
        }
    }

    pub fn insertion(chrom: &str, pos: i64, inserted: Vec<u8>, context: Context) -> Self {
        Self::indel(chrom, pos, VariantKind::Insertion { inserted, context }, context)
    }

    pub fn deletion(chrom: &str, pos: i64, deleted: Vec<u8>, context: Context) -> Self {
        Self::indel(chrom, pos, VariantKind::Deletion { deleted, context }, context)
    }

    fn indel(chrom: &str, pos: i64, kind: VariantKind, context: Context) -> Self {
        Self {
            chrom: chrom.to_string(),
            pos,
            kind,
            filters: Filters::default(),
            info: context.info_flag().into_iter().collect(),
        }
    }

    /// Builder-style filter tagging
    pub fn with_filter(mut self, tag: FilterTag) -> Self {
        self.filters.insert(tag);
        self
    }

    fn key(&self) -> (&str, i64, AlleleKey<'_>) {
        let allele = match &self.kind {
            VariantKind::Snv {
                ref_base, alt_base, ..
            } => AlleleKey::Snv(*ref_base, *alt_base),
            VariantKind::Insertion { inserted, .. } => AlleleKey::Insertion(inserted.as_slice()),
            VariantKind::Deletion { deleted, .. } => AlleleKey::Deletion(deleted.as_slice()),
        };
        (&self.chrom, self.pos, allele)
    }

    /// POS column: indels are reported at their anchor base
    pub fn position(&self) -> i64 {
        match self.kind {
            VariantKind::Snv { .. } => self.pos,
            _ => self.pos - 1,
        }
    }

    /// REF column
    pub fn ref_allele(&self) -> String {
        match &self.kind {
            VariantKind::Snv { ref_base, .. } => (*ref_base as char).to_string(),
            VariantKind::Insertion { context, .. } => context.anchor().to_string(),
            VariantKind::Deletion { deleted, context } => {
                format!("{}{}", context.anchor(), String::from_utf8_lossy(deleted))
            }
        }
    }

    /// ALT column
    pub fn alt_allele(&self) -> String {
        match &self.kind {
            VariantKind::Snv { alt_base, .. } => (*alt_base as char).to_string(),
            VariantKind::Insertion { inserted, context } => {
                format!("{}{}", context.anchor(), String::from_utf8_lossy(inserted))
            }
            VariantKind::Deletion { context, .. } => context.anchor().to_string(),
        }
    }

    /// INFO column
    pub fn info_string(&self) -> String {
        self.info
            .iter()
            .map(|tag| tag.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Variant {}

impl Hash for Variant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}>{}",
            self.chrom,
            self.position(),
            self.ref_allele(),
            self.alt_allele()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
