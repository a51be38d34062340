//! CIGAR/MD co-walk
//!
//! Converts one mapped read into typed variant candidates without a reference
//! FASTA. The CIGAR operations and the MD tokens are consumed in lock-step:
//! M ops are split against MD match runs and mismatches, D ops must line up
//! with an MD deletion of the same length, I and clip ops never touch MD.
//!
//! The walk carries a rolling `Context` (last resolved reference base, or a
//! clip/boundary marker) which becomes the anchor of the next indel.

use std::collections::VecDeque;

use crate::bam_source::AlignedRead;
use crate::cigar_utils::{to_cigar_string, CigarKind, CigarOp};
use crate::error::{Result, RoverError};
use crate::md_tag::{parse_md, MdToken};
use crate::seq_decode::Base;
use crate::variant::{Context, FilterTag, Variant};

/// Extract the variants one read supports.
///
/// # Arguments
/// * `read` - Aligned read with CIGAR and (optionally) MD tag
/// * `quality_threshold` - Phred threshold; bases below it tag the variant `qlt`
///
/// # Returns
/// Variants in read order, or `MalformedAlignment` when CIGAR and MD disagree.
/// A read without an MD tag has nothing to walk and yields no variants.
pub fn extract(read: &AlignedRead, quality_threshold: Option<u8>) -> Result<Vec<Variant>> {
    let md = read.md.as_deref().map(parse_md).unwrap_or_default();
    Walker::new(read, md, quality_threshold).run()
}

struct Walker<'a> {
    read: &'a AlignedRead,
    cigar: VecDeque<CigarOp>,
    md: VecDeque<MdToken>,
    quality_threshold: Option<u8>,
    /// Reference position of the next aligned base (1-based)
    pos: i64,
    /// Index of the next unconsumed read base
    seq_index: usize,
    context: Context,
    variants: Vec<Variant>,
}

impl<'a> Walker<'a> {
    fn new(read: &'a AlignedRead, md: Vec<MdToken>, quality_threshold: Option<u8>) -> Self {
        Self {
            read,
            cigar: read.cigar.iter().copied().collect(),
            md: md.into(),
            quality_threshold,
            pos: read.pos,
            seq_index: 0,
            context: Context::Boundary,
            variants: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Variant>> {
        self.walk()?;
        Ok(self.variants)
    }

    fn walk(&mut self) -> Result<()> {
        loop {
            // Ops and runs worn down to nothing carry no information
            while matches!(self.cigar.front(), Some(op) if op.len == 0) {
                self.cigar.pop_front();
            }
            while matches!(self.md.front(), Some(MdToken::Match(0))) {
                self.md.pop_front();
            }

            let op = match self.cigar.front() {
                Some(op) => *op,
                None => break,
            };
            if self.md.is_empty() {
                break;
            }

            match op.kind {
                CigarKind::Match => self.match_step(op.len as usize)?,
                CigarKind::Insertion => self.insertion_step(op.len as usize)?,
                CigarKind::Deletion => self.deletion_step(op.len as usize)?,
                CigarKind::SoftClip => {
                    self.take(op.len as usize)?;
                    self.context = Context::SoftClip;
                    self.cigar.pop_front();
                }
                CigarKind::HardClip => {
                    // Hard-clipped bases are not stored and do not move the reference cursor
                    self.context = Context::HardClip;
                    self.cigar.pop_front();
                }
                CigarKind::RefSkip | CigarKind::Pad | CigarKind::Equal | CigarKind::Diff => {
                    return Err(self.error(format!(
                        "unexpected CIGAR operation '{}'",
                        op.kind.code()
                    )));
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn match_step(&mut self, len: usize) -> Result<()> {
        match self.md.front() {
            Some(MdToken::Match(size)) => {
                let size = *size as usize;
                let consumed = size.min(len);
                if let Some(last) = self.take(consumed)?.last() {
                    self.context = Context::Base(last.base);
                }
                self.pos += consumed as i64;

                if consumed == size {
                    self.md.pop_front();
                } else {
                    self.md[0] = MdToken::Match((size - consumed) as u32);
                }
                self.shorten_front(consumed);
            }
            Some(MdToken::Mismatch(ref_base)) => {
                let ref_base = *ref_base;
                let base = self.take(1)?[0];

                let mut snv = Variant::snv(&self.read.chrom, self.pos, ref_base, base.base, base.qual);
                if self.below_threshold(base.qual) {
                    snv = snv.with_filter(FilterTag::LowQuality);
                }
                self.variants.push(snv);

                self.context = Context::Base(ref_base);
                self.md.pop_front();
                self.pos += 1;
                self.shorten_front(1);
            }
            Some(MdToken::Deletion(_)) => {
                return Err(self.error("MD deletion inside CIGAR match"));
            }
            None => {}
        }
        Ok(())
    }

    fn insertion_step(&mut self, len: usize) -> Result<()> {
        let bases = self.take(len)?;
        let inserted: Vec<u8> = bases.iter().map(|b| b.base).collect();
        let low_quality = bases.iter().any(|b| self.below_threshold(b.qual));

        let mut insertion = Variant::insertion(&self.read.chrom, self.pos, inserted, self.context);
        if low_quality {
            insertion = insertion.with_filter(FilterTag::LowQuality);
        }
        self.variants.push(insertion);

        self.cigar.pop_front();
        Ok(())
    }

    fn deletion_step(&mut self, len: usize) -> Result<()> {
        let deleted = match self.md.front() {
            Some(MdToken::Deletion(deleted)) if deleted.len() == len => deleted.clone(),
            Some(MdToken::Deletion(deleted)) => {
                return Err(self.error(format!(
                    "CIGAR deletion of {} bases but MD deletes {}",
                    len,
                    deleted.len()
                )));
            }
            Some(_) | None => return Err(self.error("non-deletion MD token in CIGAR deletion")),
        };

        // Judged on the read base following the deletion, when there is one
        let low_quality = self
            .read
            .bases
            .get(self.seq_index)
            .map_or(false, |b| self.below_threshold(b.qual));

        let next_context = deleted.last().map_or(self.context, |&b| Context::Base(b));
        let mut deletion = Variant::deletion(&self.read.chrom, self.pos, deleted, self.context);
        if low_quality {
            deletion = deletion.with_filter(FilterTag::LowQuality);
        }
        self.variants.push(deletion);

        self.context = next_context;
        self.pos += len as i64;
        self.md.pop_front();
        self.cigar.pop_front();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Cursors
    // ------------------------------------------------------------------------

    /// Consume `n` read bases
    fn take(&mut self, n: usize) -> Result<&'a [Base]> {
        let start = self.seq_index;
        let end = start + n;
        let read: &'a AlignedRead = self.read;
        match read.bases.get(start..end) {
            Some(bases) => {
                self.seq_index = end;
                Ok(bases)
            }
            None => Err(self.error(format!(
                "CIGAR consumes bases {}..{} of a {} base read",
                start,
                end,
                read.len()
            ))),
        }
    }

    /// Reduce the leading CIGAR op by `n`; it is dropped once it reaches zero
    fn shorten_front(&mut self, n: usize) {
        if let Some(op) = self.cigar.front_mut() {
            op.len -= n as u32;
        }
    }

    fn below_threshold(&self, qual: u8) -> bool {
        self.quality_threshold.map_or(false, |t| qual < t)
    }

    fn error(&self, reason: impl Into<String>) -> RoverError {
        RoverError::malformed(
            &self.read.name,
            format!(
                "{} (CIGAR {}, MD {})",
                reason.into(),
                to_cigar_string(&self.read.cigar),
                self.read.md.as_deref().unwrap_or("<none>")
            ),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar_utils::{parse_cigar, query_len};
    use crate::variant::{InfoTag, VariantKind};

    fn read(pos: i64, cigar: &str, md: Option<&str>, seq: &[u8], qual: &[u8]) -> AlignedRead {
        AlignedRead::new("r1", "chr1", pos, parse_cigar(cigar).unwrap(), md, seq, qual)
    }

    fn good(seq: &[u8]) -> Vec<u8> {
        vec![b'I'; seq.len()]
    }

    #[test]
    fn test_single_mismatch() {
        let seq = b"ACGTACGTAC";
        let r = read(101, "10M", Some("3A6"), seq, &good(seq));
        let variants = extract(&r, Some(20)).unwrap();

        assert_eq!(variants.len(), 1);
        let v = &variants[0];
        assert_eq!(v.pos, 104);
        assert!(v.filters.is_pass());
        match v.kind {
            VariantKind::Snv { ref_base, alt_base, quality } => {
                assert_eq!(ref_base, b'A');
                assert_eq!(alt_base, b'T');
                assert_eq!(quality, 40);
            }
            _ => panic!("expected SNV, got {:?}", v),
        }
    }

    #[test]
    fn test_no_variants_on_perfect_match() {
        let seq = b"ACGTACGTAC";
        let r = read(101, "10M", Some("10"), seq, &good(seq));
        assert!(extract(&r, None).unwrap().is_empty());
    }

    #[test]
    fn test_insertion_anchor_is_preceding_base() {
        let seq = b"ACGTAGGCGTAC";
        let r = read(101, "5M2I5M", Some("10"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 1);
        let ins = &variants[0];
        assert_eq!(ins.pos, 106);
        assert_eq!(ins.position(), 105);
        assert_eq!(ins.ref_allele(), "A");
        assert_eq!(ins.alt_allele(), "AGG");
        assert!(ins.info.is_empty());
    }

    #[test]
    fn test_deletion() {
        let seq = b"ACGTACGTAC";
        let r = read(101, "5M3D5M", Some("5^ACG5"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 1);
        let del = &variants[0];
        assert_eq!(del.pos, 106);
        assert_eq!(del.ref_allele(), "AACG");
        assert_eq!(del.alt_allele(), "A");
    }

    #[test]
    fn test_positions_after_deletion_shift() {
        // Mismatch after a 2bp deletion lands 2 reference bases further on
        let seq = b"AAAAACAAAA";
        let r = read(1, "5M2D5M", Some("5^GT0A4"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].pos, 6);
        assert_eq!(variants[1].pos, 8);
        assert_eq!(variants[1].ref_allele(), "A");
        assert_eq!(variants[1].alt_allele(), "C");
    }

    #[test]
    fn test_deletion_context_is_last_deleted_base() {
        // An insertion straight after a deletion anchors on the deleted base
        let seq = b"ACGTATTACGTA";
        let r = read(1, "5M2D2I5M", Some("5^GC5"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[1].ref_allele(), "C");
        assert_eq!(variants[1].alt_allele(), "CTT");
        assert_eq!(variants[1].pos, 8);
    }

    #[test]
    fn test_mismatch_directly_before_deletion() {
        let seq = b"ACGGACGT";
        let r = read(1, "4M1D4M", Some("3T0^A4"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].pos, 4);
        assert_eq!(variants[1].pos, 5);
        // Anchor is the reference base at the mismatch, not the read base
        assert_eq!(variants[1].ref_allele(), "TA");
    }

    #[test]
    fn test_insertion_after_mismatch_anchors_on_reference_base() {
        let seq = b"ACGGTTACGT";
        let r = read(1, "4M2I4M", Some("3T4"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 2);
        assert_eq!((variants[0].ref_allele().as_str(), variants[0].alt_allele().as_str()), ("T", "G"));
        assert_eq!(variants[1].position(), 4);
        assert_eq!(variants[1].ref_allele(), "T");
        assert_eq!(variants[1].alt_allele(), "TTT");
    }

    #[test]
    fn test_adjacent_mismatches() {
        let seq = b"TTGTACGTAC";
        let r = read(50, "10M", Some("0A0C8"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        let positions: Vec<i64> = variants.iter().map(|v| v.pos).collect();
        assert_eq!(positions, vec![50, 51]);
        assert_eq!(variants[1].ref_allele(), "C");
        assert_eq!(variants[1].alt_allele(), "T");
    }

    #[test]
    fn test_mismatch_at_end_of_match_op() {
        // The M op is exhausted by the mismatch and the insertion follows it
        let seq = b"ACGTTGG";
        let r = read(10, "5M2I", Some("4A"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].pos, 14);
    }

    #[test]
    fn test_low_quality_snv() {
        let seq = b"ACGTACGTAC";
        let qual = b"IIII#IIIII";
        let r = read(1, "10M", Some("4G5"), seq, qual);

        let tagged = extract(&r, Some(20)).unwrap();
        assert!(tagged[0].filters.contains(FilterTag::LowQuality));

        let untagged = extract(&r, None).unwrap();
        assert!(untagged[0].filters.is_pass());
    }

    #[test]
    fn test_quality_equal_to_threshold_passes() {
        let seq = b"ACGT";
        // '5' is phred 20
        let r = read(1, "4M", Some("1A2"), seq, b"5555");
        assert!(extract(&r, Some(20)).unwrap()[0].filters.is_pass());
        assert!(!extract(&r, Some(21)).unwrap()[0].filters.is_pass());
    }

    #[test]
    fn test_insertion_low_quality_if_any_base_low() {
        let seq = b"ACGTAGGCGTAC";
        let qual = b"IIIIII#IIIII";
        let r = read(1, "5M2I5M", Some("10"), seq, qual);
        let variants = extract(&r, Some(30)).unwrap();
        assert!(variants[0].filters.contains(FilterTag::LowQuality));
    }

    #[test]
    fn test_deletion_quality_from_following_base() {
        let seq = b"ACGTACGTAC";
        let qual = b"IIIII#IIII";
        let r = read(1, "5M1D5M", Some("5^A5"), seq, qual);
        assert!(extract(&r, Some(30)).unwrap()[0]
            .filters
            .contains(FilterTag::LowQuality));

        // Nothing follows a trailing deletion, so it cannot be judged low quality
        let seq = b"ACGTA";
        let r = read(1, "5M1D", Some("5^A0"), seq, b"#####");
        let variants = extract(&r, Some(30)).unwrap();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].filters.is_pass());
    }

    #[test]
    fn test_soft_clip_skips_bases() {
        let seq = b"NNACGTACGT";
        let r = read(101, "2S8M", Some("3A4"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].pos, 104);
        assert_eq!(variants[0].alt_allele(), "T");
    }

    #[test]
    fn test_indel_after_soft_clip_is_flagged() {
        let seq = b"NNTTACGT";
        let r = read(101, "2S2I4M", Some("4"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();

        assert_eq!(variants[0].pos, 101);
        assert_eq!(variants[0].ref_allele(), "-");
        assert_eq!(variants[0].info, vec![InfoTag::SoftClipContext]);
    }

    #[test]
    fn test_indel_at_read_start_is_flagged() {
        let seq = b"TTACGT";
        let r = read(101, "2I4M", Some("4"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();
        assert_eq!(variants[0].info, vec![InfoTag::BoundaryContext]);
        assert_eq!(variants[0].alt_allele(), "-TT");
    }

    #[test]
    fn test_leading_hard_clip_keeps_position() {
        let seq = b"ACGTACGTAC";
        let r = read(101, "5H10M", Some("3A6"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();
        assert_eq!(variants[0].pos, 104);

        let r = read(101, "5H1D10M", Some("0^G10"), seq, &good(seq));
        let variants = extract(&r, None).unwrap();
        assert_eq!(variants[0].pos, 101);
        assert_eq!(variants[0].info, vec![InfoTag::HardClipContext]);
    }

    #[test]
    fn test_stops_when_md_exhausted() {
        let seq = b"ACGTACGTACNNNNN";
        let r = read(1, "10M5S", Some("10"), seq, &good(seq));
        assert!(extract(&r, None).unwrap().is_empty());
    }

    #[test]
    fn test_missing_md_yields_nothing() {
        let seq = b"ACGTACGTAC";
        let r = read(1, "10M", None, seq, &good(seq));
        assert!(extract(&r, None).unwrap().is_empty());
    }

    #[test]
    fn test_md_deletion_inside_match_is_fatal() {
        let seq = b"ACGTA";
        let r = read(1, "5M", Some("2^A3"), seq, &good(seq));
        let err = extract(&r, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("r1"));
        assert!(msg.contains("MD deletion inside CIGAR match"));
        assert!(msg.contains("2^A3"));
    }

    #[test]
    fn test_deletion_length_mismatch_is_fatal() {
        let seq = b"ACGTACGT";
        let r = read(1, "5M2D3M", Some("5^A3"), seq, &good(seq));
        assert!(matches!(
            extract(&r, None),
            Err(RoverError::MalformedAlignment { .. })
        ));
    }

    #[test]
    fn test_non_deletion_token_in_cigar_deletion_is_fatal() {
        let seq = b"ACGTACGTA";
        let r = read(1, "5M1D4M", Some("9"), seq, &good(seq));
        let err = extract(&r, None).unwrap_err();
        assert!(err.to_string().contains("non-deletion MD token"));
    }

    #[test]
    fn test_unexpected_operation_is_fatal() {
        let seq = b"ACGTACGT";
        let r = read(1, "3M2N5M", Some("8"), seq, &good(seq));
        let err = extract(&r, None).unwrap_err();
        assert!(err.to_string().contains("'N'"));
    }

    #[test]
    fn test_cigar_longer_than_read_is_fatal() {
        let seq = b"ACGTA";
        let r = read(1, "10M", Some("10"), seq, &good(seq));
        assert!(matches!(
            extract(&r, None),
            Err(RoverError::MalformedAlignment { .. })
        ));
    }

    #[test]
    fn test_short_qualities_still_processed() {
        let seq = b"ACGTACGTAC";
        let r = read(1, "10M", Some("8A1"), seq, b"IIII");
        let variants = extract(&r, Some(10)).unwrap();
        // Padded quality 0 is below any positive threshold
        assert!(variants[0].filters.contains(FilterTag::LowQuality));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let seq = b"ACGTAGGCGTACNN";
        let r = read(1, "2S3M2I3M1D4M", Some("2C2A0^T4"), seq, &good(seq));
        let first = extract(&r, Some(20)).unwrap();
        let second = extract(&r, Some(20)).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a, b);
            assert_eq!(a.to_string(), b.to_string());
            assert_eq!(a.filters, b.filters);
            assert_eq!(a.info, b.info);
        }
    }

    #[test]
    fn test_walk_consumes_every_stored_base() {
        let cases: [(&str, &str, &[u8]); 5] = [
            ("5M2I5M", "10", b"ACGTAGGCGTAC"),
            ("2S8M", "3A4", b"NNACGTACGT"),
            ("5H10M", "10", b"ACGTACGTAC"),
            ("5M3D5M", "5^ACG5", b"ACGTACGTAC"),
            ("2S3M2I3M1D4M", "2C2A0^T4", b"ACGTAGGCGTACNN"),
        ];

        for (cigar, md, seq) in cases {
            let r = read(1, cigar, Some(md), seq, &good(seq));
            assert_eq!(query_len(&r.cigar), r.len(), "{}", cigar);

            let mut walker = Walker::new(&r, parse_md(md), None);
            walker.walk().unwrap();
            assert_eq!(walker.seq_index, r.len(), "{} / {}", cigar, md);
            assert!(walker.cigar.is_empty(), "{} / {}", cigar, md);
        }
    }
}
