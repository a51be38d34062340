//! Known-variant identifier lookup
//!
//! PASS variants can be annotated with the ID of a matching record in a
//! bgzipped, indexed VCF (dbSNP or similar). A record matches when its
//! position and REF agree and the variant's ALT is one of its ALTs.

use anyhow::{Context, Result};
use log::debug;
use rust_htslib::bcf::{self, Read as BcfRead};

use crate::coords::to_zero_based;

/// Anything that can resolve a called allele to a known identifier
pub trait VariantIdLookup {
    /// ID of the record at `pos` (1-based) with the given alleles, if any
    fn lookup(&mut self, chrom: &str, pos: i64, ref_allele: &str, alt_allele: &str)
        -> Result<Option<String>>;
}

/// Lookup against an indexed VCF/BCF through rust-htslib
pub struct IndexedVcfLookup {
    reader: bcf::IndexedReader,
    path: String,
}

impl IndexedVcfLookup {
    pub fn from_path(path: &str) -> Result<Self> {
        let reader = bcf::IndexedReader::from_path(path)
            .with_context(|| format!("Failed to open indexed VCF {}", path))?;
        Ok(Self {
            reader,
            path: path.to_string(),
        })
    }
}

impl VariantIdLookup for IndexedVcfLookup {
    fn lookup(
        &mut self,
        chrom: &str,
        pos: i64,
        ref_allele: &str,
        alt_allele: &str,
    ) -> Result<Option<String>> {
        let rid = match self.reader.header().name2rid(chrom.as_bytes()) {
            Ok(rid) => rid,
            Err(_) => {
                debug!("chromosome {} not present in {}", chrom, self.path);
                return Ok(None);
            }
        };

        let start = to_zero_based(pos).max(0) as u64;
        let span = ref_allele.len().max(alt_allele.len()) as u64;
        self.reader
            .fetch(rid, start, Some(start + span))
            .with_context(|| format!("Failed to fetch {}:{} from {}", chrom, pos, self.path))?;

        let mut record = self.reader.empty_record();
        while let Some(result) = self.reader.read(&mut record) {
            result.with_context(|| format!("Failed to read record from {}", self.path))?;

            if record.pos() != start as i64 {
                continue;
            }
            let alleles = record.alleles();
            let Some((record_ref, record_alts)) = alleles.split_first() else {
                continue;
            };
            if *record_ref == ref_allele.as_bytes()
                && record_alts.iter().any(|alt| *alt == alt_allele.as_bytes())
            {
                return Ok(Some(String::from_utf8_lossy(&record.id()).into_owned()));
            }
        }

        Ok(None)
    }
}
