use regex::Regex;
use std::ops::{AddAssign, Range};

use crate::fasta::Protein;
use crate::mass::{ResidueMasses, VALID_AA};
use crate::Error;

#[derive(Clone, Debug, PartialEq)]
/// One cleavage interval of one protein
pub struct Digest {
    /// Neutral mass, including water and static modifications
    pub mass: f64,
    /// Cleaved peptide sequence
    pub sequence: String,
    /// Id of the protein it was cleaved from
    pub protein: u32,
    /// Offset of the first residue within the protein
    pub start: u32,
    pub length: u32,
}

/// Counts of what digestion kept and what the filters threw away
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DigestSummary {
    pub peptides: usize,
    pub rejected_length: usize,
    pub rejected_mass: usize,
}

impl AddAssign for DigestSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.peptides += rhs.peptides;
        self.rejected_length += rhs.rejected_length;
        self.rejected_mass += rhs.rejected_mass;
    }
}

pub struct EnzymeParameters {
    /// Number of missed cleavages to produce
    pub missed_cleavages: u8,
    /// Inclusive
    pub min_len: usize,
    /// Inclusive
    pub max_len: usize,
    /// Inclusive
    pub min_mass: f64,
    /// Inclusive
    pub max_mass: f64,
    /// `None` performs a non-specific digest
    pub enzyme: Option<Enzyme>,
}

#[derive(Clone, Debug)]
pub struct Enzyme {
    // Skip cleaving if the site is followed matching this AA
    pub skip_suffix: Option<char>,
    // Regex for matching cleavage sites
    regex: Regex,
    // Cleave at c-terminal?
    pub c_terminal: bool,
}

impl Enzyme {
    pub fn new(cleave: &str, skip_suffix: Option<char>, c_terminal: bool) -> Result<Option<Self>, Error> {
        if !(cleave.bytes().all(|x| VALID_AA.contains(&x)) || cleave == "$") {
            return Err(Error::InvalidParameters(format!(
                "enzyme cleavage sequence contains non-amino acid characters: {}",
                cleave
            )));
        }
        if let Some(skip) = skip_suffix {
            if !(skip.is_ascii() && VALID_AA.contains(&(skip as u8))) {
                return Err(Error::InvalidParameters(format!(
                    "enzyme cleavage restriction is non-amino acid character: {}",
                    skip
                )));
            }
        }

        // At this point, cleave can be three things: empty, "$", or a string of valid AA's
        let (pattern, skip_suffix, c_terminal) = match cleave {
            "" => return Ok(None),
            // Never cleave inside the protein
            "$" => ("$".to_string(), None, true),
            _ => (format!("[{}]", cleave), skip_suffix, c_terminal),
        };
        let regex = Regex::new(&pattern)
            .map_err(|err| Error::InvalidParameters(format!("bad cleavage pattern: {}", err)))?;
        Ok(Some(Enzyme {
            regex,
            skip_suffix,
            c_terminal,
        }))
    }

    /// Look up a well-known enzyme. `none` selects a non-specific digest.
    pub fn named(name: &str) -> Result<Option<Self>, Error> {
        let (cleave, restrict, c_terminal) = match name.to_ascii_lowercase().as_str() {
            "trypsin" => ("KR", Some('P'), true),
            "trypsin/p" => ("KR", None, true),
            "chymotrypsin" => ("FWY", Some('P'), true),
            "modified-chymotrypsin" => ("FWYL", Some('P'), true),
            "elastase" => ("ALIV", Some('P'), true),
            "elastase-trypsin-chymotrypsin" => ("ALIVKRWFY", Some('P'), true),
            "clostripain" => ("R", None, true),
            "cyanogen-bromide" => ("M", None, true),
            "iodosobenzoate" => ("W", None, true),
            "proline-endopeptidase" => ("P", None, true),
            "staph-protease" => ("E", None, true),
            "asp-n" => ("D", None, false),
            "none" => ("", None, true),
            _ => {
                return Err(Error::InvalidParameters(format!(
                    "unknown enzyme `{}`",
                    name
                )))
            }
        };
        Enzyme::new(cleave, restrict, c_terminal)
    }

    /// Adjacent, non-empty intervals covering the whole sequence
    fn cleavage_sites(&self, sequence: &str) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut left = 0;
        for mat in self.regex.find_iter(sequence) {
            let right = match self.c_terminal {
                true => mat.end(),
                false => mat.start(),
            };
            if let Some(skip) = self.skip_suffix {
                if right < sequence.len() && sequence[right..].starts_with(skip) {
                    continue;
                }
            }
            if right == left {
                continue;
            }
            ranges.push(left..right);
            left = right;
        }
        if left < sequence.len() {
            ranges.push(left..sequence.len());
        }
        ranges
    }
}

impl EnzymeParameters {
    fn cleavage_sites(&self, sequence: &str) -> Vec<Range<usize>> {
        match &self.enzyme {
            Some(enzyme) => enzyme.cleavage_sites(sequence),
            None => {
                // Perform a non-specific digest
                let mut v = Vec::new();
                for len in self.min_len.max(1)..=self.max_len.min(sequence.len()) {
                    for i in 0..=sequence.len() - len {
                        v.push(i..i + len)
                    }
                }
                v
            }
        }
    }

    /// Cleave one protein, keeping the intervals whose length and mass fall
    /// inside the inclusive bounds. Every occurrence is kept, even when a
    /// sequence repeats within the protein.
    pub fn digest(&self, protein: &Protein, masses: &ResidueMasses) -> (Vec<Digest>, DigestSummary) {
        let sequence = protein.residues.as_str();
        let prefix = masses.prefix_sums(sequence.as_bytes());
        let sites = self.cleavage_sites(sequence);
        // Missed cleavages make no sense for a non-specific digest
        let missed_cleavages = match self.enzyme {
            None => 0,
            _ => self.missed_cleavages,
        };

        let mut digests = Vec::new();
        let mut summary = DigestSummary::default();

        for cleavage in 1..=(1 + missed_cleavages as usize) {
            // Generate missed cleavages
            for win in sites.windows(cleavage) {
                let start = win[0].start;
                let end = win[cleavage - 1].end;
                let len = end - start;

                if len < self.min_len || len > self.max_len {
                    summary.rejected_length += 1;
                    continue;
                }

                let mass = prefix[end] - prefix[start] + masses.water();
                if mass < self.min_mass || mass > self.max_mass {
                    summary.rejected_mass += 1;
                    continue;
                }

                digests.push(Digest {
                    mass,
                    sequence: sequence[start..end].to_string(),
                    protein: protein.id,
                    start: start as u32,
                    length: len as u32,
                });
            }
        }
        summary.peptides = digests.len();
        (digests, summary)
    }
}
