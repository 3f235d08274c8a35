use std::fmt::Write;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enzyme::Digest;
use crate::fasta::Protein;
use crate::modification::ModTable;
use crate::Error;

/// An occurrence of a peptide: offset `pos` within protein `protein_id`
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub protein_id: u32,
    pub pos: u32,
}

/// A distinct peptide sequence, possibly carrying variable modifications.
///
/// The sequence itself is not stored: it is the `length` residues starting
/// at any of the `locations`.
#[derive(Clone, Debug, PartialEq)]
pub struct Peptide {
    /// Assigned once peptides are sorted by mass
    pub id: Option<u32>,
    /// Neutral mass, including water, static and variable modifications
    pub mass: f64,
    pub length: u32,
    /// Never empty, in discovery order
    pub locations: Vec<Location>,
    /// Encoded (position, delta) pairs, see [`crate::modification::ModCoder`]
    pub modifications: Vec<u32>,
    /// Encoded N-terminal modification, at position 0
    pub nterm_mod: Option<u32>,
    /// Encoded C-terminal modification, at the last position
    pub cterm_mod: Option<u32>,
}

/// A peptide as stored in the peptide file. Locations after the first live
/// in the auxiliary location file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PeptideRecord {
    pub id: Option<u32>,
    pub mass: f64,
    pub length: u32,
    pub first_location: Location,
    /// Dense index into the auxiliary location file
    pub aux_locations_index: Option<u32>,
    pub modifications: Vec<u32>,
    pub nterm_mod: Option<u32>,
    pub cterm_mod: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AuxLocation {
    pub locations: Vec<Location>,
}

impl Peptide {
    pub fn first_location(&self) -> Option<Location> {
        self.locations.first().copied()
    }

    /// Every variable modification, terminal ones included
    pub fn all_modifications(&self) -> impl Iterator<Item = u32> + '_ {
        self.nterm_mod
            .into_iter()
            .chain(self.modifications.iter().copied())
            .chain(self.cterm_mod)
    }

    /// The residues of this peptide, looked up in `proteins`, which must be
    /// indexed by protein id
    pub fn residues<'p>(&self, proteins: &'p [Protein]) -> Result<&'p str, Error> {
        let location = self
            .first_location()
            .ok_or_else(|| Error::MalformedRecord("peptide has no locations".into()))?;
        let protein = proteins.get(location.protein_id as usize).ok_or_else(|| {
            Error::MalformedRecord(format!(
                "peptide references protein {}, but there are only {} proteins",
                location.protein_id,
                proteins.len()
            ))
        })?;
        if protein.id != location.protein_id {
            return Err(Error::ProteinIdMismatch {
                expected: location.protein_id,
                found: protein.id,
            });
        }
        let start = location.pos as usize;
        protein
            .residues
            .get(start..start + self.length as usize)
            .ok_or_else(|| {
                Error::MalformedRecord(format!(
                    "peptide at {}..{} runs past the end of protein {}",
                    start,
                    start + self.length as usize,
                    protein.name
                ))
            })
    }

    /// Render the sequence with modified residues annotated, e.g.
    /// `[+42.0106]-PEPC[+57.02146]M[+15.9949]K`
    pub fn annotate(&self, proteins: &[Protein], table: &ModTable) -> Result<String, Error> {
        let residues = self.residues(proteins)?;
        let mut deltas = vec![0.0; residues.len()];
        for m in &table.static_mods {
            for (delta, residue) in deltas.iter_mut().zip(residues.chars()) {
                if residue == m.residue {
                    *delta += m.delta;
                }
            }
        }

        let coder = table.coder();
        let decode = |code: u32| {
            table.decode(coder, code).ok_or_else(|| {
                Error::MalformedRecord(format!("modification {} has no matching delta", code))
            })
        };
        for &code in &self.modifications {
            let (position, delta) = decode(code)?;
            let slot = deltas.get_mut(position as usize).ok_or_else(|| {
                Error::MalformedRecord(format!(
                    "modification at position {} lies outside a peptide of length {}",
                    position, self.length
                ))
            })?;
            *slot += delta;
        }

        // Writing into a String cannot fail
        let mut annotated = String::with_capacity(residues.len() * 2);
        if let Some(code) = self.nterm_mod {
            let _ = write!(annotated, "[+{}]-", decode(code)?.1);
        }
        for (residue, delta) in residues.chars().zip(deltas) {
            annotated.push(residue);
            if delta != 0.0 {
                let _ = write!(annotated, "[+{}]", delta);
            }
        }
        if let Some(code) = self.cterm_mod {
            let _ = write!(annotated, "-[+{}]", decode(code)?.1);
        }
        Ok(annotated)
    }

    /// Split into the on-disk record and, for peptides found in more than one
    /// place, the auxiliary locations. `next_aux` is the index the auxiliary
    /// record will be written at.
    pub fn into_record(self, next_aux: u32) -> Result<(PeptideRecord, Option<AuxLocation>), Error> {
        let mut locations = self.locations.into_iter();
        let first_location = locations
            .next()
            .ok_or_else(|| Error::MalformedRecord("peptide has no locations".into()))?;
        let rest = locations.collect::<Vec<_>>();
        let (aux_locations_index, aux) = match rest.is_empty() {
            true => (None, None),
            false => (Some(next_aux), Some(AuxLocation { locations: rest })),
        };
        let record = PeptideRecord {
            id: self.id,
            mass: self.mass,
            length: self.length,
            first_location,
            aux_locations_index,
            modifications: self.modifications,
            nterm_mod: self.nterm_mod,
            cterm_mod: self.cterm_mod,
        };
        Ok((record, aux))
    }

    pub fn from_record(record: PeptideRecord, aux: Option<AuxLocation>) -> Peptide {
        let mut locations = vec![record.first_location];
        if let Some(aux) = aux {
            locations.extend(aux.locations);
        }
        Peptide {
            id: record.id,
            mass: record.mass,
            length: record.length,
            locations,
            modifications: record.modifications,
            nterm_mod: record.nterm_mod,
            cterm_mod: record.cterm_mod,
        }
    }
}

impl From<&Digest> for Peptide {
    fn from(digest: &Digest) -> Self {
        Peptide {
            id: None,
            mass: digest.mass,
            length: digest.length,
            locations: vec![Location {
                protein_id: digest.protein,
                pos: digest.start,
            }],
            modifications: Vec::new(),
            nterm_mod: None,
            cterm_mod: None,
        }
    }
}

/// Collapse digests with identical sequences into one peptide per sequence.
///
/// The result is ordered by sequence; each peptide lists its locations in
/// the order the digests were given.
pub fn merge(mut digests: Vec<Digest>) -> Vec<Peptide> {
    // Stable, so equal sequences keep their discovery order
    digests.par_sort_by(|a, b| a.sequence.cmp(&b.sequence));

    let mut peptides: Vec<Peptide> = Vec::new();
    let mut current = String::new();
    for digest in digests {
        match peptides.last_mut() {
            Some(peptide) if current == digest.sequence => peptide.locations.push(Location {
                protein_id: digest.protein,
                pos: digest.start,
            }),
            _ => {
                peptides.push(Peptide::from(&digest));
                current = digest.sequence;
            }
        }
    }
    peptides
}
