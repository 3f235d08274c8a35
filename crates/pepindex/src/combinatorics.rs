//! Enumerate every legal placement of variable modifications on a peptide

use std::ops::AddAssign;

use rayon::prelude::*;

use crate::fasta::Protein;
use crate::modification::{ModCoder, ModTable, Site};
use crate::peptide::Peptide;
use crate::Error;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModSummary {
    /// Peptides that were expanded
    pub peptides: usize,
    /// Variants emitted, unmodified ones included
    pub variants: usize,
    /// Modification branches cut because they pushed the mass over the limit
    pub rejected_mass: usize,
}

impl AddAssign for ModSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.peptides += rhs.peptides;
        self.variants += rhs.variants;
        self.rejected_mass += rhs.rejected_mass;
    }
}

/// Partial assignment, owned by one branch of the search
#[derive(Clone)]
struct State {
    mass: f64,
    codes: Vec<u32>,
    nterm: Option<u32>,
    cterm: Option<u32>,
    /// Applications so far, per variable mod
    counts: Vec<u32>,
}

impl State {
    fn total(&self) -> usize {
        self.codes.len() + self.nterm.is_some() as usize + self.cterm.is_some() as usize
    }
}

/// The residues of a peptide, and whether they sit at either end of the
/// protein they were cleaved from
#[derive(Copy, Clone, Debug)]
pub struct Target<'a> {
    pub residues: &'a [u8],
    pub protein_n_term: bool,
    pub protein_c_term: bool,
}

impl<'a> Target<'a> {
    /// A sequence touching neither end of its protein
    pub fn new(residues: &'a [u8]) -> Self {
        Target {
            residues,
            protein_n_term: false,
            protein_c_term: false,
        }
    }

    /// Protein ends are judged by the first location only
    pub fn locate(peptide: &Peptide, proteins: &'a [Protein]) -> Result<Self, Error> {
        let residues = peptide.residues(proteins)?;
        let (location, protein) = peptide
            .first_location()
            .and_then(|loc| Some((loc, proteins.get(loc.protein_id as usize)?)))
            .ok_or_else(|| Error::MalformedRecord("peptide has no locations".into()))?;
        Ok(Target {
            residues: residues.as_bytes(),
            protein_n_term: location.pos == 0,
            protein_c_term: location.pos as usize + residues.len() == protein.residues.len(),
        })
    }
}

struct Search<'a> {
    target: Target<'a>,
    out: Vec<State>,
    rejected_mass: usize,
}

pub struct Combinatorics<'t> {
    table: &'t ModTable,
    coder: ModCoder,
    /// For each residue byte, the (variable mod, delta index) pairs that can
    /// modify it
    possible: Vec<Vec<(usize, u32)>>,
    nterm: Vec<(usize, u32)>,
    cterm: Vec<(usize, u32)>,
    max_mass: f64,
    min_mods: usize,
    max_mods: usize,
}

impl<'t> Combinatorics<'t> {
    pub fn new(table: &'t ModTable, max_mass: f64) -> Self {
        let mut possible = vec![Vec::new(); 256];
        let mut nterm = Vec::new();
        let mut cterm = Vec::new();
        for (mod_index, m) in table.variable_mods.iter().enumerate() {
            debug_assert!(m.delta > 0.0, "variable mod deltas must be positive");
            let Some(delta_index) = table.delta_index(m.delta) else {
                continue;
            };
            match m.site {
                Site::Residue => {
                    for residue in m.residues.bytes() {
                        possible[residue as usize].push((mod_index, delta_index));
                    }
                }
                site if site.is_n_term() => nterm.push((mod_index, delta_index)),
                _ => cterm.push((mod_index, delta_index)),
            }
        }
        Combinatorics {
            table,
            coder: table.coder(),
            possible,
            nterm,
            cterm,
            max_mass,
            min_mods: 0,
            max_mods: usize::MAX,
        }
    }

    /// Only emit variants carrying at least `min` and at most `max` variable
    /// modifications, terminal ones included
    pub fn mod_count(mut self, min: usize, max: usize) -> Self {
        self.min_mods = min;
        self.max_mods = max;
        self
    }

    /// Every variant of `peptide`, whose sequence is `target`. When no
    /// minimum mod count is set, the unmodified peptide comes first.
    pub fn variants(&self, peptide: &Peptide, target: Target<'_>) -> (Vec<Peptide>, ModSummary) {
        let start = State {
            mass: peptide.mass,
            codes: Vec::new(),
            nterm: None,
            cterm: None,
            counts: vec![0; self.table.variable_mods.len()],
        };
        let mut search = Search {
            target,
            out: Vec::new(),
            rejected_mass: 0,
        };
        self.expand_nterm(&mut search, start);

        let summary = ModSummary {
            peptides: 1,
            variants: search.out.len(),
            rejected_mass: search.rejected_mass,
        };
        let variants = search
            .out
            .into_iter()
            .map(|state| Peptide {
                id: None,
                mass: state.mass,
                length: peptide.length,
                locations: peptide.locations.clone(),
                modifications: state.codes,
                nterm_mod: state.nterm,
                cterm_mod: state.cterm,
            })
            .collect();
        (variants, summary)
    }

    /// One more application of variable mod `mod_index` on top of `state`,
    /// if its count, the total count and the mass limit allow it
    fn place(&self, search: &mut Search, state: &State, mod_index: usize) -> Option<State> {
        let m = &self.table.variable_mods[mod_index];
        if state.counts[mod_index] >= m.max_count || state.total() >= self.max_mods {
            return None;
        }
        // Deltas are positive, so nothing below this branch can get lighter
        let mass = state.mass + m.delta;
        if mass > self.max_mass {
            search.rejected_mass += 1;
            return None;
        }
        let mut next = state.clone();
        next.mass = mass;
        next.counts[mod_index] += 1;
        Some(next)
    }

    fn terminal_allowed(&self, search: &Search, mod_index: usize, residue: u8) -> bool {
        let m = &self.table.variable_mods[mod_index];
        let protein_end = match m.site {
            Site::ProteinN => search.target.protein_n_term,
            Site::ProteinC => search.target.protein_c_term,
            _ => true,
        };
        protein_end && m.applies_to(residue)
    }

    fn expand_nterm(&self, search: &mut Search, state: State) {
        let Some(&first) = search.target.residues.first() else {
            return;
        };
        self.expand(search, 0, state.clone());

        for &(mod_index, delta_index) in &self.nterm {
            if !self.terminal_allowed(search, mod_index, first) {
                continue;
            }
            if let Some(mut next) = self.place(search, &state, mod_index) {
                next.nterm = Some(self.coder.encode(0, delta_index));
                self.expand(search, 0, next);
            }
        }
    }

    fn expand(&self, search: &mut Search, position: usize, state: State) {
        let Some(&residue) = search.target.residues.get(position) else {
            return self.expand_cterm(search, state);
        };
        let possible = &self.possible[residue as usize];
        if possible.is_empty() {
            return self.expand(search, position + 1, state);
        }

        // Leave this residue unmodified
        self.expand(search, position + 1, state.clone());

        for &(mod_index, delta_index) in possible {
            if let Some(mut next) = self.place(search, &state, mod_index) {
                next.codes
                    .push(self.coder.encode(position as u32, delta_index));
                self.expand(search, position + 1, next);
            }
        }
    }

    fn expand_cterm(&self, search: &mut Search, state: State) {
        let Some(&last) = search.target.residues.last() else {
            return;
        };
        let position = search.target.residues.len() as u32 - 1;
        self.emit(search, state.clone());

        for &(mod_index, delta_index) in &self.cterm {
            if !self.terminal_allowed(search, mod_index, last) {
                continue;
            }
            if let Some(mut next) = self.place(search, &state, mod_index) {
                next.cterm = Some(self.coder.encode(position, delta_index));
                self.emit(search, next);
            }
        }
    }

    fn emit(&self, search: &mut Search, state: State) {
        if state.total() >= self.min_mods {
            search.out.push(state);
        }
    }

    /// Expand every peptide in parallel. The output keeps the input order,
    /// with each peptide's variants grouped together.
    pub fn apply(
        &self,
        peptides: Vec<Peptide>,
        proteins: &[Protein],
    ) -> Result<(Vec<Peptide>, ModSummary), Error> {
        let per_peptide = peptides
            .par_iter()
            .map(|peptide| {
                let target = Target::locate(peptide, proteins)?;
                Ok(self.variants(peptide, target))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut summary = ModSummary::default();
        let mut variants = Vec::with_capacity(per_peptide.iter().map(|(v, _)| v.len()).sum());
        for (peptide_variants, peptide_summary) in per_peptide {
            variants.extend(peptide_variants);
            summary += peptide_summary;
        }
        Ok((variants, summary))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::peptide::Location;

    fn peptide(mass: f64, length: u32) -> Peptide {
        Peptide {
            id: None,
            mass,
            length,
            locations: vec![Location {
                protein_id: 0,
                pos: 0,
            }],
            modifications: Vec::new(),
            nterm_mod: None,
            cterm_mod: None,
        }
    }

    #[test]
    fn two_of_three_sites() {
        let table = ModTable::parse("2AC+79.9663").unwrap();
        let combinatorics = Combinatorics::new(&table, f64::MAX);
        let (variants, summary) = combinatorics.variants(&peptide(1000.0, 3), Target::new(b"ACA"));

        assert_eq!(variants.len(), 7);
        assert_eq!(summary.variants, 7);
        assert!(variants[0].modifications.is_empty());
        assert_eq!(variants[0].mass, 1000.0);
        assert!(variants.iter().all(|v| v.modifications.len() <= 2));

        let coder = table.coder();
        let mut positions = variants
            .iter()
            .map(|v| {
                v.modifications
                    .iter()
                    .map(|&code| coder.decode(code).0)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        positions.sort();
        assert_eq!(
            positions,
            vec![
                vec![],
                vec![0],
                vec![0, 1],
                vec![0, 2],
                vec![1],
                vec![1, 2],
                vec![2],
            ]
        );

        for v in &variants {
            let expected = 1000.0 + 79.9663 * v.modifications.len() as f64;
            assert!((v.mass - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn depth_first_order() {
        let table = ModTable::parse("1M+15.9949").unwrap();
        let combinatorics = Combinatorics::new(&table, f64::MAX);
        let (variants, _) = combinatorics.variants(&peptide(500.0, 4), Target::new(b"MAMK"));
        let codes = variants
            .iter()
            .map(|v| v.modifications.clone())
            .collect::<Vec<_>>();
        // One delta, so codes are the positions themselves
        assert_eq!(codes, vec![vec![], vec![2], vec![0]]);
    }

    #[test]
    fn overlapping_mods_enumerate_both() {
        let table = ModTable::parse("1ST+79.9663,1S+42.0106").unwrap();
        let combinatorics = Combinatorics::new(&table, f64::MAX);
        let (variants, _) = combinatorics.variants(&peptide(500.0, 1), Target::new(b"S"));
        assert_eq!(variants.len(), 3);

        let coder = table.coder();
        assert_eq!(coder.bits(), 1);
        assert_eq!(variants[1].modifications, vec![coder.encode(0, 1)]);
        assert_eq!(variants[2].modifications, vec![coder.encode(0, 0)]);
    }

    #[test]
    fn heavy_variants_dropped() {
        let table = ModTable::parse("3M+15.9949").unwrap();
        let combinatorics = Combinatorics::new(&table, 1020.0);
        let (variants, summary) = combinatorics.variants(&peptide(1000.0, 3), Target::new(b"MMM"));
        // Only zero or one oxidation fits under the limit
        assert_eq!(variants.len(), 4);
        assert!(variants.iter().all(|v| v.mass <= 1020.0));
        assert!(summary.rejected_mass > 0);
    }

    #[test]
    fn total_mod_limit() {
        let table = ModTable::parse("3STY+79.9663,3M+15.9949,3NQ+0.984016").unwrap();
        let residues = b"SMTNQSYMTQNSYMQSTNYSMQT";
        let capped = Combinatorics::new(&table, f64::MAX).mod_count(0, 2);
        let (variants, _) = capped.variants(&peptide(2500.0, 23), Target::new(residues));

        // Every residue takes exactly one mod: 1 + 23 + C(23, 2)
        assert_eq!(variants.len(), 1 + 23 + 253);
        assert!(variants.iter().all(|v| v.all_modifications().count() <= 2));
        assert!(variants[0].modifications.is_empty());
    }

    #[test]
    fn minimum_mod_count() {
        let table = ModTable::parse("2AC+79.9663").unwrap();
        let at_least_one = Combinatorics::new(&table, f64::MAX).mod_count(1, usize::MAX);
        let (variants, summary) = at_least_one.variants(&peptide(1000.0, 3), Target::new(b"ACA"));
        assert_eq!(variants.len(), 6);
        assert_eq!(summary.variants, 6);
        assert!(variants.iter().all(|v| !v.modifications.is_empty()));

        let exactly_two = Combinatorics::new(&table, f64::MAX).mod_count(2, 2);
        let (variants, _) = exactly_two.variants(&peptide(1000.0, 3), Target::new(b"ACA"));
        assert_eq!(variants.len(), 3);
        assert!(variants.iter().all(|v| v.modifications.len() == 2));
    }

    #[test]
    fn peptide_terminal_mods() {
        let table = ModTable::parse("1M+15.9949,1^+42.0106,1]K+0.984016").unwrap();
        let coder = table.coder();
        let combinatorics = Combinatorics::new(&table, f64::MAX);

        let (variants, _) = combinatorics.variants(&peptide(400.0, 3), Target::new(b"MAK"));
        let placed = variants
            .iter()
            .map(|v| (v.nterm_mod, v.modifications.clone(), v.cterm_mod))
            .collect::<Vec<_>>();
        let acetyl = Some(coder.encode(0, 2));
        let oxidation = vec![coder.encode(0, 1)];
        assert_eq!(
            placed,
            vec![
                (None, vec![], None),
                (None, oxidation.clone(), None),
                (acetyl, vec![], None),
                (acetyl, oxidation, None),
            ]
        );
        assert!((variants[3].mass - (400.0 + 42.0106 + 15.9949)).abs() < 1e-9);

        // Protein C-terminal mods need the peptide to end its protein
        let at_end = Target {
            protein_c_term: true,
            ..Target::new(b"MAK")
        };
        let (variants, _) = combinatorics.variants(&peptide(400.0, 3), at_end);
        assert_eq!(variants.len(), 8);
        assert_eq!(variants[1].cterm_mod, Some(coder.encode(2, 0)));
        assert!(variants[0].cterm_mod.is_none());

        // The C-terminal residue must match
        let (variants, _) = combinatorics.variants(
            &peptide(400.0, 3),
            Target {
                protein_c_term: true,
                ..Target::new(b"MAR")
            },
        );
        assert!(variants.iter().all(|v| v.cterm_mod.is_none()));
    }

    #[test]
    fn protein_terminal_mods() {
        let table = ModTable::parse("1[+42.0106").unwrap();
        let combinatorics = Combinatorics::new(&table, f64::MAX);
        let (internal, _) = combinatorics.variants(&peptide(400.0, 3), Target::new(b"AAK"));
        assert_eq!(internal.len(), 1);

        let start = Target {
            protein_n_term: true,
            ..Target::new(b"AAK")
        };
        let (variants, _) = combinatorics.variants(&peptide(400.0, 3), start);
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[1].nterm_mod, Some(0));
    }

    #[test]
    fn terminal_mods_count_toward_limit() {
        let table = ModTable::parse("1M+15.9949,1^+42.0106").unwrap();
        let combinatorics = Combinatorics::new(&table, f64::MAX).mod_count(0, 1);
        let (variants, _) = combinatorics.variants(&peptide(400.0, 3), Target::new(b"MAK"));
        assert_eq!(variants.len(), 3);
        assert!(variants.iter().all(|v| v.all_modifications().count() <= 1));
    }

    #[test]
    fn locate_protein_ends() {
        let proteins = vec![Protein {
            id: 0,
            name: "P0".into(),
            residues: "MKAAK".into(),
        }];
        let first = peptide(300.0, 2);
        let target = Target::locate(&first, &proteins).unwrap();
        assert_eq!(target.residues, b"MK");
        assert!(target.protein_n_term && !target.protein_c_term);

        let mut last = peptide(400.0, 3);
        last.locations[0].pos = 2;
        let target = Target::locate(&last, &proteins).unwrap();
        assert_eq!(target.residues, b"AAK");
        assert!(!target.protein_n_term && target.protein_c_term);
    }

    #[test]
    fn apply_preserves_order() {
        let proteins = vec![Protein {
            id: 0,
            name: "P0".into(),
            residues: "MKAAK".into(),
        }];
        let table = ModTable::parse("1M+15.9949").unwrap();
        let combinatorics = Combinatorics::new(&table, f64::MAX);

        let first = peptide(300.0, 2);
        let mut second = peptide(400.0, 3);
        second.locations[0].pos = 2;

        let (variants, summary) = combinatorics
            .apply(vec![first, second], &proteins)
            .unwrap();
        assert_eq!(summary.peptides, 2);
        assert_eq!(summary.variants, 3);
        assert_eq!(variants[0].mass, 300.0);
        assert!((variants[1].mass - 315.9949).abs() < 1e-9);
        assert_eq!(variants[2].mass, 400.0);
    }
}
