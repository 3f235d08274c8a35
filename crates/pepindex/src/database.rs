use crate::combinatorics::{Combinatorics, ModSummary};
use crate::enzyme::{DigestSummary, Enzyme, EnzymeParameters};
use crate::fasta::{Fasta, Protein};
use crate::finalize::finalize;
use crate::header::PeptidesHeader;
use crate::mass::{MassType, ResidueMasses};
use crate::modification::ModTable;
use crate::peptide::{merge, Peptide};
use crate::store::{read_proteins, write_proteins, PeptideReader, PeptideWriter};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const PROTEINS_FILE: &str = "protix";
pub const PEPTIDES_FILE: &str = "pepix";
pub const AUX_LOCATIONS_FILE: &str = "auxlocs";

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EnzymeBuilder {
    /// A well-known enzyme, e.g. `trypsin` or `asp-n`. Takes precedence
    /// over `cleave_at`, `restrict` and `c_terminal`.
    pub name: Option<String>,
    /// How many missed cleavages to use
    pub missed_cleavages: Option<u8>,
    /// Minimum peptide length
    pub min_len: Option<usize>,
    /// Maximum peptide length
    pub max_len: Option<usize>,
    pub cleave_at: Option<String>,
    pub restrict: Option<char>,
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeBuilder {
    fn default() -> Self {
        Self {
            name: None,
            missed_cleavages: Some(0),
            min_len: Some(6),
            max_len: Some(50),
            cleave_at: Some("KR".into()),
            restrict: Some('P'),
            c_terminal: Some(true),
        }
    }
}

impl EnzymeBuilder {
    fn make_enzyme(&self) -> Result<Option<Enzyme>, Error> {
        match &self.name {
            Some(name) => Enzyme::named(name),
            None => Enzyme::new(
                self.cleave_at.as_deref().unwrap_or("KR"),
                self.restrict,
                self.c_terminal.unwrap_or(true),
            ),
        }
    }

    /// Human-readable description, stored in the peptide file header
    pub fn description(&self) -> String {
        match &self.name {
            Some(name) => name.to_ascii_lowercase(),
            None => {
                let cleave_at = self.cleave_at.as_deref().unwrap_or("KR");
                let terminus = match self.c_terminal.unwrap_or(true) {
                    true => "after",
                    false => "before",
                };
                match (cleave_at, self.restrict) {
                    ("", _) => "none".into(),
                    (cleave_at, Some(restrict)) => {
                        format!("cleave {} [{}], not before {}", terminus, cleave_at, restrict)
                    }
                    (cleave_at, None) => format!("cleave {} [{}]", terminus, cleave_at),
                }
            }
        }
    }
}

#[derive(Deserialize, Default)]
/// Parameters used for building the peptide index
pub struct Builder {
    pub enzyme: Option<EnzymeBuilder>,
    /// Minimum peptide mass that will be stored in the index
    pub peptide_min_mass: Option<f64>,
    /// Maximum peptide mass, modifications included
    pub peptide_max_mass: Option<f64>,
    /// Monoisotopic or average residue masses
    pub mass_type: Option<MassType>,
    /// Modification specification, e.g. `C+57.02146,2M+15.9949`
    pub mods: Option<String>,
    /// Refuse variable modifications that target a common residue
    pub reject_overlapping_mods: Option<bool>,
    /// Most variable modifications on one peptide, at least 1
    pub max_variable_mods: Option<usize>,
    /// Fewest variable modifications on one peptide. Above zero, unmodified
    /// peptides are left out of the index.
    pub min_variable_mods: Option<usize>,
    /// Path to fasta database
    pub fasta: Option<String>,
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let enzyme = self.enzyme.unwrap_or_default();
        let min_len = enzyme.min_len.unwrap_or(6);
        let max_len = enzyme.max_len.unwrap_or(50);
        if min_len > max_len {
            return Err(Error::InvalidParameters(format!(
                "minimum peptide length {} exceeds maximum {}",
                min_len, max_len
            )));
        }
        if enzyme.make_enzyme()?.is_none() && enzyme.missed_cleavages.unwrap_or(0) > 0 {
            log::warn!("missed cleavages are ignored for a non-specific digest");
        }

        let peptide_min_mass = self.peptide_min_mass.unwrap_or(200.0);
        let peptide_max_mass = self.peptide_max_mass.unwrap_or(7200.0);
        if peptide_min_mass > peptide_max_mass {
            return Err(Error::InvalidParameters(format!(
                "minimum peptide mass {} exceeds maximum {}",
                peptide_min_mass, peptide_max_mass
            )));
        }

        let mods = ModTable::parse_with(
            self.mods.as_deref().unwrap_or(""),
            self.reject_overlapping_mods.unwrap_or(false),
        )?;

        let max_variable_mods = self.max_variable_mods.map(|x| x.max(1)).unwrap_or(2);
        let min_variable_mods = self.min_variable_mods.unwrap_or(0);
        if min_variable_mods > max_variable_mods {
            return Err(Error::InvalidParameters(format!(
                "minimum variable modifications {} exceeds maximum {}",
                min_variable_mods, max_variable_mods
            )));
        }

        let fasta = self
            .fasta
            .ok_or_else(|| Error::InvalidParameters("a fasta file must be provided".into()))?;

        Ok(Parameters {
            enzyme,
            peptide_min_mass,
            peptide_max_mass,
            mass_type: self.mass_type.unwrap_or_default(),
            mods,
            max_variable_mods,
            min_variable_mods,
            fasta,
        })
    }

    pub fn update_fasta(&mut self, fasta: String) {
        self.fasta = Some(fasta)
    }

    pub fn update_mods(&mut self, mods: String) {
        self.mods = Some(mods)
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters {
    pub enzyme: EnzymeBuilder,
    pub peptide_min_mass: f64,
    pub peptide_max_mass: f64,
    pub mass_type: MassType,
    pub mods: ModTable,
    pub max_variable_mods: usize,
    pub min_variable_mods: usize,
    pub fasta: String,
}

/// Where the files of a peptide index live
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexPaths {
    pub proteins: PathBuf,
    pub peptides: PathBuf,
    pub aux_locations: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        let directory = directory.as_ref();
        IndexPaths {
            proteins: directory.join(PROTEINS_FILE),
            peptides: directory.join(PEPTIDES_FILE),
            aux_locations: directory.join(AUX_LOCATIONS_FILE),
        }
    }

    pub fn read_proteins(&self) -> Result<Vec<Protein>, Error> {
        let file = File::open(&self.proteins)?;
        let (_, proteins) = read_proteins(BufReader::new(file))?;
        Ok(proteins)
    }

    pub fn open_peptides(&self) -> Result<PeptideReader<BufReader<File>, BufReader<File>>, Error> {
        let peptides = BufReader::new(File::open(&self.peptides)?);
        let aux = BufReader::new(File::open(&self.aux_locations)?);
        PeptideReader::open(peptides, aux)
    }
}

#[derive(Clone, Debug)]
pub struct IndexSummary {
    pub proteins: usize,
    /// Distinct peptide sequences
    pub peptides: usize,
    /// Records in the final index, modified variants included
    pub records: usize,
    pub digest: DigestSummary,
    pub mods: ModSummary,
    pub paths: IndexPaths,
}

impl Parameters {
    pub fn enzyme_parameters(&self) -> Result<EnzymeParameters, Error> {
        Ok(EnzymeParameters {
            missed_cleavages: self.enzyme.missed_cleavages.unwrap_or(0),
            min_len: self.enzyme.min_len.unwrap_or(6),
            max_len: self.enzyme.max_len.unwrap_or(50),
            min_mass: self.peptide_min_mass,
            max_mass: self.peptide_max_mass,
            enzyme: self.enzyme.make_enzyme()?,
        })
    }

    pub fn residue_masses(&self) -> ResidueMasses {
        ResidueMasses::new(self.mass_type, &self.mods.static_mods)
    }

    /// Digest every protein and merge identical sequences
    pub fn digest(&self, fasta: &Fasta) -> Result<(Vec<Peptide>, DigestSummary), Error> {
        log::trace!("digesting fasta");
        let enzyme = self.enzyme_parameters()?;
        let (digests, summary) = fasta.digest(&enzyme, &self.residue_masses());

        log::trace!("merging {} digests", digests.len());
        Ok((merge(digests), summary))
    }

    /// Expand peptides into every variable modification variant
    pub fn modify(
        &self,
        peptides: Vec<Peptide>,
        proteins: &[Protein],
    ) -> Result<(Vec<Peptide>, ModSummary), Error> {
        if !self.mods.has_variable_mods() && self.min_variable_mods == 0 {
            let summary = ModSummary {
                peptides: peptides.len(),
                variants: peptides.len(),
                rejected_mass: 0,
            };
            return Ok((peptides, summary));
        }
        log::trace!("modifying peptides");
        Combinatorics::new(&self.mods, self.peptide_max_mass)
            .mod_count(self.min_variable_mods, self.max_variable_mods)
            .apply(peptides, proteins)
    }

    pub fn peptides_header(&self, sorted: bool) -> PeptidesHeader {
        PeptidesHeader {
            source: PROTEINS_FILE.into(),
            enzyme: self.enzyme.description(),
            missed_cleavages: self.enzyme.missed_cleavages.unwrap_or(0),
            min_mass: self.peptide_min_mass,
            max_mass: self.peptide_max_mass,
            min_length: self.enzyme.min_len.unwrap_or(6) as u32,
            max_length: self.enzyme.max_len.unwrap_or(50) as u32,
            mass_type: self.mass_type,
            has_peaks: false,
            mods: self.mods.clone(),
            min_variable_mods: self.min_variable_mods,
            max_variable_mods: self.max_variable_mods,
            sorted,
        }
    }

    /// Build a complete peptide index for `fasta` inside `directory`
    pub fn build<P: AsRef<Path>>(&self, fasta: &Fasta, directory: P) -> Result<IndexSummary, Error> {
        let start = Instant::now();
        std::fs::create_dir_all(directory.as_ref())?;
        let paths = IndexPaths::new(directory);

        log::trace!("writing {}", paths.proteins.display());
        let file = BufWriter::new(File::create(&paths.proteins)?);
        write_proteins(file, &self.fasta, &fasta.targets)?;

        let (peptides, digest) = self.digest(fasta)?;
        let distinct = peptides.len();
        log::info!(
            "digested {} proteins into {} peptides ({} distinct)",
            fasta.targets.len(),
            digest.peptides,
            distinct
        );
        log::info!(
            "- rejected {} by length, {} by mass",
            digest.rejected_length,
            digest.rejected_mass
        );

        let (peptides, mods) = self.modify(peptides, &fasta.targets)?;
        if self.mods.has_variable_mods() {
            log::info!(
                "generated {} modified variants, pruned {} heavier than {} Da",
                mods.variants - mods.peptides,
                mods.rejected_mass,
                self.peptide_max_mass
            );
        }

        log::trace!("sorting {} peptides by mass", peptides.len());
        let peptides = finalize(peptides);

        log::trace!("writing {}", paths.peptides.display());
        let mut writer = PeptideWriter::new(
            BufWriter::new(File::create(&paths.peptides)?),
            BufWriter::new(File::create(&paths.aux_locations)?),
            self.peptides_header(true),
            PEPTIDES_FILE,
        )?;
        for peptide in peptides {
            writer.write(peptide)?;
        }
        let records = writer.written();
        writer.finish()?;

        log::info!(
            "wrote {} peptides to {} in {}ms",
            records,
            paths.peptides.display(),
            start.elapsed().as_millis()
        );

        Ok(IndexSummary {
            proteins: fasta.targets.len(),
            peptides: distinct,
            records,
            digest,
            mods,
            paths,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FASTA: &str = r#"
        >sp|AAAAA
        MEWKLEQSMREQALLKAQLTQLK
        >sp|BBBBB
        RMEWKLEQSMREQALLKAQLTQLK
        "#;

    fn parameters(mods: &str) -> Parameters {
        limited(mods, None, None)
    }

    fn limited(mods: &str, min: Option<usize>, max: Option<usize>) -> Parameters {
        Builder {
            enzyme: Some(EnzymeBuilder {
                missed_cleavages: Some(1),
                min_len: Some(6),
                max_len: Some(10),
                ..Default::default()
            }),
            peptide_min_mass: Some(150.0),
            peptide_max_mass: Some(5000.0),
            mods: Some(mods.into()),
            min_variable_mods: min,
            max_variable_mods: max,
            fasta: Some("none".into()),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    #[test]
    fn digestion() {
        let fasta = Fasta::parse(FASTA);
        let params = parameters("");
        let (peptides, summary) = params.digest(&fasta).unwrap();
        let peptides = finalize(peptides);

        let expected = ["EQALLK", "LEQSMR", "AQLTQLK", "MEWKLEQSMR"];
        let sequences = peptides
            .iter()
            .map(|p| p.residues(&fasta.targets).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(sequences, expected);
        assert_eq!(summary.peptides, 8);

        // Every peptide is shared by both proteins
        for peptide in &peptides {
            assert_eq!(peptide.locations.len(), 2);
            assert_eq!(peptide.locations[0].protein_id, 0);
            assert_eq!(peptide.locations[1].protein_id, 1);
        }
    }

    #[test]
    fn modified_variants() {
        let fasta = Fasta::parse(FASTA);
        let params = parameters("1M+15.9949");
        let (peptides, _) = params.digest(&fasta).unwrap();
        let (peptides, summary) = params.modify(peptides, &fasta.targets).unwrap();
        assert_eq!(summary.peptides, 4);
        // LEQSMR and MEWKLEQSMR each gain an oxidized variant, and
        // MEWKLEQSMR has two methionines
        assert_eq!(summary.variants, 4 + 1 + 2);

        let annotated = finalize(peptides)
            .iter()
            .map(|p| p.annotate(&fasta.targets, &params.mods).unwrap())
            .collect::<Vec<_>>();
        assert!(annotated.contains(&"LEQSM[+15.9949]R".to_string()));
        assert!(annotated.contains(&"M[+15.9949]EWKLEQSMR".to_string()));
    }

    #[test]
    fn variable_mod_limits() {
        let fasta = Fasta::parse(FASTA);
        let count = |params: Parameters| {
            let (peptides, _) = params.digest(&fasta).unwrap();
            let (peptides, summary) = params.modify(peptides, &fasta.targets).unwrap();
            assert_eq!(summary.variants, peptides.len());
            peptides
        };

        // The default of two lets MEWKLEQSMR carry both oxidations
        assert_eq!(count(parameters("2M+15.9949")).len(), 4 + 1 + 3);

        let at_most_one = count(limited("2M+15.9949", None, Some(1)));
        assert_eq!(at_most_one.len(), 4 + 1 + 2);
        assert!(at_most_one.iter().all(|p| p.modifications.len() <= 1));

        // Unmodified peptides are dropped, even without variable mods
        let at_least_one = count(limited("2M+15.9949", Some(1), None));
        assert_eq!(at_least_one.len(), 1 + 3);
        assert!(at_least_one.iter().all(|p| !p.modifications.is_empty()));
        assert!(count(limited("", Some(1), None)).is_empty());

        let header = limited("", Some(1), Some(3)).peptides_header(true);
        assert_eq!((header.min_variable_mods, header.max_variable_mods), (1, 3));
    }

    #[test]
    fn protein_terminal_variants() {
        let fasta = Fasta::parse(FASTA);
        let params = parameters("1[M+42.0106");
        let (peptides, _) = params.digest(&fasta).unwrap();
        let (peptides, summary) = params.modify(peptides, &fasta.targets).unwrap();
        // Only MEWKLEQSMR starts its first protein with a methionine
        assert_eq!(summary.variants, 4 + 1);

        let annotated = finalize(peptides)
            .iter()
            .map(|p| p.annotate(&fasta.targets, &params.mods).unwrap())
            .collect::<Vec<_>>();
        assert!(annotated.contains(&"[+42.0106]-MEWKLEQSMR".to_string()));
    }

    #[test]
    fn defaults() {
        let params = Builder {
            fasta: Some("db.fasta".into()),
            ..Default::default()
        }
        .make_parameters()
        .unwrap();
        assert_eq!(params.peptide_min_mass, 200.0);
        assert_eq!(params.peptide_max_mass, 7200.0);
        assert_eq!(params.mass_type, MassType::Monoisotopic);
        assert!(params.mods.is_empty());
        assert_eq!(params.max_variable_mods, 2);
        assert_eq!(params.min_variable_mods, 0);
        assert_eq!(params.enzyme.description(), "cleave after [KR], not before P");

        let enzyme = params.enzyme_parameters().unwrap();
        assert_eq!(enzyme.missed_cleavages, 0);
        assert_eq!((enzyme.min_len, enzyme.max_len), (6, 50));
    }

    #[test]
    fn invalid_builders() {
        assert!(Builder::default().make_parameters().is_err());

        let bad_mods = Builder {
            mods: Some("C+57.02146,2M".into()),
            fasta: Some("db.fasta".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_mods.make_parameters(),
            Err(Error::InvalidModSpec { .. })
        ));

        let bad_masses = Builder {
            peptide_min_mass: Some(5000.0),
            peptide_max_mass: Some(500.0),
            fasta: Some("db.fasta".into()),
            ..Default::default()
        };
        assert!(bad_masses.make_parameters().is_err());

        let bad_limits = Builder {
            min_variable_mods: Some(3),
            max_variable_mods: Some(2),
            fasta: Some("db.fasta".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_limits.make_parameters(),
            Err(Error::InvalidParameters(_))
        ));

        // A maximum of zero is raised to one
        let zero = Builder {
            max_variable_mods: Some(0),
            fasta: Some("db.fasta".into()),
            ..Default::default()
        };
        assert_eq!(zero.make_parameters().unwrap().max_variable_mods, 1);
    }

    #[test]
    fn deserialize_builder() {
        let json = r#"{"fasta": "db.fasta", "enzyme": {"name": "asp-n"}, "mods": "C+57.02146", "mass_type": "average"}"#;
        let builder: Builder = serde_json::from_str(json).unwrap();
        let params = builder.make_parameters().unwrap();
        assert_eq!(params.mass_type, MassType::Average);
        assert_eq!(params.enzyme.description(), "asp-n");
        assert_eq!(params.mods.static_mods.len(), 1);
    }
}
