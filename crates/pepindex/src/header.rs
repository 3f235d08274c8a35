use crate::mass::MassType;
use crate::modification::ModTable;
use serde::{Deserialize, Serialize};

/// The first record of a headed file. The variant declares what every
/// following record is.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Header {
    /// Protein records, parsed from the FASTA file at `source`
    RawProteins { source: String },
    /// Peptide records
    Peptides(PeptidesHeader),
    /// Auxiliary locations belonging to the peptide file at `source`
    AuxLocations { source: String },
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    RawProteins,
    Peptides,
    AuxLocations,
}

/// How a peptide file was generated
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PeptidesHeader {
    /// Protein file the peptides were digested from
    pub source: String,
    pub enzyme: String,
    pub missed_cleavages: u8,
    /// Inclusive
    pub min_mass: f64,
    /// Inclusive
    pub max_mass: f64,
    pub min_length: u32,
    pub max_length: u32,
    pub mass_type: MassType,
    /// Always false: no fragment peaks are precomputed
    pub has_peaks: bool,
    pub mods: ModTable,
    /// Variable modifications per variant, terminal ones included
    pub min_variable_mods: usize,
    pub max_variable_mods: usize,
    /// Set once the records are in non-decreasing mass order with ids assigned
    pub sorted: bool,
}

impl Header {
    pub fn file_type(&self) -> FileType {
        match self {
            Header::RawProteins { .. } => FileType::RawProteins,
            Header::Peptides(_) => FileType::Peptides,
            Header::AuxLocations { .. } => FileType::AuxLocations,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Header::RawProteins { source } | Header::AuxLocations { source } => source,
            Header::Peptides(header) => &header.source,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileType::RawProteins => "raw proteins",
            FileType::Peptides => "peptides",
            FileType::AuxLocations => "auxiliary locations",
        };
        f.write_str(name)
    }
}
