use serde::{Deserialize, Serialize};

use crate::modification::StaticMod;

pub const H2O: f64 = 18.010565;
pub const H2O_AVERAGE: f64 = 18.01528;

pub const VALID_AA: [u8; 20] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y',
];

pub trait Mass {
    fn monoisotopic(&self) -> f64;
    fn average(&self) -> f64;
}

impl Mass for u8 {
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }

    fn average(&self) -> f64 {
        match self {
            b'A' => 71.0788,
            b'R' => 156.1875,
            b'N' => 114.1038,
            b'D' => 115.0886,
            b'C' => 103.1388,
            b'E' => 129.1155,
            b'Q' => 128.1307,
            b'G' => 57.0519,
            b'H' => 137.1411,
            b'I' => 113.1594,
            b'L' => 113.1594,
            b'K' => 128.1741,
            b'M' => 131.1926,
            b'F' => 147.1766,
            b'P' => 97.1167,
            b'S' => 87.0782,
            b'T' => 101.1051,
            b'W' => 186.2132,
            b'Y' => 163.1760,
            b'V' => 99.1326,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MassType {
    #[default]
    Monoisotopic,
    Average,
}

/// Per-residue masses with static modifications folded in
#[derive(Clone, Debug)]
pub struct ResidueMasses {
    table: [f64; 256],
    water: f64,
}

impl ResidueMasses {
    pub fn new(mass_type: MassType, static_mods: &[StaticMod]) -> Self {
        let mut table = [0.0; 256];
        for aa in VALID_AA {
            table[aa as usize] = match mass_type {
                MassType::Monoisotopic => aa.monoisotopic(),
                MassType::Average => aa.average(),
            };
        }
        for m in static_mods {
            if let Some(mass) = table.get_mut(m.residue as usize) {
                *mass += m.delta;
            }
        }
        let water = match mass_type {
            MassType::Monoisotopic => H2O,
            MassType::Average => H2O_AVERAGE,
        };
        ResidueMasses { table, water }
    }

    /// Residues outside [`VALID_AA`] weigh nothing. Proteins never contain
    /// them, since the FASTA reader strips them.
    #[inline]
    pub fn get(&self, residue: u8) -> f64 {
        self.table[residue as usize]
    }

    pub fn water(&self) -> f64 {
        self.water
    }

    /// `prefix[i]` is the summed residue mass of `residues[..i]`
    pub fn prefix_sums(&self, residues: &[u8]) -> Vec<f64> {
        let mut prefix = Vec::with_capacity(residues.len() + 1);
        let mut sum = 0.0;
        prefix.push(sum);
        for &aa in residues {
            sum += self.get(aa);
            prefix.push(sum);
        }
        prefix
    }

    /// Neutral mass of an unmodified peptide
    pub fn peptide(&self, residues: &[u8]) -> f64 {
        residues.iter().map(|&aa| self.get(aa)).sum::<f64>() + self.water
    }
}
