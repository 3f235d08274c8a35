//! Static and variable modification tables
//!
//! A table is parsed from a comma-separated list of entries:
//!
//! * `C+57.02146`: static, every C carries the delta
//! * `2STY+79.9663`: variable, any of S, T or Y may carry the delta, at most
//!   twice per peptide
//! * `1^+42.0106`, `1$K+14.0157`, `1[M+42.0106`, `1]+0.984`: variable,
//!   placed at the peptide N-terminus, peptide C-terminus, protein N-terminus
//!   or protein C-terminus. Residues are optional and restrict the terminal
//!   residue; none means any residue.
//!
//! Modified positions are stored as single integers, see [`ModCoder`].

use fnv::FnvHashSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::mass::VALID_AA;
use crate::Error;

static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<count>[0-9]+)?(?P<site>[\^\$\[\]])?(?P<residues>[A-Z]*)\+(?P<delta>[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)$")
        .expect("modification grammar is a valid regex")
});

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub struct StaticMod {
    pub residue: char,
    pub delta: f64,
}

/// Where a variable modification may be placed
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    /// Any matching residue
    #[default]
    Residue,
    PeptideN,
    PeptideC,
    ProteinN,
    ProteinC,
}

impl Site {
    fn from_prefix(prefix: Option<&str>) -> Site {
        match prefix {
            Some("^") => Site::PeptideN,
            Some("$") => Site::PeptideC,
            Some("[") => Site::ProteinN,
            Some("]") => Site::ProteinC,
            _ => Site::Residue,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Site::Residue => "",
            Site::PeptideN => "^",
            Site::PeptideC => "$",
            Site::ProteinN => "[",
            Site::ProteinC => "]",
        }
    }

    pub fn is_n_term(&self) -> bool {
        matches!(self, Site::PeptideN | Site::ProteinN)
    }

    pub fn is_c_term(&self) -> bool {
        matches!(self, Site::PeptideC | Site::ProteinC)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VariableMod {
    pub site: Site,
    /// Residues that may carry the delta. Empty for a terminal mod that
    /// accepts any residue.
    pub residues: String,
    pub delta: f64,
    /// Maximum number of times this mod may occur in one peptide
    pub max_count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ModTable {
    pub static_mods: Vec<StaticMod>,
    pub variable_mods: Vec<VariableMod>,
    /// Sorted, deduplicated variable mod deltas. Encoded modifications index
    /// into this list.
    pub unique_deltas: Vec<f64>,
}

impl VariableMod {
    pub fn applies_to(&self, residue: u8) -> bool {
        self.residues.is_empty() || self.residues.as_bytes().contains(&residue)
    }

    fn overlaps(&self, other: &VariableMod) -> Option<char> {
        if self.site != other.site {
            return None;
        }
        match (self.residues.is_empty(), other.residues.is_empty()) {
            (true, true) => Some('X'),
            (true, false) => other.residues.chars().next(),
            (false, true) => self.residues.chars().next(),
            (false, false) => self.residues.chars().find(|&r| other.residues.contains(r)),
        }
    }
}

fn invalid<S: Into<String>>(spec: &str, reason: S) -> Error {
    Error::InvalidModSpec {
        spec: spec.into(),
        reason: reason.into(),
    }
}

enum Entry {
    Static(StaticMod),
    Variable(VariableMod),
}

fn parse_entry(entry: &str) -> Result<Entry, Error> {
    let caps = ENTRY
        .captures(entry)
        .ok_or_else(|| invalid(entry, "expected `<count><residues>+<delta>` or `<residue>+<delta>`"))?;

    let residues = &caps["residues"];
    if let Some(bad) = residues.bytes().find(|aa| !VALID_AA.contains(aa)) {
        return Err(invalid(
            entry,
            format!("unrecognized residue `{}`", bad as char),
        ));
    }

    let delta = caps["delta"]
        .parse::<f64>()
        .map_err(|err| invalid(entry, err.to_string()))?;
    if !(delta.is_finite() && delta > 0.0) {
        return Err(invalid(entry, "mass delta must be positive"));
    }

    let site = Site::from_prefix(caps.name("site").map(|m| m.as_str()));
    match caps.name("count") {
        None if site != Site::Residue => Err(invalid(
            entry,
            "terminal modifications must be variable",
        )),
        Some(_) if site == Site::Residue && residues.is_empty() => Err(invalid(
            entry,
            "a variable modification needs at least one residue",
        )),
        Some(count) => {
            let max_count = count
                .as_str()
                .parse::<u32>()
                .map_err(|err| invalid(entry, err.to_string()))?;
            if max_count == 0 {
                return Err(invalid(entry, "maximum count must be at least 1"));
            }
            Ok(Entry::Variable(VariableMod {
                site,
                residues: residues.into(),
                delta,
                max_count,
            }))
        }
        None => {
            let mut chars = residues.chars();
            match (chars.next(), chars.next()) {
                (Some(residue), None) => Ok(Entry::Static(StaticMod { residue, delta })),
                _ => Err(invalid(
                    entry,
                    "a static modification applies to exactly one residue",
                )),
            }
        }
    }
}

impl ModTable {
    /// Parse a modification specification, permitting variable mods with
    /// overlapping residue sets
    pub fn parse(spec: &str) -> Result<Self, Error> {
        Self::parse_with(spec, false)
    }

    pub fn parse_with(spec: &str, reject_overlapping: bool) -> Result<Self, Error> {
        let mut static_mods = Vec::new();
        let mut variable_mods = Vec::new();
        for entry in spec.split(',').map(str::trim) {
            if entry.is_empty() {
                if spec.trim().is_empty() {
                    continue;
                }
                return Err(invalid(spec, "empty entry"));
            }
            match parse_entry(entry)? {
                Entry::Static(m) => static_mods.push(m),
                Entry::Variable(m) => variable_mods.push(m),
            }
        }
        Self::new(static_mods, variable_mods, reject_overlapping)
    }

    /// Validate the mods and build the delta index
    pub fn new(
        static_mods: Vec<StaticMod>,
        variable_mods: Vec<VariableMod>,
        reject_overlapping: bool,
    ) -> Result<Self, Error> {
        let mut static_residues = FnvHashSet::default();
        let mut pairs = FnvHashSet::default();
        for m in &static_mods {
            if !static_residues.insert(m.residue) {
                return Err(invalid(
                    &m.to_string(),
                    format!("residue {} has more than one static modification", m.residue),
                ));
            }
            pairs.insert((m.residue, m.delta.to_bits()));
        }

        let mut variable_pairs = FnvHashSet::default();
        for m in &variable_mods {
            if !(m.delta.is_finite() && m.delta > 0.0) {
                return Err(invalid(&m.to_string(), "mass delta must be positive"));
            }
            let residues = match m.residues.is_empty() {
                true => vec!['X'],
                false => m.residues.chars().collect(),
            };
            for residue in residues {
                if m.site == Site::Residue && pairs.contains(&(residue, m.delta.to_bits())) {
                    return Err(invalid(
                        &m.to_string(),
                        format!("{}+{} is both static and variable", residue, m.delta),
                    ));
                }
                if !variable_pairs.insert((m.site, residue, m.delta.to_bits())) {
                    return Err(invalid(
                        &m.to_string(),
                        format!("{}+{} is given more than once", residue, m.delta),
                    ));
                }
            }
        }

        if reject_overlapping {
            for (i, a) in variable_mods.iter().enumerate() {
                for b in &variable_mods[i + 1..] {
                    if let Some(shared) = a.overlaps(b) {
                        return Err(invalid(
                            &format!("{},{}", a, b),
                            format!("residue {} is targeted by both variable modifications", shared),
                        ));
                    }
                }
            }
        }

        let mut unique_deltas = variable_mods.iter().map(|m| m.delta).collect::<Vec<_>>();
        unique_deltas.sort_by(|a, b| a.total_cmp(b));
        unique_deltas.dedup();

        Ok(ModTable {
            static_mods,
            variable_mods,
            unique_deltas,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.static_mods.is_empty() && self.variable_mods.is_empty()
    }

    pub fn has_variable_mods(&self) -> bool {
        !self.variable_mods.is_empty()
    }

    pub fn coder(&self) -> ModCoder {
        ModCoder::new(self.unique_deltas.len())
    }

    /// Position of `delta` in [`ModTable::unique_deltas`]
    pub fn delta_index(&self, delta: f64) -> Option<u32> {
        self.unique_deltas
            .binary_search_by(|x| x.total_cmp(&delta))
            .ok()
            .map(|idx| idx as u32)
    }

    /// Decode a modification into its residue position and mass delta
    pub fn decode(&self, coder: ModCoder, code: u32) -> Option<(u32, f64)> {
        let (position, index) = coder.decode(code);
        self.unique_deltas
            .get(index as usize)
            .map(|&delta| (position, delta))
    }
}

impl FromStr for ModTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModTable::parse(s)
    }
}

impl Display for StaticMod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.residue, self.delta)
    }
}

impl Display for VariableMod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}+{}",
            self.max_count,
            self.site.prefix(),
            self.residues,
            self.delta
        )
    }
}

/// Renders the table back into the text it can be parsed from
impl Display for ModTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self
            .static_mods
            .iter()
            .map(ToString::to_string)
            .chain(self.variable_mods.iter().map(ToString::to_string))
            .collect::<Vec<_>>();
        f.write_str(&entries.join(","))
    }
}

fn log2_ceil(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Packs a (position, delta index) pair into one integer:
/// `position << bits | delta_index`, where `bits` is just wide enough to
/// hold every index into the unique deltas of a table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ModCoder {
    bits: u32,
}

impl ModCoder {
    pub fn new(unique_deltas: usize) -> Self {
        ModCoder {
            bits: log2_ceil(unique_deltas),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn encode(&self, position: u32, delta_index: u32) -> u32 {
        debug_assert!(
            delta_index < (1 << self.bits),
            "delta index {} does not fit in {} bits",
            delta_index,
            self.bits
        );
        (position << self.bits) | delta_index
    }

    /// Returns `(position, delta_index)`
    pub fn decode(&self, code: u32) -> (u32, u32) {
        let mask = (1u32 << self.bits) - 1;
        (code >> self.bits, code & mask)
    }
}
