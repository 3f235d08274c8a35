use crate::enzyme::{Digest, DigestSummary, EnzymeParameters};
use crate::mass::{ResidueMasses, VALID_AA};
use crate::Error;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Protein {
    /// Dense, 0-based, in file order
    pub id: u32,
    /// First whitespace-delimited token of the header line
    pub name: String,
    /// Uppercase amino acids only
    pub residues: String,
}

/// Append the valid residues of `line` to `residues`, returning how many
/// non-whitespace characters were dropped
fn normalize(line: &str, residues: &mut String) -> usize {
    let mut dropped = 0;
    for ch in line.chars() {
        if ch.is_ascii() && VALID_AA.contains(&(ch as u8)) {
            residues.push(ch);
        } else if !ch.is_whitespace() {
            dropped += 1;
        }
    }
    dropped
}

/// Line-at-a-time protein accumulator, shared by the streaming reader and
/// [`Fasta::parse`]
#[derive(Default)]
struct Parser {
    name: Option<String>,
    residues: String,
    dropped: usize,
    next_id: u32,
}

impl Parser {
    /// Returns the previous protein when `line` starts a new one
    fn push_line(&mut self, line: &str) -> Option<Protein> {
        let line = line.trim();
        if let Some(header) = line.strip_prefix('>') {
            let finished = self.take();
            self.name = Some(header.split_whitespace().next().unwrap_or("").to_string());
            finished
        } else {
            // Residues before the first header belong to no protein
            if self.name.is_some() {
                self.dropped += normalize(line, &mut self.residues);
            }
            None
        }
    }

    fn take(&mut self) -> Option<Protein> {
        let name = self.name.take()?;
        let residues = std::mem::take(&mut self.residues);
        let dropped = std::mem::take(&mut self.dropped);
        if dropped > 0 {
            log::debug!("{}: dropped {} invalid characters", name, dropped);
        }
        if residues.is_empty() {
            log::debug!("{}: no residues, skipping", name);
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(Protein { id, name, residues })
    }
}

/// Streams proteins out of a FASTA file
pub struct ProteinReader<R> {
    lines: std::io::Lines<R>,
    parser: Parser,
    done: bool,
}

impl<R: BufRead> ProteinReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            parser: Parser::default(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for ProteinReader<R> {
    type Item = Result<Protein, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(protein) = self.parser.push_line(&line) {
                        return Some(Ok(protein));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                None => {
                    self.done = true;
                    return self.parser.take().map(Ok);
                }
            }
        }
        None
    }
}

pub struct Fasta {
    pub targets: Vec<Protein>,
}

impl Fasta {
    // Parse a string into a fasta database
    pub fn parse(contents: &str) -> Fasta {
        let mut parser = Parser::default();
        let mut targets = Vec::new();
        for line in contents.lines() {
            targets.extend(parser.push_line(line));
        }
        targets.extend(parser.take());
        Fasta { targets }
    }

    pub fn read<R: BufRead>(reader: R) -> Result<Fasta, Error> {
        let targets = ProteinReader::new(reader).collect::<Result<Vec<_>, _>>()?;
        Ok(Fasta { targets })
    }

    /// Digest every protein. Proteins are processed in parallel, but the
    /// digests come back in the same order a sequential pass would produce.
    pub fn digest(
        &self,
        enzyme: &EnzymeParameters,
        masses: &ResidueMasses,
    ) -> (Vec<Digest>, DigestSummary) {
        let per_protein = self
            .targets
            .par_iter()
            .map(|protein| enzyme.digest(protein, masses))
            .collect::<Vec<_>>();

        let mut summary = DigestSummary::default();
        let mut digests = Vec::with_capacity(per_protein.iter().map(|(d, _)| d.len()).sum());
        for (protein_digests, protein_summary) in per_protein {
            digests.extend(protein_digests);
            summary += protein_summary;
        }
        (digests, summary)
    }
}
