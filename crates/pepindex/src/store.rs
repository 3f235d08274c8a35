//! Typed protein and peptide files on top of the record store.
//!
//! A peptide index is two headed files that are read in lockstep: the
//! peptide file, holding one [`PeptideRecord`] per peptide, and the
//! auxiliary location file, holding one [`AuxLocation`] for every peptide
//! that occurs in more than one place, in the same order.

use std::io::{Read, Write};

use crate::fasta::Protein;
use crate::header::{FileType, Header, PeptidesHeader};
use crate::peptide::{AuxLocation, Peptide, PeptideRecord};
use crate::records::{HeadedRecordReader, HeadedRecordWriter, Records};
use crate::Error;

pub fn write_proteins<W: Write>(stream: W, source: &str, proteins: &[Protein]) -> Result<W, Error> {
    let header = Header::RawProteins {
        source: source.into(),
    };
    let mut writer = HeadedRecordWriter::new(stream, &header)?;
    for protein in proteins {
        writer.write(protein)?;
    }
    writer.finish()
}

/// Read a protein file, checking that ids run `0..N` in order. Returns the
/// source FASTA path along with the proteins.
pub fn read_proteins<R: Read>(stream: R) -> Result<(String, Vec<Protein>), Error> {
    let reader = HeadedRecordReader::open_expecting(stream, FileType::RawProteins)?;
    let source = reader.header().source().to_string();
    let mut proteins = Vec::new();
    for protein in reader.records::<Protein>() {
        let protein = protein?;
        let expected = proteins.len() as u32;
        if protein.id != expected {
            return Err(Error::ProteinIdMismatch {
                expected,
                found: protein.id,
            });
        }
        proteins.push(protein);
    }
    Ok((source, proteins))
}

pub struct PeptideWriter<W: Write, A: Write> {
    peptides: HeadedRecordWriter<W>,
    aux: HeadedRecordWriter<A>,
    next_aux: u32,
}

impl<W: Write, A: Write> PeptideWriter<W, A> {
    /// `aux_source` names the peptide file in the auxiliary file's header
    pub fn new(peptides: W, aux: A, header: PeptidesHeader, aux_source: &str) -> Result<Self, Error> {
        let peptides = HeadedRecordWriter::new(peptides, &Header::Peptides(header))?;
        let aux = HeadedRecordWriter::new(
            aux,
            &Header::AuxLocations {
                source: aux_source.into(),
            },
        )?;
        Ok(Self {
            peptides,
            aux,
            next_aux: 0,
        })
    }

    pub fn write(&mut self, peptide: Peptide) -> Result<(), Error> {
        let (record, aux) = peptide.into_record(self.next_aux)?;
        if let Some(aux) = aux {
            self.aux.write(&aux)?;
            self.next_aux += 1;
        }
        self.peptides.write(&record)
    }

    /// Peptides written so far
    pub fn written(&self) -> usize {
        self.peptides.written()
    }

    pub fn finish(self) -> Result<(W, A), Error> {
        let peptides = self.peptides.finish()?;
        let aux = self.aux.finish()?;
        Ok((peptides, aux))
    }
}

/// Iterates over peptides with all of their locations restored
pub struct PeptideReader<R: Read, A: Read> {
    header: PeptidesHeader,
    aux_source: String,
    peptides: Records<R, PeptideRecord>,
    aux: Records<A, AuxLocation>,
    next_aux: u32,
    done: bool,
}

impl<R: Read, A: Read> PeptideReader<R, A> {
    pub fn open(peptides: R, aux: A) -> Result<Self, Error> {
        let (header, peptides) =
            HeadedRecordReader::open_expecting(peptides, FileType::Peptides)?.into_parts();
        let header = match header {
            Header::Peptides(header) => header,
            other => {
                return Err(Error::UnexpectedHeader {
                    expected: FileType::Peptides,
                    found: other.file_type(),
                })
            }
        };
        let aux = HeadedRecordReader::open_expecting(aux, FileType::AuxLocations)?;
        let aux_source = aux.header().source().to_string();
        Ok(Self {
            header,
            aux_source,
            peptides: peptides.records(),
            aux: aux.records(),
            next_aux: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &PeptidesHeader {
        &self.header
    }

    pub fn aux_source(&self) -> &str {
        &self.aux_source
    }

    fn read_aux(&mut self, record: &PeptideRecord) -> Result<Option<AuxLocation>, Error> {
        let Some(index) = record.aux_locations_index else {
            return Ok(None);
        };
        if index != self.next_aux {
            return Err(Error::MalformedRecord(format!(
                "expected auxiliary location {}, found {}",
                self.next_aux, index
            )));
        }
        let aux = self.aux.next().ok_or_else(|| {
            Error::MalformedRecord(format!(
                "auxiliary location file ended before location {}",
                index
            ))
        })??;
        self.next_aux += 1;
        Ok(Some(aux))
    }

    fn next_peptide(&mut self) -> Option<Result<Peptide, Error>> {
        match self.peptides.next()? {
            Ok(record) => Some(
                self.read_aux(&record)
                    .map(|aux| Peptide::from_record(record, aux)),
            ),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<R: Read, A: Read> Iterator for PeptideReader<R, A> {
    type Item = Result<Peptide, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.next_peptide() {
            Some(item) => item,
            None => {
                self.done = true;
                // Both streams must run out together
                return match self.aux.next() {
                    None => None,
                    Some(Ok(_)) => Some(Err(Error::MalformedRecord(
                        "auxiliary location file has records past the last peptide".into(),
                    ))),
                    Some(Err(err)) => Some(Err(err)),
                };
            }
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass::MassType;
    use crate::modification::ModTable;
    use crate::peptide::Location;
    use crate::records::RecordWriter;
    use std::io::Cursor;

    fn header() -> PeptidesHeader {
        PeptidesHeader {
            source: "protix".into(),
            enzyme: "trypsin".into(),
            missed_cleavages: 0,
            min_mass: 200.0,
            max_mass: 7200.0,
            min_length: 6,
            max_length: 50,
            mass_type: MassType::Monoisotopic,
            has_peaks: false,
            mods: ModTable::default(),
            min_variable_mods: 0,
            max_variable_mods: 2,
            sorted: false,
        }
    }

    fn peptide(mass: f64, locations: &[(u32, u32)]) -> Peptide {
        Peptide {
            id: None,
            mass,
            length: 6,
            locations: locations
                .iter()
                .map(|&(protein_id, pos)| Location { protein_id, pos })
                .collect(),
            modifications: Vec::new(),
            nterm_mod: None,
            cterm_mod: None,
        }
    }

    fn write(peptides: &[Peptide]) -> (Vec<u8>, Vec<u8>) {
        let mut writer = PeptideWriter::new(Vec::new(), Vec::new(), header(), "pepix").unwrap();
        for p in peptides {
            writer.write(p.clone()).unwrap();
        }
        assert_eq!(writer.written(), peptides.len());
        writer.finish().unwrap()
    }

    #[test]
    fn proteins_round_trip() {
        let proteins = vec![
            Protein {
                id: 0,
                name: "A".into(),
                residues: "MADEEK".into(),
            },
            Protein {
                id: 1,
                name: "B".into(),
                residues: "LESLIEK".into(),
            },
        ];
        let bytes = write_proteins(Vec::new(), "db.fasta", &proteins).unwrap();
        let (source, read) = read_proteins(Cursor::new(bytes)).unwrap();
        assert_eq!(source, "db.fasta");
        assert_eq!(read, proteins);
    }

    #[test]
    fn protein_id_gap() {
        let proteins = vec![
            Protein {
                id: 0,
                name: "A".into(),
                residues: "MADEEK".into(),
            },
            Protein {
                id: 2,
                name: "B".into(),
                residues: "LESLIEK".into(),
            },
        ];
        let bytes = write_proteins(Vec::new(), "db.fasta", &proteins).unwrap();
        assert!(matches!(
            read_proteins(Cursor::new(bytes)),
            Err(Error::ProteinIdMismatch {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn peptides_round_trip() {
        let peptides = vec![
            peptide(700.0, &[(0, 0)]),
            peptide(800.0, &[(0, 6), (1, 2), (3, 9)]),
            peptide(900.0, &[(2, 0)]),
            peptide(950.0, &[(1, 0), (2, 8)]),
        ];
        let (main, aux) = write(&peptides);

        let reader = PeptideReader::open(Cursor::new(main), Cursor::new(aux)).unwrap();
        assert_eq!(reader.header(), &header());
        assert_eq!(reader.aux_source(), "pepix");
        let read = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(read, peptides);
    }

    #[test]
    fn aux_file_ends_early() {
        let peptides = vec![peptide(700.0, &[(0, 0), (1, 0)])];
        let (main, _) = write(&peptides);
        let (_, empty_aux) = write(&[]);

        let mut reader = PeptideReader::open(Cursor::new(main), Cursor::new(empty_aux)).unwrap();
        assert!(matches!(reader.next(), Some(Err(Error::MalformedRecord(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn aux_file_too_long() {
        let (main, _) = write(&[peptide(700.0, &[(0, 0)])]);
        let (_, aux) = write(&[peptide(700.0, &[(0, 0), (1, 0)])]);

        let mut reader = PeptideReader::open(Cursor::new(main), Cursor::new(aux)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(Error::MalformedRecord(_)))));
    }

    #[test]
    fn out_of_sequence_aux_index() {
        let mut writer = HeadedRecordWriter::new(Vec::new(), &Header::Peptides(header())).unwrap();
        let (mut record, _) = peptide(700.0, &[(0, 0), (1, 0)]).into_record(0).unwrap();
        record.aux_locations_index = Some(3);
        writer.write(&record).unwrap();
        let main = writer.finish().unwrap();
        let (_, aux) = write(&[peptide(700.0, &[(0, 0), (1, 0)])]);

        let mut reader = PeptideReader::open(Cursor::new(main), Cursor::new(aux)).unwrap();
        assert!(matches!(reader.next(), Some(Err(Error::MalformedRecord(_)))));
    }

    #[test]
    fn swapped_files() {
        let (main, aux) = write(&[peptide(700.0, &[(0, 0)])]);
        assert!(matches!(
            PeptideReader::open(Cursor::new(aux), Cursor::new(main)),
            Err(Error::UnexpectedHeader { .. })
        ));

        let headerless = RecordWriter::new(Vec::new()).unwrap().finish().unwrap();
        assert!(PeptideReader::open(Cursor::new(headerless), Cursor::new(Vec::new())).is_err());
    }
}
