//! Mass-ordering and id assignment, the last step before a peptide index
//! is usable

use std::io::{Read, Write};

use rayon::prelude::*;

use crate::peptide::Peptide;
use crate::store::{PeptideReader, PeptideWriter};
use crate::Error;

/// Stable sort by mass, then number the peptides `0..N` in that order.
/// Peptides of equal mass keep their relative order.
pub fn finalize(mut peptides: Vec<Peptide>) -> Vec<Peptide> {
    peptides.par_sort_by(|a, b| a.mass.total_cmp(&b.mass));
    for (id, peptide) in peptides.iter_mut().enumerate() {
        peptide.id = Some(id as u32);
    }
    peptides
}

/// Read a peptide index, finalize it, and write it back out.
///
/// The peptide header is copied with `sorted` set; the auxiliary header is
/// copied as is, and auxiliary indices are reassigned in output order.
/// Finalizing an already finalized index reproduces it byte for byte.
pub fn finalize_file<R, A, W, B>(
    input: R,
    input_aux: A,
    output: W,
    output_aux: B,
) -> Result<(W, B), Error>
where
    R: Read,
    A: Read,
    W: Write,
    B: Write,
{
    let reader = PeptideReader::open(input, input_aux)?;
    let mut header = reader.header().clone();
    let aux_source = reader.aux_source().to_string();
    header.sorted = true;

    log::trace!("reading peptides");
    let peptides = reader.collect::<Result<Vec<_>, _>>()?;
    log::trace!("sorting {} peptides", peptides.len());
    let peptides = finalize(peptides);

    let mut writer = PeptideWriter::new(output, output_aux, header, &aux_source)?;
    for peptide in peptides {
        writer.write(peptide)?;
    }
    writer.finish()
}
