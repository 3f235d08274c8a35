use super::runner::Runner;
use anyhow::Context;
use pepindex_core::database::IndexPaths;
use pepindex_core::fasta::Protein;
use pepindex_core::modification::ModTable;
use pepindex_core::peptide::Peptide;
use rayon::prelude::*;
use std::path::PathBuf;

impl Runner {
    fn serialize_peptide(
        peptide: &Peptide,
        proteins: &[Protein],
        mods: &ModTable,
    ) -> anyhow::Result<csv::ByteRecord> {
        let mut record = csv::ByteRecord::new();
        let id = peptide.id.context("peptide index is not finalized")?;
        record.push_field(itoa::Buffer::new().format(id).as_bytes());
        record.push_field(peptide.annotate(proteins, mods)?.as_bytes());
        record.push_field(ryu::Buffer::new().format(peptide.mass).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.length).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.locations.len()).as_bytes());
        let names = peptide
            .locations
            .iter()
            .map(|location| {
                proteins
                    .get(location.protein_id as usize)
                    .map(|protein| protein.name.as_str())
                    .with_context(|| format!("unknown protein id {}", location.protein_id))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .join(";");
        record.push_field(names.as_bytes());
        Ok(record)
    }

    /// Write every peptide in the index at `paths` as a tab-separated listing
    pub fn write_peptides(&self, paths: &IndexPaths) -> anyhow::Result<PathBuf> {
        let path = self.make_path("peptides.tsv");

        let proteins = paths.read_proteins()?;
        let reader = paths.open_peptides()?;
        let mods = reader.header().mods.clone();
        let peptides = reader.collect::<Result<Vec<_>, _>>()?;

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "id",
            "peptide",
            "mass",
            "peptide_len",
            "num_locations",
            "proteins",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in peptides
            .par_iter()
            .map(|peptide| Self::serialize_peptide(peptide, &proteins, &mods))
            .collect::<anyhow::Result<Vec<_>>>()?
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path)
    }
}
