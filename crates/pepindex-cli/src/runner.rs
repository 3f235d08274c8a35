use super::input::Settings;
use anyhow::Context;
use log::info;
use pepindex_core::database::IndexSummary;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub parameters: Settings,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Settings) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn run(mut self) -> anyhow::Result<IndexSummary> {
        let fasta = pepindex_core::read_fasta(&self.parameters.database.fasta).with_context(|| {
            format!(
                "Failed to read FASTA database from `{}`",
                self.parameters.database.fasta
            )
        })?;
        info!(
            "read {} proteins from {}",
            fasta.targets.len(),
            self.parameters.database.fasta
        );

        let summary = self
            .parameters
            .database
            .build(&fasta, &self.parameters.output_directory)
            .with_context(|| {
                format!(
                    "Failed to build peptide index in `{}`",
                    self.parameters.output_directory.display()
                )
            })?;
        info!(
            "indexed {} peptides ({} distinct sequences) in {:#?}",
            summary.records,
            summary.peptides,
            self.start.elapsed()
        );

        for path in [
            &summary.paths.proteins,
            &summary.paths.peptides,
            &summary.paths.aux_locations,
        ] {
            self.parameters
                .output_paths
                .push(path.display().to_string());
        }

        if self.parameters.write_peptides {
            let path = self.write_peptides(&summary.paths)?;
            self.parameters
                .output_paths
                .push(path.display().to_string());
        }

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        let run_time = (Instant::now() - self.start).as_secs();
        info!("finished in {}s", run_time);
        Ok(summary)
    }
}
