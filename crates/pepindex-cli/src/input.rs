use anyhow::{ensure, Context};
use clap::ArgMatches;
use pepindex_core::database::{Builder, Parameters};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual index parameters - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub database: Parameters,
    pub output_directory: PathBuf,
    pub write_peptides: bool,
    pub output_paths: Vec<String>,
}

#[derive(Deserialize)]
/// Input parameters deserialized from JSON file
pub struct Input {
    database: Builder,
    output_directory: Option<String>,
    write_peptides: Option<bool>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing required `parameters` argument")?;

        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(fasta) = matches.get_one::<String>("fasta") {
            log::trace!("overriding `database.fasta` parameter.");
            input.database.update_fasta(fasta.into());
        }
        if let Some(mods) = matches.get_one::<String>("mods") {
            log::trace!("overriding `database.mods` parameter.");
            input.database.update_mods(mods.into());
        }
        if matches.get_flag("write-peptides") {
            input.write_peptides = Some(true);
        }

        ensure!(
            input.database.fasta.is_some(),
            "`database.fasta` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        pepindex_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let database = self
            .database
            .make_parameters()
            .context("Invalid `database` parameters")?;

        if database.mods.is_empty() {
            log::info!("no modifications configured");
        }

        let output_directory = match self.output_directory {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&output_directory).with_context(|| {
            format!(
                "Failed to create output directory `{}`",
                output_directory.display()
            )
        })?;

        Ok(Settings {
            version: clap::crate_version!().into(),
            database,
            output_directory,
            write_peptides: self.write_peptides.unwrap_or(false),
            output_paths: Vec::new(),
        })
    }
}
