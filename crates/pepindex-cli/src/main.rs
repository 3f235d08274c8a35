use anyhow::Context;
use clap::{value_parser, Arg, Command, ValueHint};
use pepindex_cli::input::Input;
use pepindex_cli::runner::Runner;
use rayon::ThreadPoolBuilder;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("PEPINDEX_LOG", "error,pepindex=info"))
        .init();

    let matches = Command::new("pepindex")
        .version(clap::crate_version!())
        .author("pepindex developers")
        .about("Digest a protein database into a mass-sorted peptide index")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("fasta")
                .short('f')
                .long("fasta")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to FASTA database. Overrides the FASTA file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where the index will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("mods")
                .long("mods")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Modification specification, e.g. `C+57.02146,2M+15.9949`. \
                     Overrides the modifications in the configuration file.",
                )
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("write-peptides")
                .long("write-peptides")
                .action(clap::ArgAction::SetTrue)
                .help("Write a tab-separated listing of every indexed peptide"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .copied()
        .map(usize::from)
        .unwrap_or_else(num_cpus::get);

    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to configure worker threads")?;

    let input = Input::from_arguments(matches)?;
    let runner = input.build().map(Runner::new)?;
    runner.run()?;

    Ok(())
}
