use pepindex_cli::input::Input;
use pepindex_cli::runner::Runner;

#[test]
fn integration() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("pepindex-cli-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let json = serde_json::json!({
        "database": {
            "enzyme": { "missed_cleavages": 1 },
            "mods": "C+57.02146,1M+15.9949",
            "fasta": "../../tests/Q99536.fasta"
        },
        "output_directory": dir.display().to_string(),
        "write_peptides": true
    });
    let input: Input = serde_json::from_value(json)?;
    let settings = input.build()?;
    assert_eq!(settings.database.mods.to_string(), "C+57.02146,1M+15.9949");

    let summary = Runner::new(settings).run()?;
    assert_eq!(summary.proteins, 1);
    assert!(summary.records > summary.peptides);

    let listing = std::fs::read_to_string(dir.join("peptides.tsv"))?;
    let mut lines = listing.lines();
    assert_eq!(
        lines.next(),
        Some("id\tpeptide\tmass\tpeptide_len\tnum_locations\tproteins")
    );
    assert_eq!(lines.count(), summary.records);
    assert!(listing.contains("LQSRPAAPPAPGPGQLTLR\t"));
    assert!(listing.contains("M[+15.9949]"));

    let results: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("results.json"))?)?;
    assert_eq!(results["write_peptides"], true);
    assert_eq!(results["output_paths"].as_array().map(Vec::len), Some(5));

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
