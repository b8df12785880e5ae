//! Report and round-trip checker for OPTIONS files.
//!
//! Loads a PC or PS3 options file, prints what was found, re-serializes
//! it and compares the result against the original bytes. Exits 0 when
//! everything parses and the round trip is byte-identical, 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use acboptions::prelude::*;

#[derive(Parser)]
#[command(name = "acboptions-cli")]
#[command(about = "Inspect an AC Brotherhood OPTIONS file and verify its round-trip", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to an OPTIONS file (PC or PS3)
    file: PathBuf,

    /// Optional hash->name dictionary (JSON) used for display only
    #[arg(long)]
    names: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let mut names = NameTable::new();
    if let Some(path) = &cli.names {
        match names.load_from_json(path) {
            Ok(count) => println!("Loaded {count} hash names from {}", path.display()),
            Err(e) => eprintln!("warning: could not load {}: {e}", path.display()),
        }
    }

    let original = std::fs::read(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let file = OptionsFile::from_bytes(&original)
        .with_context(|| format!("parsing {}", cli.file.display()))?;

    println!("File:     {}", cli.file.display());
    println!("Size:     {} bytes", original.len());
    println!(
        "Platform: {}",
        match file.platform() {
            Platform::Pc => "PC",
            Platform::Ps3 => "PS3",
        }
    );
    println!("Sections: {}", file.sections().len());

    let mut all_valid = true;
    for (index, section) in file.sections().iter().enumerate() {
        let root = section
            .root_property()
            .map(|p| p.display_name(&names))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{index}] {:<26} valid: {:<5} decompressed: {:>6} bytes  root: {root}",
            section.section_name(),
            section.is_valid() || !section.is_known(),
            section.raw_decompressed().len(),
        );
        if section.is_known() && !section.is_valid() {
            all_valid = false;
        }
    }

    let serialized = file.serialize().context("re-serializing")?;
    let pass = serialized == original;

    if pass {
        println!("Round-trip: PASS (identical)");
    } else {
        println!("Round-trip: FAIL");
        println!("  original:   {} bytes", original.len());
        println!("  serialized: {} bytes", serialized.len());
        if let Some(offset) = first_difference(&original, &serialized) {
            println!("  first difference at offset {offset:#x}");
            print_context("original  ", &original, offset);
            print_context("serialized", &serialized, offset);
        }
    }

    Ok(pass && all_valid)
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    if let Some(pos) = a.iter().zip(b.iter()).position(|(x, y)| x != y) {
        return Some(pos);
    }
    if a.len() != b.len() {
        return Some(a.len().min(b.len()));
    }
    None
}

fn print_context(label: &str, data: &[u8], offset: usize) {
    let start = offset.saturating_sub(8);
    let end = (offset + 24).min(data.len());
    let hex: Vec<String> = data[start..end]
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect();
    println!("  {label} [{start:#x}..{end:#x}]: {}", hex.join(" "));
}
