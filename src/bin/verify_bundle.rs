//! Standalone CLI: verify a proof bundle exported from the service,
//! entirely offline — no database, no network call, no trust in the
//! server that produced it beyond its embedded signing key.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use trackrecord::bundle::ProofBundle;
use trackrecord::verify::verify_bundle;

#[derive(Parser, Debug)]
#[command(about = "Verify a trackrecord proof bundle")]
struct Args {
    /// Path to a proof bundle JSON file.
    bundle_path: PathBuf,

    /// Print the full verification result as JSON instead of a summary line.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = fs::read_to_string(&args.bundle_path)
        .with_context(|| format!("failed to read {}", args.bundle_path.display()))?;
    let bundle: ProofBundle = serde_json::from_str(&raw).context("failed to parse proof bundle JSON")?;

    let result = verify_bundle(&bundle);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.summary);
        if !result.verified {
            for err in &result.l1.errors {
                println!("  error: {err}");
            }
        }
        for caveat in &result.l1.caveats {
            println!("  caveat: {caveat}");
        }
    }

    std::process::exit(if result.verified { 0 } else { 1 });
}
