//! expfuse - Expediente fusion CLI
//!
//! Thin shim over the fusion library: reads per-source extractions (JSON)
//! and optional fusion coefficients (TOML), runs record fusion, and prints
//! the fused record with run metadata as JSON. All semantics live in the
//! library; this binary only moves bytes.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use expfuse_common::FusionCoefficients;
use expfuse_engine::record::{fuse_record, RecordFusionResult, SourceExtraction};

#[derive(Parser, Debug)]
#[command(name = "expfuse")]
#[command(about = "Multi-source expediente fusion")]
#[command(version)]
struct Args {
    /// JSON file with the per-source extractions
    input: PathBuf,

    /// TOML file with fusion coefficients (compiled defaults when omitted)
    #[arg(short, long, env = "EXPFUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[derive(Serialize)]
struct RunOutput {
    meta: RunMeta,
    result: RecordFusionResult,
}

#[derive(Serialize)]
struct RunMeta {
    engine_version: String,
    run_at: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let coefficients = FusionCoefficients::load_or_default(args.config.as_deref())?;

    let payload = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let sources: Vec<SourceExtraction> =
        serde_json::from_str(&payload).context("parsing extraction input")?;

    info!(sources = sources.len(), "running record fusion");
    let result = fuse_record(&sources, &coefficients)?;
    info!(
        next_action = %result.next_action,
        overall_confidence = result.overall_confidence,
        conflicting_fields = result.conflicting_fields.len(),
        "fusion complete"
    );

    let output = RunOutput {
        meta: RunMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        result,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
