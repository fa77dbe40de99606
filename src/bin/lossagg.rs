//! Command-line front end for the aggregation engine: ingests one or two
//! simulation files and prints summary statistics.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lossagg::loss_series::LossSeries;
use lossagg::{ingest_file, IngestOptions};
use serde::Serialize;

#[derive(Parser)]
#[command(author, version, about = "Aggregate and summarize catastrophe simulation output")]
struct Cli {
    /// Base simulation file to ingest.
    base: PathBuf,

    /// Optional contributor simulation file; when given, allocated TVaR is
    /// computed for this file against `base`.
    contributor: Option<PathBuf>,

    /// Drop rows whose loss falls below this threshold.
    #[arg(long, default_value_t = 0.0)]
    min_loss_to_include: f64,

    /// Tenant/model id used to disambiguate Noncat provenance.
    #[arg(long)]
    mfid: Option<String>,

    /// Synthesize a fresh iteration key per event instead of grouping by
    /// the input file's iteration id.
    #[arg(long, default_value_t = false)]
    ignore_ordering: bool,

    /// Scale factor applied to `loss` to derive `full_rip` for 5/6-column input.
    #[arg(long, default_value_t = 1.0)]
    full_rip_scale: f64,

    /// Number of worker threads to fan the ingestion out over.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Exceedance probabilities for the TVaR table (ignored without `contributor`).
    #[arg(long, value_delimiter = ',', default_value = "0.01,0.02,0.05,0.1")]
    probs: Vec<f64>,

    /// Remove each series' mean before allocating TVaR.
    #[arg(long, default_value_t = false)]
    remove_mean: bool,

    /// Include reinstatement premium when totalling event loss.
    #[arg(long, default_value_t = false)]
    include_rip: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct Summary {
    count_events: usize,
    expected_loss: f64,
    sd: f64,
    allocated_tvar: Option<f64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let opts = IngestOptions {
        min_loss_to_include: cli.min_loss_to_include,
        mfid: cli.mfid.clone(),
        ignore_ordering: cli.ignore_ordering,
        full_rip_scale: cli.full_rip_scale,
    };

    let base_sim = match ingest_file(&cli.base, &opts, cli.workers.max(1)) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("failed to ingest {}: {e}", cli.base.display());
            return ExitCode::FAILURE;
        }
    };

    let (expected_loss, sd) = base_sim.expected_and_sd(cli.include_rip);

    let allocated_tvar = match &cli.contributor {
        None => None,
        Some(path) => {
            let contrib_sim = match ingest_file(path, &opts, cli.workers.max(1)) {
                Ok(sim) => sim,
                Err(e) => {
                    log::error!("failed to ingest {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            };
            let mut base_series = LossSeries::from_simulation(&base_sim, cli.include_rip);
            let contrib_series = LossSeries::from_simulation(&contrib_sim, cli.include_rip);
            Some(base_series.allocated_tvar(&contrib_series, &cli.probs, cli.remove_mean))
        }
    };

    let summary = Summary { count_events: base_sim.count_events(), expected_loss, sd, allocated_tvar };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary).expect("serialize summary")),
        OutputFormat::Text => {
            println!("events: {}", summary.count_events);
            println!("expected_loss: {:.6}", summary.expected_loss);
            println!("sd: {:.6}", summary.sd);
            if let Some(tvar) = summary.allocated_tvar {
                println!("allocated_tvar: {tvar:.6}");
            }
        }
    }

    ExitCode::SUCCESS
}
