#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the species map pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use species_map_cli_utils::{IndicatifProgress, MultiProgress, init_logger};
use species_map_occurrence_models::ThreatStatus;
use species_map_pipeline::{
    Collaborators, Pipeline, PipelineConfig, PipelineError, PipelineResult,
};
use strum::IntoEnumIterator;

#[derive(Parser)]
#[command(
    name = "species_map_cli",
    about = "Threatened species occurrences within an administrative boundary"
)]
struct Cli {
    /// TOML file overriding the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Only log warnings and errors, and hide the progress spinner
    #[arg(long, short, global = true)]
    quiet: bool,
    /// Skip the persistent boundary cache for this invocation
    #[arg(long, global = true)]
    no_cache: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage and write the enriched dataset (default)
    Run,
    /// Print the path of a usable dataset, running the pipeline only when
    /// there is none yet. A failed run falls back to the previous dataset.
    Ensure {
        /// Run even if a dataset already exists
        #[arg(long)]
        force: bool,
    },
    /// Resolve the configured place and print its boundary
    Boundary,
    /// List IUCN Red List categories and the ones queried by default
    Statuses,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = init_logger(if cli.quiet { "warn" } else { "info" });

    let command = cli.command.as_ref().unwrap_or(&Commands::Run);
    let spinner = (command.fetches_occurrences() && !cli.quiet).then_some(&multi);

    match command {
        Commands::Run => {
            let result = build_pipeline(&cli, spinner)?.run().await?;
            print_summary(&result);
        }
        Commands::Ensure { force } => {
            let path = build_pipeline(&cli, spinner)?
                .ensure_dataset(*force)
                .await?;
            println!("{}", path.display());
        }
        Commands::Boundary => {
            let pipeline = build_pipeline(&cli, spinner)?;
            let summary = pipeline.resolve_boundary().await?;
            println!("{}", pipeline.config().boundary.query);
            println!(
                "Bounding box:  {}",
                format_bounding_box(summary.boundary.bounding_box.as_tuple())
            );
            println!("Geometry type: {}", summary.boundary.geometry.geometry_type());
            println!("Geometry WKT:  {}", summary.geometry_wkt);
            println!("Bbox WKT:      {}", summary.bbox_wkt);
        }
        Commands::Statuses => print_statuses(),
    }

    Ok(())
}

impl Commands {
    /// Whether the command may page through occurrence search.
    const fn fetches_occurrences(&self) -> bool {
        matches!(self, Self::Run | Self::Ensure { .. })
    }
}

/// Builds the pipeline, drawing a fetch spinner on `spinner` if given.
fn build_pipeline(cli: &Cli, spinner: Option<&MultiProgress>) -> Result<Pipeline, PipelineError> {
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let progress = spinner.map_or_else(IndicatifProgress::hidden, |multi| {
        IndicatifProgress::records_bar(multi, "Fetching occurrences")
    });
    let collaborators = Collaborators::live(&config, !cli.no_cache)?.with_progress(progress);
    Ok(Pipeline::new(config, collaborators))
}

fn print_statuses() {
    println!("{:<6} {:<24} DEFAULT", "CODE", "CATEGORY");
    println!("{}", "-".repeat(40));
    for status in ThreatStatus::iter() {
        let default = if ThreatStatus::DEFAULT.contains(&status) {
            "yes"
        } else {
            ""
        };
        println!("{:<6} {:<24} {default}", status.as_ref(), status.label());
    }
}

fn print_summary(result: &PipelineResult) {
    println!(
        "Bounding box (south, north, west, east): {}",
        format_bounding_box(result.bounding_box.as_tuple())
    );
    println!("Geometry type: {}", result.geometry_type);
    println!("Geometry WKT:  {}", result.geometry_wkt);
    println!("Bbox WKT:      {}", result.bbox_wkt);
    println!("Occurrences:   {}", result.occurrences_total);
    println!("With status:   {}", result.with_status_count);
    if let Some(path) = &result.output_path {
        println!("Wrote {} rows to {}", result.table.len(), path.display());
    }
}

fn format_bounding_box((south, north, west, east): (f64, f64, f64, f64)) -> String {
    format!("({south:.6}, {north:.6}, {west:.6}, {east:.6})")
}
