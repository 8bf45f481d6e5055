//! Command-line front end: run the estimation pipeline over a directory catalog.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use carbonmap::config::{ExportFormat, PipelineConfig};
use carbonmap::io::{DirectoryCatalog, ExportSink, JsonExportSink};
use carbonmap::Pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "carbonmap",
    version,
    about = "Estimate a per-pixel carbon stock surface from a scene catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and report validation accuracy
    Run {
        /// Catalog directory (boundaries.json, scenes/, landcover/, reference.json)
        #[arg(long)]
        catalog: PathBuf,

        /// JSON pipeline configuration (defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory receiving exported rasters
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
    /// Print the default configuration as JSON
    DefaultConfig,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::DefaultConfig => {
            println!("{}", PipelineConfig::default().to_json_pretty()?);
            Ok(())
        }
        Command::Run {
            catalog,
            config,
            output,
        } => run(catalog, config, output),
    }
}

fn run(catalog: PathBuf, config: Option<PathBuf>, output: PathBuf) -> Result<()> {
    let config = match config {
        Some(path) => PipelineConfig::from_file(&path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let catalog = DirectoryCatalog::open(&catalog)
        .with_context(|| format!("opening catalog {}", catalog.display()))?;

    let mut pipeline = Pipeline::from_catalog(config.clone(), Arc::new(catalog))?;
    if let Some(export) = &config.export {
        pipeline = pipeline.with_export_sink(export_sink(export.format, output)?);
    }

    let outcome = pipeline.run()?;
    println!("Region:        {}", outcome.region.name);
    println!("Features:      {}", outcome.schema);
    println!(
        "Samples:       {} ({} train / {} test)",
        outcome.sample_count, outcome.train_count, outcome.test_count
    );
    println!("Test RMSE:     {:.4}", outcome.validation.rmse);
    println!("Test MAE:      {:.4}", outcome.validation.mae);
    if let Some(reference) = &outcome.reference_validation {
        println!("Reference RMSE: {:.4} over {} pixel(s)", reference.rmse, reference.count);
    }
    for destination in &outcome.exported {
        println!("Exported:      {}", destination);
    }
    Ok(())
}

fn export_sink(format: ExportFormat, output: PathBuf) -> Result<Arc<dyn ExportSink>> {
    match format {
        ExportFormat::Json => Ok(Arc::new(JsonExportSink::new(output))),
        #[cfg(feature = "gdal")]
        ExportFormat::GeoTiff => Ok(Arc::new(carbonmap::io::GdalExportSink::new(output))),
        #[cfg(not(feature = "gdal"))]
        ExportFormat::GeoTiff => {
            anyhow::bail!("GeoTIFF export needs the `gdal` feature; set export.format to \"json\"")
        }
    }
}
