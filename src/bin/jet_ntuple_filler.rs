use std::cmp::max;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::Level;

use jetntuple::config::FillerConfig;
use jetntuple::filler::JetNtupleFiller;
use jetntuple::output::ParquetSink;

/// Fill JRA ntuples from nanoAOD-style Parquet files.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML run configuration.
    config: Utf8PathBuf,

    /// Log level. `debug = true` in the configuration raises it to at least `debug`.
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Event ceiling, overriding `input.max_events`. `0` or less: no ceiling.
    #[arg(long, allow_negative_numbers = true)]
    max_events: Option<i64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = FillerConfig::from_path(&cli.config)
        .with_context(|| format!("invalid configuration '{}'", cli.config))?;
    if let Some(max_events) = cli.max_events {
        config.input.max_events = max_events;
    }

    // More verbose levels compare greater
    let log_level = if config.debug {
        max(cli.log_level, Level::DEBUG)
    } else {
        cli.log_level
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let filler = JetNtupleFiller::from_config(&config)?;
    let mut sink = ParquetSink::create(config.output.file.clone(), config.output.collection.clone())
        .with_context(|| format!("unable to create output '{}'", config.output.file))?
        .with_rows_per_group(config.output.rows_per_group)
        .with_schema(filler.row_builder().arrow_schema());

    filler.run(config.partition_source(), &mut sink)?;
    Ok(())
}
