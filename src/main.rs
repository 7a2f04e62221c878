use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use datachat_ingest::config::IngestConfig;
use datachat_ingest::ids::DatasetId;
use datachat_ingest::ingestion::sniff::sniff_with;
use datachat_ingest::ingestion::{IngestionOptions, Ingestor, TracingObserver, upload_extension};
use datachat_ingest::logging::init_logging;
use datachat_ingest::session::{self, DatasetContext};
use datachat_ingest::{IngestionError, IngestionResult};

#[derive(Parser, Debug)]
#[command(name = "dsingest", version, about = "Ingest delimited-text datasets for chat analysis")]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true, env = "DSINGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Data root (overrides `data_dir` from the config file).
    #[arg(long, global = true, env = "DSINGEST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `datachat_ingest=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a file, sniff it, sample it and write its metadata.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        sample_rows: Option<usize>,
    },
    /// Print sniffed encoding/delimiter without storing anything.
    Sniff { file: PathBuf },
    /// Print the context of a stored dataset.
    Show { id: String },
    /// Print the context of the most recently ingested dataset.
    Latest,
    /// Delete every stored dataset.
    Reset {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_level.as_deref(), cli.no_color) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "dsingest failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> IngestionResult<IngestConfig> {
    let mut cfg = match &cli.config {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        cfg.data_dir = dir.clone();
    }
    Ok(cfg)
}

fn print_json(value: &impl serde::Serialize) -> IngestionResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    let preview_rows = config.preview_rows;
    let ingestor = Ingestor::new(config)?;

    match cli.command {
        Command::Ingest { file, sample_rows } => {
            let options = IngestionOptions {
                sample_rows,
                observer: Some(Arc::new(TracingObserver)),
                ..Default::default()
            };
            let ds = ingestor.ingest_file(&file, &options)?;
            print_json(&DatasetContext::from_ingested(&ds, preview_rows))?;
        }
        Command::Sniff { file } => {
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let report = sniff_with(&file, &upload_extension(&name), &ingestor.config().sniff_options())?;
            print_json(&json!({
                "sniff": report.result,
                "encoding_detection": report.encoding,
                "delimiter_detection": report.delimiter,
            }))?;
        }
        Command::Show { id } => {
            let id = DatasetId::parse(&id).ok_or_else(|| IngestionError::Storage {
                message: format!("invalid dataset id {id:?}"),
            })?;
            match session::restore(&ingestor, &id)? {
                Some(ctx) => print_json(&ctx)?,
                None => return Err(format!("dataset {id} not found").into()),
            }
        }
        Command::Latest => match session::restore_latest(&ingestor)? {
            Some(ctx) => print_json(&ctx)?,
            None => return Err("no datasets ingested yet".into()),
        },
        Command::Reset { yes } => {
            if !yes {
                return Err("refusing to delete all datasets without --yes".into());
            }
            ingestor.reset()?;
            print_json(&json!({ "success": true }))?;
        }
    }
    Ok(())
}
