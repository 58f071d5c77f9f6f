//! StockFlow CLI: run the ETL stages against a filesystem staging store.
//!
//! Commands:
//! - `extract`: fetch raw bars per ticker into `extract/{key}/`
//! - `transform`: clean, add features, write `transform/{key}/transformed_data.csv`
//! - `load`: read a consolidated table back, preview it, optionally export Parquet
//! - `etl`: all three stages on today's key
//! - `partitions`: list staged partition keys

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking;
use tracing_subscriber::{prelude::*, EnvFilter};

use stockflow_core::data::StagingStore;
use stockflow_core::{ConsolidatedTable, PartitionKey, Phase};
use stockflow_runner::{
    build_provider, build_store, Extractor, Loader, Pipeline, PipelineConfig, ProviderKind,
    Transformer,
};

#[derive(Parser)]
#[command(
    name = "stockflow",
    about = "StockFlow: daily stock-price extract, transform and load"
)]
struct Cli {
    /// TOML config file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the staging store.
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Also append log output to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch raw bars for each ticker and stage them under one partition.
    Extract {
        /// Tickers to extract (e.g., AAPL MSFT).
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,

        /// First day requested (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Exclusive end day (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Market-data source: yahoo, csv, synthetic.
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// Directory of `{TICKER}.csv` files for the csv provider.
        #[arg(long)]
        import_dir: Option<PathBuf>,

        /// Partition key (YYYY_MM_DD). Defaults to today.
        #[arg(long)]
        date_key: Option<PartitionKey>,
    },
    /// Clean a staged partition, add features and write the consolidated table.
    Transform {
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,

        /// Partition key (YYYY_MM_DD). Defaults to today.
        #[arg(long)]
        date_key: Option<PartitionKey>,

        /// Rolling-average window in rows.
        #[arg(long)]
        roll_avg_days: Option<usize>,

        /// EMA span.
        #[arg(long)]
        ema_span: Option<usize>,
    },
    /// Read a consolidated table back and print its first rows.
    Load {
        /// Partition key (YYYY_MM_DD). Defaults to today.
        #[arg(long)]
        date_key: Option<PartitionKey>,

        /// Also export the table to this Parquet file.
        #[arg(long)]
        parquet: Option<PathBuf>,

        /// Rows to preview.
        #[arg(long, default_value_t = 5)]
        rows: usize,
    },
    /// Extract, transform and load on today's partition.
    Etl {
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long)]
        provider: Option<ProviderKind>,
    },
    /// List partition keys staged for a phase.
    Partitions {
        #[arg(long, value_enum, default_value_t = PhaseArg::Transform)]
        phase: PhaseArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    Extract,
    Transform,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Extract => Phase::Extract,
            PhaseArg::Transform => Phase::Transform,
        }
    }
}

/// Values from the command line that take precedence over the config file.
#[derive(Default)]
struct Overrides {
    base_path: Option<PathBuf>,
    tickers: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    provider: Option<ProviderKind>,
    import_dir: Option<PathBuf>,
    roll_avg_days: Option<usize>,
    ema_span: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(base_path) = self.base_path {
            config.storage.base_path = base_path;
        }
        if !self.tickers.is_empty() {
            config.extractor.tickers = self.tickers;
        }
        if let Some(start) = self.start {
            config.extractor.start_date = start;
        }
        if let Some(end) = self.end {
            config.extractor.end_date = end;
        }
        if let Some(provider) = self.provider {
            config.extractor.provider = provider;
        }
        if let Some(dir) = self.import_dir {
            config.extractor.import_dir = Some(dir);
        }
        if let Some(days) = self.roll_avg_days {
            config.transformer.roll_avg_days = days;
        }
        if let Some(span) = self.ema_span {
            config.transformer.ema_span = span;
        }
    }
}

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (writer, guard) = non_blocking(file);
        // The writer flushes on drop of the guard; keep it for the whole process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file)?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let base = Overrides {
        base_path: cli.base_path,
        ..Overrides::default()
    };

    match cli.command {
        Commands::Extract {
            tickers,
            start,
            end,
            provider,
            import_dir,
            date_key,
        } => {
            Overrides {
                tickers,
                start,
                end,
                provider,
                import_dir,
                ..base
            }
            .apply(&mut config);
            run_extract(&config, date_key)
        }
        Commands::Transform {
            tickers,
            date_key,
            roll_avg_days,
            ema_span,
        } => {
            Overrides {
                tickers,
                roll_avg_days,
                ema_span,
                ..base
            }
            .apply(&mut config);
            run_transform(&config, date_key)
        }
        Commands::Load {
            date_key,
            parquet,
            rows,
        } => {
            base.apply(&mut config);
            run_load(&config, date_key, parquet, rows)
        }
        Commands::Etl {
            tickers,
            start,
            end,
            provider,
        } => {
            Overrides {
                tickers,
                start,
                end,
                provider,
                ..base
            }
            .apply(&mut config);
            run_etl_cmd(&config)
        }
        Commands::Partitions { phase } => {
            base.apply(&mut config);
            run_partitions(&config, phase.into())
        }
    }
}


fn run_extract(config: &PipelineConfig, date_key: Option<PartitionKey>) -> Result<()> {
    config.validate()?;
    let partition = date_key.unwrap_or_else(PartitionKey::today);
    let store = build_store(config);
    let provider = build_provider(&config.extractor)?;

    let report = Extractor::new(
        &store,
        provider.as_ref(),
        config.extractor.tickers.clone(),
        config.extractor.start_date,
        config.extractor.end_date,
    )?
    .with_partition(partition)
    .extract()?;

    println!(
        "Extracted {} rows for {} tickers into partition {}",
        report.total_rows(),
        report.row_counts.len(),
        report.partition
    );
    for (ticker, rows) in &report.row_counts {
        println!("  {ticker:<8} {rows:>6}");
    }
    let empty = report.empty_tickers();
    if !empty.is_empty() {
        println!("No data for: {}", empty.join(", "));
    }
    Ok(())
}

fn run_transform(config: &PipelineConfig, date_key: Option<PartitionKey>) -> Result<()> {
    if config.extractor.tickers.is_empty() {
        bail!("no tickers given: pass --tickers or set extractor.tickers in the config");
    }
    let params = config.transform_params()?;
    let partition = date_key.unwrap_or_else(PartitionKey::today);
    let store = build_store(config);

    let table = Transformer::new(
        &store,
        config.extractor.tickers.clone(),
        partition.clone(),
        params,
    )
    .transform()?;

    println!(
        "Transformed {} rows into partition {} ({})",
        table.len(),
        partition,
        table.column_names().join(", ")
    );
    Ok(())
}

fn run_load(
    config: &PipelineConfig,
    date_key: Option<PartitionKey>,
    parquet: Option<PathBuf>,
    rows: usize,
) -> Result<()> {
    let partition = date_key.unwrap_or_else(PartitionKey::today);
    let store = build_store(config);
    let loader = Loader::new(&store, partition.clone());
    let table = loader.load()?;

    print_preview(&table, rows);
    match loader.manifest() {
        Ok(manifest) => println!("{}", serde_json::to_string_pretty(&manifest)?),
        Err(err) if err.is_not_found() => println!("No manifest for partition {partition}"),
        Err(err) => return Err(err.into()),
    }

    if let Some(path) = parquet {
        table.export_parquet(&path)?;
        info!(path = %path.display(), rows = table.len(), "exported parquet");
        println!("Parquet written to: {}", path.display());
    }
    Ok(())
}

fn run_etl_cmd(config: &PipelineConfig) -> Result<()> {
    config.validate()?;
    let store = build_store(config);
    let provider = build_provider(&config.extractor)?;
    let outcome = Pipeline::new(config, &store, provider.as_ref()).run()?;

    println!(
        "ETL finished for partition {}: {} rows extracted, {} rows consolidated",
        outcome.partition,
        outcome.extract.total_rows(),
        outcome.table.len()
    );
    print_preview(&outcome.table, 5);
    Ok(())
}

fn run_partitions(config: &PipelineConfig, phase: Phase) -> Result<()> {
    let store = build_store(config);
    let keys = store.list_partitions(phase)?;
    if keys.is_empty() {
        println!("No {} partitions under {}", phase.as_str(), config.storage.base_path.display());
        return Ok(());
    }
    for key in keys {
        let entities = store.list_entities(phase, &key)?;
        println!("{key}  ({} files)", entities.len());
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

fn print_preview(table: &ConsolidatedTable, rows: usize) {
    let params = table.params();
    println!(
        "{:<10} {:<6} {:>10} {:>10} {:>10} {:>10} {:>3}",
        "Date",
        "Ticker",
        "Close",
        "Return",
        params.roll_avg_column(),
        params.ema_column(),
        "X"
    );
    for row in table.head(rows) {
        println!(
            "{:<10} {:<6} {:>10} {:>10} {:>10} {:>10} {:>3}",
            row.date,
            row.ticker,
            fmt_opt(row.close),
            fmt_opt(row.daily_return),
            fmt_opt(row.roll_avg),
            fmt_opt(row.ema),
            row.crossover
        );
    }
    println!("({} of {} rows)", table.head(rows).len(), table.len());
}
