use anyhow::{bail, Result};
use atus_etl::{
    config::{
        DbConfig, ExistingDatabase, PipelineConfig, Region, YearRange, DEFAULT_BATCH_SIZE,
        ENTITY_SONORA, INEGI_ZIP_URL, MUNICIPALITY_HERMOSILLO, PROCESSED_DIR, RAW_DIR,
    },
    db::{self, prompt_stdin},
    pipeline,
};
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "atus-etl", version, about = "INEGI road-accident (ATUS) extract, tidy and load")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// URL of the open-data archive
    #[arg(long, global = true, default_value = INEGI_ZIP_URL)]
    source_url: String,

    /// Where the archive and the extracted CSVs live
    #[arg(long, global = true, default_value = RAW_DIR)]
    raw_dir: PathBuf,

    /// Where the consolidated CSV is written
    #[arg(long, global = true, default_value = PROCESSED_DIR)]
    processed_dir: PathBuf,

    #[arg(long, global = true, default_value_t = YearRange::default().min)]
    year_min: i32,

    #[arg(long, global = true, default_value_t = YearRange::default().max)]
    year_max: i32,

    /// Entity (state) code to keep
    #[arg(long, global = true, default_value_t = ENTITY_SONORA)]
    entity: i64,

    /// Municipality code, applied with --filter-municipality
    #[arg(long, global = true, default_value_t = MUNICIPALITY_HERMOSILLO)]
    municipality: i64,

    #[arg(long, global = true)]
    filter_municipality: bool,

    /// Unpack the archive before consolidating
    #[arg(long, global = true)]
    extract: bool,

    /// Rows per insert transaction
    #[arg(long, global = true, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// What to do when the target database already exists
    #[arg(long, global = true, value_enum, default_value_t = ExistingDatabase::Prompt)]
    on_existing: ExistingDatabase,

    /// Write the validation report as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Connection URL; overrides DATABASE_URL and the PG* variables
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Every stage (default)
    Run,
    /// Download, optionally extract, and consolidate
    Fetch,
    /// Transform, load and validate the consolidated CSV
    Etl,
    /// Only the post-load queries
    Validate,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        if self.year_min > self.year_max {
            bail!("--year-min {} is after --year-max {}", self.year_min, self.year_max);
        }
        if self.batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }

        let mut db = DbConfig::from_env();
        if let Some(url) = &self.database_url {
            db.url = Some(url.clone());
        }

        Ok(PipelineConfig {
            source_url: self.source_url.clone(),
            raw_dir: self.raw_dir.clone(),
            processed_dir: self.processed_dir.clone(),
            years: YearRange::new(self.year_min, self.year_max),
            region: Region {
                entity: self.entity,
                municipality: self.municipality,
                filter_municipality: self.filter_municipality,
            },
            extract: self.extract,
            batch_size: self.batch_size,
            on_existing: self.on_existing,
            db,
            report_path: self.report.clone(),
        })
    }
}

async fn dispatch(command: Command, cfg: &PipelineConfig) -> Result<()> {
    let client = Client::builder()
        .user_agent(concat!("atus-etl/", env!("CARGO_PKG_VERSION")))
        .build()?;

    match command {
        Command::Run => {
            pipeline::run(cfg, &client, prompt_stdin).await?;
        }
        Command::Fetch => {
            let summary = pipeline::fetch_stage(cfg, &client).await?;
            info!(files = summary.files.len(), output = %summary.output.display(), "fetch done");
        }
        Command::Etl => {
            pipeline::etl(cfg, prompt_stdin).await?;
        }
        Command::Validate => {
            let store = db::connect(&cfg.db).await?;
            pipeline::validate_stage(cfg, &store).await?;
            store.pool.close().await;
        }
    }
    Ok(())
}

/// Log the outcome once and map it to the process exit status.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => {
            info!("all done");
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

async fn try_main(cli: Cli) -> Result<()> {
    let cfg = cli.pipeline_config()?;
    let command = cli.command.unwrap_or(Command::Run);
    info!(?command, raw_dir = %cfg.raw_dir.display(), "startup");
    dispatch(command, &cfg).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ─── 1) env + logging ────────────────────────────────────────────
    dotenvy::dotenv().ok();
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) configuration + stages ───────────────────────────────────
    let cli = Cli::parse();
    let result = try_main(cli).await;

    // ─── 3) report ───────────────────────────────────────────────────
    ExitCode::from(exit_status(&result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() -> Result<()> {
        let cli = Cli::try_parse_from([
            "atus-etl",
            "etl",
            "--year-min",
            "2020",
            "--entity",
            "9",
            "--filter-municipality",
            "--on-existing",
            "recreate",
            "--database-url",
            "sqlite://x.db",
        ])?;
        let cfg = cli.pipeline_config()?;
        assert!(matches!(cli.command, Some(Command::Etl)));
        assert_eq!(cfg.years, YearRange::new(2020, 2024));
        assert_eq!(cfg.region.entity, 9);
        assert!(cfg.region.filter_municipality);
        assert_eq!(cfg.on_existing, ExistingDatabase::Recreate);
        assert_eq!(cfg.db.url.as_deref(), Some("sqlite://x.db"));
        Ok(())
    }

    #[test]
    fn failures_map_to_a_non_zero_status() {
        assert_eq!(exit_status(&Ok(())), 0);
        assert_eq!(exit_status(&Err(anyhow::anyhow!("no yearly files"))), 1);
    }

    #[test]
    fn inverted_year_range_is_rejected() -> Result<()> {
        let cli = Cli::try_parse_from(["atus-etl", "--year-min", "2024", "--year-max", "2018"])?;
        assert!(cli.pipeline_config().is_err());
        Ok(())
    }
}
