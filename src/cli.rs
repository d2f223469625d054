//! Command-line interface for the `pokespider` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::{load_settings, Settings};
use crate::repository::connect_store;
use crate::spider::{HttpClient, Ingestor};

#[derive(Parser, Debug)]
#[command(name = "pokespider", version, about = "Ingest PokeAPI records into a database")]
pub struct Cli {
    /// Data directory (holds the SQLite database)
    #[arg(long, global = true, env = "POKESPIDER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Database name (SQLite filename, or PostgreSQL database with --db-host)
    #[arg(long, global = true, env = "POKESPIDER_DB_NAME")]
    pub database: Option<String>,

    /// PostgreSQL host; selects the PostgreSQL backend
    #[arg(long, global = true, env = "POKESPIDER_DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, global = true, env = "POKESPIDER_DB_PORT")]
    pub db_port: Option<u16>,

    #[arg(long, global = true, env = "POKESPIDER_DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, global = true, env = "POKESPIDER_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every ID in the range and upsert the results
    Run(RunArgs),
    /// Create the table if it does not exist
    Init,
    /// Print row counts for the table
    Summary,
    /// Print the stored row for one ID
    Show {
        id: u32,
        #[arg(long, env = "POKESPIDER_URL_TEMPLATE")]
        url_template: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// First ID (inclusive)
    #[arg(long, env = "POKESPIDER_START_ID")]
    pub start: Option<u32>,

    /// Last ID (inclusive)
    #[arg(long, env = "POKESPIDER_END_ID")]
    pub end: Option<u32>,

    /// Resource URL containing an {id} placeholder
    #[arg(long, env = "POKESPIDER_URL_TEMPLATE")]
    pub url_template: Option<String>,

    /// Pause after each ID in milliseconds
    #[arg(long, env = "POKESPIDER_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Attempts per ID on network errors
    #[arg(long, env = "POKESPIDER_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Linear backoff base in milliseconds
    #[arg(long, env = "POKESPIDER_BACKOFF_MS")]
    pub backoff_ms: Option<u64>,

    /// Request timeout in seconds
    #[arg(long, env = "POKESPIDER_TIMEOUT")]
    pub timeout: Option<u64>,

    #[arg(long, env = "POKESPIDER_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl Cli {
    /// Apply global flags on top of file-based settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref dir) = self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(ref name) = self.database {
            settings.database.name = name.clone();
        }
        if self.db_host.is_some() {
            settings.database.host = self.db_host.clone();
        }
        if let Some(port) = self.db_port {
            settings.database.port = port;
        }
        if self.db_user.is_some() {
            settings.database.user = self.db_user.clone();
        }
        if self.db_password.is_some() {
            settings.database.password = self.db_password.clone();
        }

        match &self.command {
            Commands::Run(args) => args.apply_to_settings(settings),
            Commands::Show {
                url_template: Some(template),
                ..
            } => settings.url_template = template.clone(),
            _ => {}
        }
    }
}

impl RunArgs {
    fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(start) = self.start {
            settings.start_id = start;
        }
        if let Some(end) = self.end {
            settings.end_id = end;
        }
        if let Some(ref template) = self.url_template {
            settings.url_template = template.clone();
        }
        if let Some(delay) = self.delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(backoff) = self.backoff_ms {
            settings.retry_backoff_ms = backoff;
        }
        if let Some(timeout) = self.timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ref ua) = self.user_agent {
            settings.user_agent = ua.clone();
        }
    }
}

/// Resolve settings and execute the selected command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = load_settings().await;
    cli.apply_to_settings(&mut settings);

    match cli.command {
        Commands::Run(_) => cmd_run(&settings).await,
        Commands::Init => cmd_init(&settings).await,
        Commands::Summary => cmd_summary(&settings).await,
        Commands::Show { id, .. } => cmd_show(&settings, id).await,
    }
}

async fn cmd_run(settings: &Settings) -> anyhow::Result<()> {
    // Validate everything before touching the network or the database.
    let range = settings.id_range()?;
    let template = settings.url_template()?;
    let retry = settings.retry_policy()?;
    let timeout = settings.request_timeout()?;

    let store = connect_store(settings)
        .await
        .context("Failed to open database")?;
    let client = HttpClient::with_user_agent(timeout, Some(settings.user_agent.as_str()))?;

    let ingestor = Ingestor::new(Arc::new(client), store);
    let report = ingestor
        .run(&range, &template, &retry, settings.rate_limit())
        .await
        .context("Ingestion aborted by a database error")?;

    info!(
        "Run complete: {} processed ({} stored, {} empty body, {} non-200, {} failed)",
        report.processed(),
        report.stored,
        report.empty_body,
        report.http_status,
        report.exhausted
    );
    println!("{}", report.summary);
    Ok(())
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    connect_store(settings)
        .await
        .context("Failed to initialize database")?;
    println!("Table pokeapi is ready");
    Ok(())
}

async fn cmd_summary(settings: &Settings) -> anyhow::Result<()> {
    let store = connect_store(settings)
        .await
        .context("Failed to open database")?;
    println!("{}", store.summary().await?);
    Ok(())
}

async fn cmd_show(settings: &Settings, id: u32) -> anyhow::Result<()> {
    let url = settings.url_template()?.render(id);
    let store = connect_store(settings)
        .await
        .context("Failed to open database")?;

    match store.find_by_url(&url).await? {
        Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
        None => println!("No row stored for {}", url),
    }
    Ok(())
}
