use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use saim_assistant::{
    ChartGenerator, FieldValidator, HttpValidator, RemoteChartGenerator, RuleBasedValidator,
    TemplateChartGenerator,
};
use saim_categorize::StatementProfile;
use saim_core::CompanyId;
use saim_session::{Session, SessionSettings};
use saim_storage::{CompanyRepository, KeyValueStore, MemoryStore, SqliteStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod repl;

use config::SaimConfig;

/// S(ai)m Jr: chat-driven bank statement categorization.
#[derive(Parser, Debug)]
#[command(name = "saim", version, about)]
struct Cli {
    /// Config file. Defaults to config.toml in the platform config directory.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Company to open. Defaults to the most recently updated one.
    #[arg(long)]
    company: Option<String>,

    /// Keep everything in memory for this session only.
    #[arg(long)]
    memory: bool,

    /// Start the company setup interview even if a company exists.
    #[arg(long, conflicts_with = "company")]
    new: bool,

    /// strftime format for statement dates that are not ISO.
    #[arg(long, default_value = "%Y-%m-%d")]
    date_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dirs = ProjectDirs::from("com", "saimjr", "SaimJr");
    let config = SaimConfig::load(cli.config.as_deref(), dirs.as_ref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store: Box<dyn KeyValueStore> = if cli.memory {
        tracing::info!("using in-memory storage");
        Box::new(MemoryStore::new())
    } else {
        let db_path = config.database_path(dirs.as_ref())?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }
        tracing::info!(path = %db_path.display(), "opening database");
        Box::new(
            SqliteStore::open(&db_path)
                .await
                .with_context(|| format!("Failed to open database {}", db_path.display()))?,
        )
    };
    let repo = CompanyRepository::new(store);

    let company = match (cli.company, cli.new) {
        (Some(id), _) => Some(CompanyId(id)),
        (None, true) => None,
        (None, false) => most_recent_company(&repo, &config.user_id).await?,
    };

    let validator: Box<dyn FieldValidator> = match &config.validation.endpoint {
        Some(endpoint) => {
            tracing::info!(%endpoint, "using remote validator");
            Box::new(HttpValidator::new(endpoint, config.validation.policy()))
        }
        None => Box::new(RuleBasedValidator::new()),
    };
    let charts: Box<dyn ChartGenerator> = match &config.chart.endpoint {
        Some(endpoint) => {
            tracing::info!(%endpoint, "using remote chart generator");
            Box::new(RemoteChartGenerator::new(endpoint, config.validation.policy()))
        }
        None => Box::new(TemplateChartGenerator::new()),
    };

    let settings = SessionSettings {
        user_id: config.user_id.clone(),
        validation_timeout: config.validation.timeout(),
        categorizer: config.categorizer(),
    };
    let mut session = Session::new(repo, validator, charts, settings);

    let mut statement_format = StatementProfile::default();
    statement_format.mapping.date_format = cli.date_format;

    let mut stdout = std::io::stdout();
    let greeting = session.open(company.as_ref()).await;
    repl::render(&mut stdout, &greeting)?;
    println!("(Type /help for commands.)");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl::run(&mut session, &statement_format, stdin, &mut stdout).await?;
    tracing::info!("session closed");
    Ok(())
}

async fn most_recent_company<S: KeyValueStore>(
    repo: &CompanyRepository<S>,
    user_id: &str,
) -> anyhow::Result<Option<CompanyId>> {
    let companies = repo
        .companies_for_user(user_id)
        .await
        .context("Failed to list companies")?;
    Ok(companies
        .into_iter()
        .max_by_key(|p| p.updated_at)
        .map(|p| p.id))
}
