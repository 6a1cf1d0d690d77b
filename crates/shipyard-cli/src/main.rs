//! shipyard - ローカルの入口
//!
//! - `validate`: ソース（ファイル or ディレクトリ）を検証
//! - `render`: app の望ましいリソース集合を JSON で出力
//! - `simulate`: インメモリのクラスタで create → update → rollback → delete を実行

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard_core::app::{Lifecycle, LifecycleBuilder};
use shipyard_core::config::PlatformConfig;
use shipyard_core::domain::{App, AppChanges, AppContent, AppSpec, Framework, OwnerId, has_unpublished_changes};
use shipyard_core::impls::{InMemoryAppStore, InMemoryCluster, StaticConnectionStrings};
use shipyard_core::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use shipyard_core::reconcile::ResourceBuilder;
use shipyard_core::validator::{AllowedImports, SINGLE_FILE_NAME, ValidationResult, validate_content};

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(about = "Validate, render and simulate tenant app deployments", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SHIPYARD_CONFIG", global = true)]
    config: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "SHIPYARD_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SHIPYARD_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// A single .py file, or a directory of .py files
    path: PathBuf,

    /// Entrypoint file name for directory sources
    #[arg(long, default_value = SINGLE_FILE_NAME)]
    entrypoint: String,

    #[arg(long, value_enum)]
    framework: Option<FrameworkArg>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate source without touching a cluster
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the desired resource set for the source
    Render {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Run a full lifecycle against the in-memory cluster
    Simulate {
        #[command(flatten)]
        source: SourceArgs,

        /// Source deployed as an update, then rolled back
        #[arg(long)]
        update: Option<PathBuf>,

        #[arg(long, default_value = "local")]
        owner: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FrameworkArg {
    Fastapi,
    Fasthtml,
    Flask,
}

impl From<FrameworkArg> for Framework {
    fn from(arg: FrameworkArg) -> Self {
        match arg {
            FrameworkArg::Fastapi => Framework::FastApi,
            FrameworkArg::Fasthtml => Framework::FastHtml,
            FrameworkArg::Flask => Framework::Flask,
        }
    }
}

/// Step summary printed by `simulate`.
#[derive(Serialize)]
struct StepReport<'a> {
    step: &'a str,
    app_id: String,
    status: String,
    content_hash: String,
    history: usize,
    unpublished_changes: bool,
    deployment_url: Option<String>,
}

impl<'a> StepReport<'a> {
    fn new(step: &'a str, app: &App) -> Self {
        Self {
            step,
            app_id: app.app_id.to_string(),
            status: app.status.to_string(),
            content_hash: app.content_hash(),
            history: app.version_history.len(),
            unpublished_changes: has_unpublished_changes(app),
            deployment_url: app.deployment_url.clone(),
        }
    }
}

fn init_tracing(cli: &Cli, config: &PlatformConfig) {
    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// ファイルなら single、ディレクトリなら直下の *.py を multi として読む
fn load_content(path: &Path, entrypoint: &str) -> Result<AppContent> {
    if path.is_file() {
        let code = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        return Ok(AppContent::Single { code });
    }

    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(path).with_context(|| format!("reading directory {}", path.display()))? {
        let entry = entry?;
        let file_path = entry.path();
        if !file_path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let source =
            std::fs::read_to_string(&file_path).with_context(|| format!("reading {}", file_path.display()))?;
        files.insert(name, source);
    }
    if files.is_empty() {
        bail!("{} contains no files", path.display());
    }
    Ok(AppContent::Multi {
        files,
        entrypoint: entrypoint.to_string(),
    })
}

fn spec_for(owner: &str, content: AppContent, framework: Option<Framework>) -> AppSpec {
    let owner_id = OwnerId::new(owner);
    let mut spec = match content {
        AppContent::Single { code } => AppSpec::single(owner_id, code),
        AppContent::Multi { files, entrypoint } => {
            AppSpec::multi(owner_id, files, entrypoint, framework.unwrap_or(Framework::FastApi))
        }
    };
    if framework.is_some() {
        spec.framework = framework;
    }
    spec
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_validate(source: &SourceArgs, config: &PlatformConfig) -> Result<bool> {
    let content = load_content(&source.path, &source.entrypoint)?;
    let result: ValidationResult = validate_content(&content, &AllowedImports::default(), &config.limits).into();
    print_json(&result)?;
    Ok(result.ok)
}

fn run_render(source: &SourceArgs, owner: &str, config: &PlatformConfig) -> Result<()> {
    let content = load_content(&source.path, &source.entrypoint)?;
    validate_content(&content, &AllowedImports::default(), &config.limits)
        .map_err(|failure| anyhow::anyhow!("validation failed: {failure}"))?;

    let spec = spec_for(owner, content.clone(), source.framework.map(Into::into));
    let clock = SystemClock;
    let app = App::new(
        UlidGenerator::new(SystemClock).generate_app_id(),
        spec.owner_id,
        "rendered".to_string(),
        content,
        spec.framework,
        spec.env_vars,
        spec.database_id,
        clock.now(),
    );
    let desired = ResourceBuilder::new(config).build(&app, "postgres://local/placeholder".to_string());
    print_json(&desired.in_apply_order())
}

async fn simulator(config: PlatformConfig, owner: &OwnerId) -> Result<(Lifecycle, Arc<InMemoryCluster>)> {
    let cluster = Arc::new(InMemoryCluster::new());
    let lifecycle = LifecycleBuilder::new(config)
        .store(Arc::new(InMemoryAppStore::new()))
        .credentials(Arc::new(
            StaticConnectionStrings::new().with_default(owner, "postgres://local/simulated"),
        ))
        .cluster(cluster.clone())
        .build()
        .await?;
    Ok((lifecycle, cluster))
}

async fn run_simulate(source: &SourceArgs, update: Option<&Path>, owner: &str, config: PlatformConfig) -> Result<()> {
    let content = load_content(&source.path, &source.entrypoint)?;
    let spec = spec_for(owner, content, source.framework.map(Into::into));
    let (lifecycle, cluster) = simulator(config, &spec.owner_id).await?;

    let app = lifecycle.create(spec).await?;
    print_json(&StepReport::new("create", &app))?;

    if let Some(update) = update {
        let changes = match load_content(update, &source.entrypoint)? {
            AppContent::Single { code } => AppChanges::code(code),
            AppContent::Multi { files, .. } => AppChanges::files(files),
        };
        let updated = lifecycle.update(&app.app_id, changes).await?;
        print_json(&StepReport::new("update", &updated))?;
        print_json(&lifecycle.versions(&app.app_id).await?)?;

        let rolled = lifecycle.rollback(&app.app_id, 0).await?;
        print_json(&StepReport::new("rollback", &rolled))?;
    }

    print_json(&lifecycle.get_status(&app.app_id).await?)?;

    let report = lifecycle.delete(&app.app_id).await?;
    let deleted = lifecycle.get(&app.app_id).await?;
    print_json(&StepReport::new("delete", &deleted))?;
    info!(
        clean = report.is_clean(),
        cluster_calls = cluster.calls().await.len(),
        "simulation finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PlatformConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&cli, &config);

    match &cli.command {
        Command::Validate { source } => {
            if !run_validate(source, &config)? {
                std::process::exit(1);
            }
        }
        Command::Render { source, owner } => run_render(source, owner, &config)?,
        Command::Simulate { source, update, owner } => {
            run_simulate(source, update.as_deref(), owner, config.clone()).await?
        }
    }
    Ok(())
}
