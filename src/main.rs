mod db;
mod document;
mod error;
mod injector;
mod parser;
mod settings;
mod source;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use db::{DocumentStore, MemoryStore, SqliteStore};
use injector::Injector;
use settings::RunConfig;
use source::{FsModelSource, MODEL_FILE_PATTERN};

#[derive(Parser)]
#[command(
    name = "model_injector",
    about = "Push *_model.json data into the document store"
)]
struct Cli {
    /// Domain id; shared data lands under project-<domain-id>
    #[arg(long)]
    domain_id: String,
    /// Parse and map files but do not write anything
    #[arg(long)]
    dry_run: bool,
    /// Directory scanned for model files
    #[arg(long, default_value = "app")]
    app_dir: PathBuf,
    /// SQLite store path (default: data/<project-id>.sqlite)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Print every planned document in dry-run mode
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    println!("{}", "=".repeat(60));
    println!("Model Injector");
    println!("{}", "=".repeat(60));

    let settings = settings::load()?;
    let project_id = settings.project_id()?.to_string();
    let config = RunConfig {
        domain_id: cli.domain_id.clone(),
        project_id,
        actor_id: settings.actor_id(cli.dry_run),
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };

    println!("Project:           {}", config.project_id);
    println!("Domain ID:         {}", config.domain_id);
    println!("Target collection: {}", config.root_collection());
    if config.dry_run {
        println!("[DRY RUN] No data will be written");
    }

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| settings.db_path(&config.project_id));
    let mut store: Box<dyn DocumentStore> = match (config.dry_run, db_path.exists()) {
        (true, false) => Box::new(MemoryStore::default()),
        (true, true) => {
            println!("Store (read-only): {:?}", db_path);
            Box::new(SqliteStore::open_read_only(&db_path)?)
        }
        (false, _) => {
            println!("Store:             {:?}", db_path);
            Box::new(SqliteStore::open(&db_path)?)
        }
    };

    let source = FsModelSource::new(&cli.app_dir);
    let summary = Injector::new(&config, store.as_mut())
        .run(&source)
        .with_context(|| format!("Failed to scan {:?}", source.root()))?;

    if summary.files == 0 {
        println!("\nNo model files found matching pattern: {}", MODEL_FILE_PATTERN);
        return Ok(ExitCode::SUCCESS);
    }

    summary.print();

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
