mod calc;
mod db;
mod error;
mod ipc;
mod records;
mod seed;
mod skills;
mod store;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scorecardd")]
#[command(about = "Assessment scoring sidecar: JSON-lines IPC over stdin/stdout", long_about = None)]
struct Cli {
    /// Log filter directive, e.g. `info` or `scorecardd=debug`
    #[arg(long, global = true, env = "SCORECARD_LOG", default_value = "info")]
    log: String,

    /// Workspace directory holding scorecard.sqlite3
    #[arg(long, global = true, env = "SCORECARD_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-lines requests on stdin (default)
    Serve,
    /// Import a skills document into a workspace
    Seed {
        #[arg(long)]
        skills: PathBuf,
        /// Import into memory and print the summary without touching a workspace
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_logging(filter: &str) {
    // stdout carries the protocol.
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            serve(cli.workspace.as_deref());
            Ok(())
        }
        Commands::Seed { skills, dry_run } => run_seed(&skills, cli.workspace.as_deref(), dry_run),
    }
}

fn run_seed(skills_path: &Path, workspace: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let summary = if dry_run {
        let loaded = skills::load_skills_document(skills_path)?;
        let mut store = store::memory::MemoryStore::default();
        seed::run_import(&mut store, &loaded.document)
            .with_context(|| format!("importing {}", skills_path.display()))?
    } else {
        let workspace = workspace.context("--workspace is required unless --dry-run is set")?;
        let conn = db::open_db(workspace)
            .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
        let outcome = seed::import_skills_file(&conn, skills_path)?;
        info!(run = %outcome.run_id, sha256 = %outcome.sha256, "import run recorded");
        outcome.summary
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn serve(workspace: Option<&Path>) {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = workspace {
        match db::open_db(path) {
            Ok(conn) => {
                info!(workspace = %path.display(), "workspace opened");
                state.workspace = Some(path.to_path_buf());
                state.db = Some(conn);
            }
            Err(e) => warn!(workspace = %path.display(), error = %e, "could not open workspace"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
