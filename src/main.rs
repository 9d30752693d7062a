use bulletind::ipc;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bulletind")]
#[command(about = "Grade report sidecar speaking line-delimited JSON on stdio", version)]
struct Args {
    /// Workspace directory to open at startup
    #[arg(long, value_name = "DIR", env = "BULLETIND_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Log filter directives; RUST_LOG is used when unset
    #[arg(long, env = "BULLETIND_LOG")]
    log: Option<String>,
}

fn main() {
    let args = Args::parse();

    // stdout carries responses, so logs go to stderr.
    let env_filter = match args.log.as_deref() {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("bulletind=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let mut state = ipc::AppState::default();
    if let Some(path) = &args.workspace {
        if let Err(e) = state.open_workspace(path) {
            tracing::error!(workspace = %path.display(), error = %e, "startup workspace open failed");
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

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                ipc::bad_json(e.to_string())
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
