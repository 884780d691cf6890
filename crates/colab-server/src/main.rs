use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use colab_realtime::HEARTBEAT_INTERVAL;
use colab_server::config::Config;
use colab_server::mailer::LogMailer;
use colab_server::{AppState, app};
use colab_store::Db;

#[derive(Parser, Debug)]
#[command(name = "colab-server", about = "CoLab project collaboration server")]
struct Args {
    /// Address to listen on.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// SQLite database path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Public origin used in emailed links.
    #[arg(long)]
    origin: Option<String>,

    /// Mark session cookies Secure (enable behind TLS).
    #[arg(long)]
    secure_cookies: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colab=info,colab_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(origin) = args.origin {
        config.origin = origin;
    }
    if args.secure_cookies {
        config.secure_cookies = true;
    }

    let db = Arc::new(
        Db::open(&config.db_path)
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    info!(db = %config.db_path.display(), "database ready");

    let listen = config.listen;
    let state = AppState::new(db, Arc::new(LogMailer), config);

    tokio::spawn(Arc::clone(&state.broadcaster).run_heartbeat(HEARTBEAT_INTERVAL));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind listener on {listen}"))?;
    info!("colab-server listening on http://{listen}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down...");
        })
        .await?;

    Ok(())
}
