use clap::Parser;
use radiant_core::{ChatService, RadiantConfig, TurnStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use radiant_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "radiant.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env / keys.env if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();
    dotenvy::from_filename("keys.env").ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config; a missing credential stops the process here
    let config = match RadiantConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Open the turn store
    let db_path = config.storage.db_path();
    let store = match TurnStore::open(&db_path).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open chat history at {}: {}", db_path.display(), e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.ping().await {
            Ok(v) => println!("✅ SQLite {} at {}", v, db_path.display()),
            Err(e) => {
                println!("❌ Chat history check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Radiant health check passed");
        return Ok(());
    }

    let chat = ChatService::from_config(&config, store)?;
    let state = HttpState::new(chat)?.with_body_limit(config.server.max_body_bytes);

    tracing::info!(
        text_candidates = ?config.model.text_candidates,
        vision_candidates = ?config.model.vision_candidates,
        vision_enabled = config.model.vision_enabled,
        timeout_seconds = config.model.timeout_seconds,
        max_body_bytes = config.server.max_body_bytes,
        "Model invoker configured"
    );

    let (tx, rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            // keep the sender alive so the server is not shut down
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
        let _ = tx.send(());
    });

    http::start_http_server(state, &config.server, rx).await?;

    Ok(())
}
