//! ubcar-admin - media administration service and maintenance CLI
//!
//! `serve` (the default) runs the HTTP service. The remaining subcommands seed
//! accounts, points and layers, and verify or rebuild the reverse indexes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ubcar_admin::{build_router, AppState};
use ubcar_common::api::auth::load_nonce_secret;
use ubcar_common::config::{CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig};
use ubcar_common::db::audit;
use ubcar_common::db::catalog::{create_layer, create_point};
use ubcar_common::db::init::init_database;
use ubcar_common::db::settings::RuntimeSettings;
use ubcar_common::db::users::{create_user, NewUser};

const MODULE_NAME: &str = "ubcar-admin";
const DEFAULT_LOG_FILTER: &str = "ubcar_admin=info,ubcar_common=info,tower_http=info";

/// Command-line arguments for ubcar-admin
#[derive(Parser, Debug)]
#[command(name = "ubcar-admin")]
#[command(about = "UBCAR media administration service")]
#[command(version)]
struct Args {
    /// Root folder holding ubcar.db and uploads/
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "UBCAR_PORT")]
        port: Option<u16>,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Create a user account
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        /// Grant the editor capability
        #[arg(long)]
        editor: bool,
    },
    /// Create a point
    AddPoint {
        #[arg(long)]
        title: String,
    },
    /// Create a layer, optionally password protected
    AddLayer {
        #[arg(long)]
        title: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Compare the reverse indexes with the media table
    CheckIndexes {
        /// Rebuild the reverse indexes when they are out of sync
        #[arg(long)]
        repair: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME).with_cli_arg(args.root_folder.clone());
    let toml_config = resolver.load_toml().unwrap_or_default();
    init_tracing(&toml_config)?;

    info!(
        "Starting UBCAR media admin (ubcar-admin) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let initializer = RootFolderInitializer::new(resolver.resolve());
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match args.command.unwrap_or(Command::Serve { port: None, bind: "127.0.0.1".to_string() }) {
        Command::Serve { port, bind } => serve(pool, &initializer, &toml_config, port, &bind).await,
        Command::AddUser { username, password, first_name, last_name, editor } => {
            let user = create_user(
                &pool,
                NewUser { username, password, first_name, last_name, can_edit_pages: editor },
            )
            .await
            .context("Failed to create user")?;
            println!("Created user {} ({})", user.id, user.display_name());
            Ok(())
        }
        Command::AddPoint { title } => {
            let point = create_point(&pool, &title).await.context("Failed to create point")?;
            println!("Created point {} ({})", point.id, point.title);
            Ok(())
        }
        Command::AddLayer { title, password } => {
            let layer = create_layer(&pool, &title, password.as_deref())
                .await
                .context("Failed to create layer")?;
            println!(
                "Created layer {} ({}{})",
                layer.id,
                layer.title,
                if layer.is_protected() { ", protected" } else { "" }
            );
            Ok(())
        }
        Command::CheckIndexes { repair } => check_indexes(&pool, repair).await,
    }
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.logging.level == CompiledDefaults::for_current_platform().log_level {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        } else {
            EnvFilter::new(format!(
                "ubcar_admin={level},ubcar_common={level},tower_http={level}",
                level = config.logging.level
            ))
        }
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn serve(
    pool: SqlitePool,
    initializer: &RootFolderInitializer,
    config: &TomlConfig,
    port: Option<u16>,
    bind: &str,
) -> Result<()> {
    let settings = RuntimeSettings::load(&pool)
        .await
        .context("Invalid runtime settings")?;
    let nonce_secret = load_nonce_secret(&pool)
        .await
        .context("Failed to load nonce secret")?;
    info!("✓ Loaded nonce secret");

    let state = AppState::new(pool, settings, nonce_secret, initializer.uploads_path())
        .with_public_base_url(config.public_base_url.clone());
    let app = build_router(state);

    let port = port
        .or(config.port)
        .unwrap_or(CompiledDefaults::for_current_platform().port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ubcar-admin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn check_indexes(pool: &SqlitePool, repair: bool) -> Result<()> {
    let report = if repair {
        audit::repair(pool).await?
    } else {
        audit::audit(pool).await?
    };

    if report.is_clean() {
        println!("Reverse indexes are consistent");
        return Ok(());
    }

    println!(
        "point_media: {} missing, {} stray",
        report.missing.point_media.len(),
        report.stray.point_media.len()
    );
    println!(
        "layer_media: {} missing, {} stray",
        report.missing.layer_media.len(),
        report.stray.layer_media.len()
    );
    println!(
        "layer_points: {} missing, {} stray",
        report.missing.layer_points.len(),
        report.stray.layer_points.len()
    );

    if repair {
        println!("Reverse indexes rebuilt");
        Ok(())
    } else {
        warn!("Run with --repair to rebuild the reverse indexes");
        bail!("Reverse indexes are out of sync")
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
