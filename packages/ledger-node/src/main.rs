//! Exit Ledger Node
//!
//! Runs one bridge ledger, either as the aggregator authority (mainnet) or
//! as a replica (rollup), and serves it over HTTP.
//!
//! # Roles
//!
//! - The authority publishes its local exit root into the global exit root
//!   after deposits, and polls its rollup peers for their published roots.
//! - A replica follows the authority's event journal to learn global exit
//!   roots, then accepts claims proven against them.

use std::sync::Arc;

use ledger_node::config::{redact_url, Config};
use ledger_node::node::Node;
use ledger_node::server;
use ledger_node::sync::{run_root_updater, PeerSync};
use tokio::sync::mpsc;
use tracing::{error, info};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting Exit Ledger Node");

    let config = Config::load()?;
    info!(
        network_id = config.network_id,
        mainnet_network_id = config.mainnet_network_id,
        aggregator_authority = config.aggregator_authority,
        peer = ?config.peer_url.as_deref().map(redact_url),
        rollup_peers = config.rollup_peers.len(),
        "Configuration loaded"
    );

    let node = Arc::new(Node::new(config)?);

    // One receiver per task
    let (server_tx, mut server_rx) = mpsc::channel::<()>(1);
    let (sync_tx, sync_rx) = mpsc::channel::<()>(1);
    let (updater_tx, updater_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = server_tx.send(()).await;
        let _ = sync_tx.send(()).await;
        let _ = updater_tx.send(()).await;
    });

    let server_node = node.clone();
    let server_handle = tokio::spawn(async move {
        let bind = server_node.config.api_bind_address.clone();
        let port = server_node.config.api_port;
        server::start_server(&bind, port, server_node, async move {
            let _ = server_rx.recv().await;
        })
        .await
    });

    let mut sync = PeerSync::new(node.clone());
    let sync_handle = tokio::spawn(async move { sync.run(sync_rx).await });
    let updater_handle = tokio::spawn(run_root_updater(node.clone(), updater_rx));

    let (server_result, sync_result, updater_result) =
        tokio::join!(server_handle, sync_handle, updater_handle);
    for (task, result) in [
        ("server", server_result),
        ("sync", sync_result),
        ("root updater", updater_result),
    ] {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task, error = %e, "Task failed"),
            Err(e) => error!(task, error = %e, "Task panicked"),
        }
    }

    info!("Exit Ledger Node stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,exit_ledger=debug,ledger_node=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
