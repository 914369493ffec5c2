use anyhow::Result;
use botdash::{
    ConnectionManager,
    auth::AuthSession,
    channel::{WsChannel, create_signal_channel},
    cli::Args,
    collaborators::{Collaborators, DataFetcher, Notifier, Renderer},
    config::Config,
    console::{Console, ConsoleExit, spawn_stdin_reader},
    events::create_event_channel,
    fetcher::SnapshotFetcher,
    monitoring::{health_json, setup_metrics},
    tracing_setup::setup_tracing,
    ui::{TerminalNotifier, TerminalRenderer, UiController, UiOptions},
};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs)?;
    info!("Starting botdash v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(&args)?;

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
    }

    let options = UiOptions {
        format: config.display.format,
        colored: config.display.colored,
        quiet: config.display.quiet,
    };
    let renderer: Arc<dyn Renderer> = Arc::new(TerminalRenderer::new(options));
    let notifier: Arc<dyn Notifier> = Arc::new(TerminalNotifier::new(options));

    let auth = Arc::new(AuthSession::new(
        config.server.clone(),
        config.auth.login_url.clone(),
        config.auth.credentials.clone(),
    )?);
    if auth.requires_login() {
        info!("Dashboard login enabled via {}", config.auth.login_url);
    }

    let fetcher = Arc::new(SnapshotFetcher::new(
        config.refresh.snapshot_url.clone(),
        config.session,
        auth.clone(),
        Some(renderer.clone()),
        Some(notifier.clone()),
    ));

    let (signal_tx, signal_rx) = create_signal_channel();
    let (event_tx, event_rx) = create_event_channel();

    let channel = Arc::new(
        WsChannel::new(
            config.realtime.url.clone(),
            config.realtime.connect_timeout,
            signal_tx,
        )
        .with_auth(auth),
    );

    let collaborators = Collaborators::new()
        .with_renderer(renderer)
        .with_notifier(notifier)
        .with_fetcher(fetcher.clone());

    let manager = Arc::new(ConnectionManager::new(
        config.realtime.clone(),
        channel,
        collaborators,
        config.refresh.settle_delay,
        event_tx,
    ));

    let mut ui = UiController::new(event_rx, manager.clone(), config.session, options);
    let ui_task = tokio::spawn(async move { ui.run().await });

    // The poller pulls immediately; without it, load the first snapshot once.
    match config.refresh.interval {
        Some(interval) => fetcher.start_auto_refresh(interval),
        None => fetcher.refresh(),
    }

    manager.initialize().await;
    let started = chrono::Utc::now();

    let console = Console::new(manager.clone(), Some(fetcher.clone()));

    info!("Dashboard running. Type 'help' for commands, Ctrl+C to exit...");
    tokio::select! {
        _ = manager.run(signal_rx) => {}
        _ = run_console(&console) => {
            info!("Shutdown requested from the console");
        }
        _ = reconnect_on_hangup(&manager) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    manager.disconnect().await;
    fetcher.stop_auto_refresh();
    ui_task.abort();

    let health = health_json(
        &manager.connection_stats().await,
        chrono::Utc::now() - started,
    );
    info!("Final status: {}", health);

    Ok(())
}

/// Completes only on `quit`. Without console input (stdin closed) the
/// dashboard keeps running until Ctrl+C.
async fn run_console(console: &Console) {
    if console.run(spawn_stdin_reader()).await == ConsoleExit::InputClosed {
        debug!("No console input; commands disabled");
        std::future::pending::<()>().await;
    }
}

/// SIGHUP resets the attempt count and reopens the realtime channel.
async fn reconnect_on_hangup(manager: &ConnectionManager) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::hangup()) {
            Ok(mut hangup) => {
                while hangup.recv().await.is_some() {
                    info!("Received SIGHUP; reconnecting");
                    manager.reconnect().await;
                }
            }
            Err(e) => warn!("Failed to install SIGHUP handler: {}", e),
        }
    }

    std::future::pending::<()>().await;
}
