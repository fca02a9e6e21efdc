//! switchwatch: watch a GPIO switch, announce changes on Slack, and answer
//! `/status` and `/optin` over HTTP.
//!
//! # Startup
//!
//! ```text
//! load config -> open log store -> tracing -> configure pin -> Slack client
//!             -> bind listener -> spawn tasks -> wait for signal
//! ```
//!
//! Any failure before the tasks start is fatal and exits non-zero.
//!
//! # Tasks
//!
//! | Task | Stops on |
//! |------|----------|
//! | edge monitor | cancellation |
//! | notification dispatcher | cancellation, or the monitor dropping its queue |
//! | log compactor | cancellation |
//! | HTTP server | cancellation |

mod supervisor;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use switchwatch_api::ApiState;
use switchwatch_config::SwitchwatchConfig;
use switchwatch_core::{
    DISPATCH_QUEUE_CAPACITY, EdgeMonitor, InputPin, LogTimestamp, PinConfig, RetentionSink,
    RetentionStore, StateRegistry, SysfsPin, dispatch_queue, file_filter, run_compactor,
    run_dispatcher,
};
use switchwatch_providers::{Notifier, SlackNotifier};

use crate::supervisor::{Supervisor, wait_for_shutdown_signal};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing(store: Arc<RetentionStore>, stderr: bool) {
    // Each layer gets its own filter; the file one never drops switch transitions.
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(LogTimestamp)
        .with_writer(RetentionSink::new(store))
        .with_filter(file_filter(env_filter()));

    let stderr_layer = stderr.then(|| {
        fmt::layer()
            .with_timer(LogTimestamp)
            .with_writer(io::stderr)
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = SwitchwatchConfig::load().context("failed to load configuration")?;

    let log_path = config.log.file_path();
    let store = Arc::new(
        RetentionStore::open(&log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?,
    );
    init_tracing(Arc::clone(&store), config.log.stderr);
    tracing::info!(path = %log_path.display(), "Logging initialized");

    let mut pin = SysfsPin::new(&config.gpio.sysfs_root, config.gpio.pin);
    pin.configure(PinConfig::default())
        .with_context(|| format!("failed to configure {}", pin.name()))?;

    let notifier: Arc<dyn Notifier> = Arc::new(
        SlackNotifier::new(
            &config.slack.api_base,
            config.slack.token.clone(),
            config.slack.channel.clone(),
            config.slack.timeout,
        )
        .context("failed to build Slack client")?,
    );

    let listener = TcpListener::bind(config.http.listen)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.http.listen))?;

    let registry = Arc::new(StateRegistry::new());
    let api_state = Arc::new(ApiState {
        registry: Arc::clone(&registry),
        verification_token: config.slack.verification_token.clone(),
    });
    let (queue, rx) = dispatch_queue(DISPATCH_QUEUE_CAPACITY);

    let mut supervisor = Supervisor::new(CancellationToken::new());
    supervisor.spawn(
        "edge monitor",
        EdgeMonitor::new(pin, registry).run(config.monitor.poll_interval, queue, supervisor.token()),
    );
    supervisor.spawn(
        "notification dispatcher",
        run_dispatcher(notifier, rx, supervisor.token()),
    );
    supervisor.spawn(
        "log compactor",
        run_compactor(
            Arc::clone(&store),
            config.log.compaction_interval,
            config.log.retention,
            supervisor.token(),
        ),
    );
    supervisor.spawn(
        "HTTP server",
        switchwatch_api::serve(listener, api_state, supervisor.token()),
    );

    tracing::info!(
        channel = %config.slack.channel,
        listen = %config.http.listen,
        "switchwatch started"
    );

    let result = supervisor.run(wait_for_shutdown_signal()).await;
    match &result {
        Ok(()) => tracing::info!("switchwatch stopped"),
        Err(e) => tracing::error!(error = %e, "switchwatch stopped with an error"),
    }
    result
}
