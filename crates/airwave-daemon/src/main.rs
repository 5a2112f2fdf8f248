mod http;
mod socket;

use std::sync::Arc;

use airwave_core::{
    ControllerOptions, FavoritesStore, JsonFileStore, MpvOutput, RadioBrowserCatalog,
    SessionController,
};
use airwave_proto::config::Config;
use airwave_proto::protocol::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Out-of-band messages pushed to socket clients alongside state snapshots.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// User-facing notice from the session controller.
    Notice(String),
    Log(String),
}

/// A custom tracing layer that forwards log messages to the broadcast channel
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Only WARN and ERROR reach clients
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is OK
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Broadcast channel first so logging can feed it
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = config.daemon.data_dir.clone();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,airwave_daemon=debug,airwave_core=debug",
                )
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);
    info!("Config loaded from: {:?}", Config::config_path());

    let output = Arc::new(MpvOutput::new());
    let catalog = Arc::new(RadioBrowserCatalog::new(&config.catalog)?);
    let favorites = FavoritesStore::load(Arc::new(JsonFileStore::new(&data_dir)));

    let controller = SessionController::new(
        output.clone(),
        catalog,
        favorites,
        ControllerOptions::from_config(&config),
    );
    let state_rx = controller.subscribe_state();

    // Controller notices join the client broadcast stream
    let mut notices = controller.subscribe_notices();
    let notice_tx = broadcast_tx.clone();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(message) => {
                    let _ = notice_tx.send(BroadcastMessage::Notice(message));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // All external inputs funnel into the controller
    let (command_tx, command_rx) = mpsc::channel::<Command>(256);

    let _socket_handle = socket::start_server(
        config.socket.bind_address.clone(),
        config.socket.port,
        state_rx.clone(),
        command_tx.clone(),
        broadcast_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_rx,
            command_tx.clone(),
        );
    }
    drop(command_tx);

    info!("Daemon initialised, running event loop");
    controller
        .run(command_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    output.close().await;
    info!("Daemon stopped");
    Ok(())
}
