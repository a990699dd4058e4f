pub mod api;
pub mod config;
pub mod device;
pub mod history;
pub mod serial;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use api::ApiState;
use config::Settings;
use device::{CommandChannel, DeviceManager, Poller, StateCache};
use history::{HistoryStore, SqliteHistory};
use serial::{PortLocator, SerialInterface, SimulatedTransport, Transport};

fn build_transport(settings: &Settings) -> Box<dyn Transport> {
    if settings.serial.simulate {
        log::info!("Using simulated controller");
        Box::new(SimulatedTransport::new())
    } else {
        let locator = PortLocator::new(settings.serial.port_globs.clone());
        Box::new(SerialInterface::new(locator, settings.serial_config()))
    }
}

/// Wire the bridge together and serve HTTP until Ctrl-C.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let history: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistory::open(&settings.database.url)
            .await
            .with_context(|| format!("opening history store {}", settings.database.url))?,
    );

    let cache = StateCache::new();
    let channel = CommandChannel::spawn(build_transport(&settings), cache.clone(), settings.exchange_config())
        .context("starting serial worker")?;

    let device_manager = Arc::new(DeviceManager::new(
        channel.clone(),
        cache,
        history.clone(),
        settings.poll_interval(),
    ));
    let poller = Poller::new(
        channel,
        history,
        settings.poll_interval(),
        settings.exchange_budget(),
    )
    .spawn();

    let app = api::create_router(ApiState {
        device_manager,
        setpoint_gap: settings.setpoint_gap(),
    });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log::info!("Listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutdown requested");
        })
        .await;

    poller.stop().await;
    served.context("HTTP server failed")
}
