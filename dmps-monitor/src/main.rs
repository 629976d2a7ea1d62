use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dmps_monitor::api::{ApiServer, AppState};
use dmps_monitor::config::{MonitorConfig, RosterLocation};
use dmps_monitor::logging;
use dmps_monitor::roster::{CouchRosterSource, FileRosterSource, RosterSource};
use dmps_monitor::sink::{EventSink, HttpEventSink};
use dmps_monitor::supervisor::{FleetSupervisor, SupervisorSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let logging_config = logging::init_logging()?;

    let config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let roster: Arc<dyn RosterSource> = match &config.roster {
        RosterLocation::Couch {
            address,
            username,
            password,
        } => Arc::new(CouchRosterSource::new(address, username, password)),
        RosterLocation::File(path) => Arc::new(FileRosterSource::new(path)),
    };
    let sink: Arc<dyn EventSink> = Arc::new(HttpEventSink::new(
        config.sink_urls.clone(),
        config.sink_timeout,
    ));
    info!(
        roster = %roster.describe(),
        sinks = ?config.sink_urls,
        "Starting DMPS monitor"
    );

    let supervisor = Arc::new(FleetSupervisor::new(
        roster,
        sink,
        SupervisorSettings::from(&config),
    ));

    let shutdown = CancellationToken::new();
    let api = ApiServer::new(
        config.api.clone(),
        AppState::new(Arc::clone(&supervisor), Some(logging_config)),
        shutdown.clone(),
    );

    let supervisor_task = {
        let supervisor = Arc::clone(&supervisor);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { supervisor.run(shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    let served = api.run().await;
    shutdown.cancel();
    supervisor_task.await.context("supervisor task panicked")?;
    served.context("API server failed")?;

    Ok(())
}
