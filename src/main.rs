use callbridge::config::Config;
use callbridge::crm::CrmClient;
use callbridge::error::DaemonError;
use callbridge::logging;
use callbridge::orchestrator::Orchestrator;
use callbridge::pbx::{AmiClient, AmiError};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Backstop above `run_session`'s own internal drain timeout, covering spawn/await overhead.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(7);

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let config_path = env::args().nth(1).unwrap_or_else(|| "config.ini".to_string());
    let config = Arc::new(Config::load(&config_path)?);

    let _guards = logging::init(&config, "logs").map_err(DaemonError::Logging)?;
    info!(path = %config_path, "configuration loaded");

    let crm = CrmClient::new(config.bitrix24.webhook_url.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut attempt: u32 = 0;
    loop {
        let session = tokio::spawn(run_session(Arc::clone(&config), crm.clone(), shutdown_rx.clone()));
        tokio::pin!(session);

        tokio::select! {
            result = &mut session => {
                match result.map_err(|e| DaemonError::Logging(e.to_string()))? {
                    Ok(()) => {
                        info!("AMI session ended cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(DaemonError::Ami(AmiError::LoginRejected(reason))) => {
                        error!(reason = %reason, "AMI login rejected, exiting");
                        return Err(DaemonError::AmiLoginRejected(reason));
                    }
                    Err(e) => {
                        error!(error = %e, "AMI session failed");
                        attempt = attempt.saturating_add(1);
                    }
                }
                let delay = backoff_delay(attempt);
                warn!(delay_secs = delay.as_secs(), "reconnecting to AMI after delay");
                tokio::time::sleep(delay).await;
            }
            _ = wait_for_shutdown_signal() => {
                info!("shutdown signal received, draining in-flight calls within the grace period");
                let _ = shutdown_tx.send(true);
                if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, session).await.is_err() {
                    warn!("shutdown grace period elapsed with calls still finalizing, exiting anyway");
                }
                return Ok(());
            }
        }
    }
}

/// Waits for `SIGINT` (Ctrl+C) or, on Unix, `SIGTERM` — whichever a service manager
/// uses to ask the daemon to stop.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = RECONNECT_BASE_DELAY.saturating_mul(1 << attempt.min(6));
    scaled.min(RECONNECT_MAX_DELAY)
}

/// Connects to AMI, wires an `Orchestrator` to its event stream, and runs until the
/// connection drops or `shutdown` is signalled. Mirrors the original daemon's
/// connect/login/register/ping loop (`main.py::run_daemon`), replacing its blocking
/// `while True: ping()` with an AMI-driven event loop plus a background ping task
/// already owned by `AmiClient`. Either way out, live calls are drained (§5) before
/// this returns, so a reconnect never inherits orphaned workers from a dropped link.
async fn run_session(
    config: Arc<Config>,
    crm: CrmClient,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), DaemonError> {
    let (ami, mut events) = AmiClient::connect(&config.ami).await?;
    info!(host = %config.ami.host, port = config.ami.port, "connected to AMI");

    let ami = Arc::new(ami);
    let orchestrator = Orchestrator::new(crm, Arc::clone(&ami), Arc::clone(&config));

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if config.log_ami_events {
                    tracing::debug!(event = %event.name(), "received AMI event");
                }
                orchestrator.dispatch(event).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    orchestrator.shutdown(SHUTDOWN_GRACE_PERIOD).await;
    Ok(())
}
