pub mod binding;
pub mod call_state;
pub mod enrichment;
pub mod worker;

use crate::config::Config;
use crate::crm::CrmClient;
use crate::crm::types::CallDirection;
use crate::pbx::{AmiClient, Event};
use call_state::CallState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use worker::{enrich_new_call, CallWorker};

/// Entry point the daemon shell feeds every PBX event into. Each call gets its own
/// worker task and event channel, keyed by `Event::routing_id`: this gives per-call
/// FIFO ordering (P2) while letting unrelated calls make progress concurrently (§5),
/// the same shape as spinning one task per connection.
pub struct Orchestrator {
    crm: CrmClient,
    ami: Arc<AmiClient>,
    config: Arc<Config>,
    calls: Arc<DashMap<String, CallHandle>>,
}

struct CallHandle {
    tx: UnboundedSender<Event>,
    _task: JoinHandle<()>,
}

impl Orchestrator {
    pub fn new(crm: CrmClient, ami: Arc<AmiClient>, config: Arc<Config>) -> Self {
        Orchestrator {
            crm,
            ami,
            config,
            calls: Arc::new(DashMap::new()),
        }
    }

    /// Feeds one PBX event into the orchestrator. `Newchannel` for an unlisted source
    /// extension, and events with no routable correlation id, are dropped (§4.1).
    pub async fn dispatch(&self, event: Event) {
        if !self.config.is_event_enabled(event.name()) {
            debug!(event = %event.name(), "event kind disabled by configuration, dropping");
            return;
        }

        let Some(correlation_id) = event.routing_id().map(str::to_string) else {
            warn!(event = %event.name(), "event has no routable correlation id, dropping");
            return;
        };

        if let Some(new_channel) = event.as_new_channel() {
            if !self.is_allowed_extension(new_channel.exten()) {
                debug!(exten = ?new_channel.exten(), "source extension not in allow-list, dropping call");
                return;
            }
            self.spawn_call(&correlation_id, new_channel);
        }

        let Some(handle) = self.calls.get(&correlation_id) else {
            warn!(call = %correlation_id, event = %event.name(), "event for unknown call, dropping");
            return;
        };

        if handle.tx.send(event).is_err() {
            warn!(call = %correlation_id, "call worker has already exited, dropping event");
            drop(handle);
            self.calls.remove(&correlation_id);
        }
    }

    /// §5 cancellation: lets in-flight workers finish finalization best-effort within
    /// `timeout`, then abandons whatever is left. Called between AMI sessions (so a
    /// reconnect never inherits orphaned workers from the dropped connection) and on
    /// daemon shutdown.
    pub async fn shutdown(&self, timeout: Duration) {
        let keys: Vec<String> = self.calls.iter().map(|e| e.key().clone()).collect();
        if keys.is_empty() {
            return;
        }
        let tasks: Vec<JoinHandle<()>> = keys
            .into_iter()
            .filter_map(|key| self.calls.remove(&key).map(|(_, handle)| handle._task))
            .collect();

        let count = tasks.len();
        let joined = futures_util::future::join_all(tasks);
        if tokio::time::timeout(timeout, joined).await.is_err() {
            warn!(
                pending = count,
                "shutdown grace period elapsed, abandoning in-flight calls"
            );
        }
    }

    fn is_allowed_extension(&self, exten: Option<&str>) -> bool {
        match exten {
            Some(exten) => self.config.allowed_extens.iter().any(|e| e == exten),
            None => false,
        }
    }

    fn spawn_call(&self, correlation_id: &str, new_channel: &crate::pbx::event::NewChannelEvent) {
        // Newchannel only ever originates an inbound leg on this PBX dialplan; outbound,
        // forwarded, and callback legs are distinguished later (DialBegin/AgentConnect
        // bookkeeping), not at call-state creation.
        let state = CallState::new(
            correlation_id.to_string(),
            CallDirection::Inbound,
            new_channel.caller_id_num().unwrap_or("Unknown").to_string(),
            new_channel.exten().unwrap_or("Unknown").to_string(),
            new_channel.channel().unwrap_or("Unknown").to_string(),
            chrono::Utc::now(),
        );

        let (tx, mut rx) = unbounded_channel::<Event>();
        let crm = self.crm.clone();
        let ami = Arc::clone(&self.ami);
        let config = Arc::clone(&self.config);
        let calls = Arc::clone(&self.calls);
        let correlation_id_owned = correlation_id.to_string();

        let task = tokio::spawn(async move {
            let mut worker = CallWorker::new(state);
            enrich_new_call(&mut worker.state, &crm, &ami, &config).await;

            while let Some(event) = rx.recv().await {
                let finalized = worker.handle_event(&event, &crm, &ami, &config).await;
                if finalized {
                    break;
                }
            }
            calls.remove(&correlation_id_owned);
            debug!(call = %correlation_id_owned, "call worker task exiting");
        });

        self.calls.insert(
            correlation_id.to_string(),
            CallHandle { tx, _task: task },
        );
    }
}
