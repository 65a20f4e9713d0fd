use crate::config::AmiSettings;
use crate::pbx::error::AmiError;
use crate::pbx::event::{Event, RawEvent};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A single outbound AMI action: an ordered list of `Header: Value` lines.
#[derive(Clone, Debug)]
pub struct AmiAction {
    pub name: String,
    pub action_id: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl AmiAction {
    pub fn login(username: &str, secret: &str) -> Self {
        AmiAction {
            name: "Login".to_string(),
            action_id: None,
            fields: vec![
                ("Username".to_string(), username.to_string()),
                ("Secret".to_string(), secret.to_string()),
            ],
        }
    }

    pub fn ping() -> Self {
        AmiAction {
            name: "Ping".to_string(),
            action_id: None,
            fields: Vec::new(),
        }
    }

    pub fn logoff() -> Self {
        AmiAction {
            name: "Logoff".to_string(),
            action_id: None,
            fields: Vec::new(),
        }
    }

    /// `Action: Setvar` rewriting `CALLERID(name)` on a channel, used by enrichment
    /// to push the formatted display name back into the PBX (§4.3).
    pub fn setvar_caller_id_name(action_id: &str, channel: &str, value: &str) -> Self {
        AmiAction {
            name: "Setvar".to_string(),
            action_id: Some(action_id.to_string()),
            fields: vec![
                ("Channel".to_string(), channel.to_string()),
                ("Variable".to_string(), "CALLERID(name)".to_string()),
                ("Value".to_string(), value.to_string()),
            ],
        }
    }

    fn to_wire(&self) -> String {
        let mut out = format!("Action: {}\r\n", self.name);
        if let Some(id) = &self.action_id {
            out.push_str(&format!("ActionID: {id}\r\n"));
        }
        for (key, value) in &self.fields {
            out.push_str(&format!("{key}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out
    }
}

/// Persistent AMI connection. Internally splits into a writer task (serializes and
/// sends `AmiAction`s), a reader task (parses newline-delimited event blocks and
/// classifies them), and a periodic ping task — the same task-split-over-channels
/// shape as a duplex websocket client, adapted to AMI's plain TCP line protocol.
pub struct AmiClient {
    action_tx: UnboundedSender<AmiAction>,
}

impl AmiClient {
    /// Connects, logs in, and blocks until the login response arrives. A rejected
    /// login (K5, fatal init) is reported as `AmiError::LoginRejected` rather than
    /// silently proceeding — the daemon shell treats this connect call as the one
    /// place PBX auth failures surface.
    pub async fn connect(
        settings: &AmiSettings,
    ) -> Result<(Self, UnboundedReceiver<Event>), AmiError> {
        let stream = TcpStream::connect((settings.host.as_str(), settings.port)).await?;
        let (read_half, write_half) = stream.into_split();

        let (action_tx, action_rx) = unbounded_channel::<AmiAction>();
        let (event_tx, event_rx) = unbounded_channel::<Event>();
        let (login_ack_tx, login_ack_rx) = oneshot::channel();

        action_tx
            .send(AmiAction::login(&settings.username, &settings.secret))
            .map_err(|_| AmiError::SendError)?;

        tokio::spawn(Self::writer_task(write_half, action_rx));
        tokio::spawn(Self::reader_task(read_half, event_tx, Some(login_ack_tx)));
        tokio::spawn(Self::ping_task(action_tx.clone(), DEFAULT_PING_INTERVAL));

        match tokio::time::timeout(LOGIN_TIMEOUT, login_ack_rx).await {
            Ok(Ok(Ok(()))) => Ok((Self { action_tx }, event_rx)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(AmiError::ConnectionClosed),
            Err(_) => Err(AmiError::ResponseTimeout),
        }
    }

    pub fn send(&self, action: AmiAction) -> Result<(), AmiError> {
        self.action_tx.send(action).map_err(|_| AmiError::SendError)
    }

    pub fn set_caller_id_name(
        &self,
        action_id: &str,
        channel: &str,
        value: &str,
    ) -> Result<(), AmiError> {
        self.send(AmiAction::setvar_caller_id_name(action_id, channel, value))
    }

    async fn writer_task(mut write_half: OwnedWriteHalf, mut rx: UnboundedReceiver<AmiAction>) {
        while let Some(action) = rx.recv().await {
            let wire = action.to_wire();
            if let Err(e) = write_half.write_all(wire.as_bytes()).await {
                error!(error = %e, "AMI writer task failed to send action, stopping");
                return;
            }
        }
    }

    async fn reader_task(
        read_half: OwnedReadHalf,
        tx: UnboundedSender<Event>,
        mut login_ack_tx: Option<oneshot::Sender<Result<(), AmiError>>>,
    ) {
        let mut lines = BufReader::new(read_half).lines();
        let mut headers: HashMap<String, String> = HashMap::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    warn!("AMI connection closed by peer");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "AMI reader task failed to read line, stopping");
                    return;
                }
            };

            if line.is_empty() {
                if headers.is_empty() {
                    continue;
                }
                Self::dispatch_block(std::mem::take(&mut headers), &tx, &mut login_ack_tx);
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            } else {
                debug!(line = %line, "ignoring malformed AMI header line");
            }
        }
    }

    fn dispatch_block(
        headers: HashMap<String, String>,
        tx: &UnboundedSender<Event>,
        login_ack_tx: &mut Option<oneshot::Sender<Result<(), AmiError>>>,
    ) {
        if let Some(response) = headers.get("Response") {
            if let Some(ack) = login_ack_tx.take() {
                let result = if response.eq_ignore_ascii_case("Success") {
                    Ok(())
                } else {
                    let reason = headers
                        .get("Message")
                        .cloned()
                        .unwrap_or_else(|| response.clone());
                    Err(AmiError::LoginRejected(reason))
                };
                let _ = ack.send(result);
            }
            return;
        }

        let Some(name) = headers.get("Event").cloned() else {
            return;
        };
        let raw = RawEvent { name, headers };
        let _ = tx.send(Event::from_raw(raw));
    }

    async fn ping_task(tx: UnboundedSender<AmiAction>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.send(AmiAction::ping()).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setvar_action_serializes_expected_wire_format() {
        let action = AmiAction::setvar_caller_id_name("uid-1", "SIP/100-1", "Jane Doe (Lead - 1)");
        let wire = action.to_wire();
        assert!(wire.starts_with("Action: Setvar\r\n"));
        assert!(wire.contains("ActionID: uid-1\r\n"));
        assert!(wire.contains("Variable: CALLERID(name)\r\n"));
        assert!(wire.contains("Value: Jane Doe (Lead - 1)\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn login_action_carries_credentials() {
        let action = AmiAction::login("admin", "hunter2");
        assert_eq!(action.name, "Login");
        assert!(action.fields.contains(&("Username".to_string(), "admin".to_string())));
        assert!(action.fields.contains(&("Secret".to_string(), "hunter2".to_string())));
    }
}
