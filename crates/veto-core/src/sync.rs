// Live push subscription to the match authority.
//
// One WebSocket connection per subscribed match id. The first frame sent is
// the bare match id; every text frame received after that is decoded into a
// state payload and forwarded as a `SyncEvent`. The channel never reconnects
// on its own.

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::model::StatePayload;

/// Events emitted by the sync channel, tagged with the match they belong to
/// and the serial of the connection that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected and subscribed.
    Connected { match_id: String, serial: u64 },
    /// A decoded state push.
    Payload {
        match_id: String,
        serial: u64,
        payload: StatePayload,
    },
    /// The connection failed or was closed by the remote end.
    Disconnected { match_id: String, serial: u64 },
}

impl SyncEvent {
    pub fn match_id(&self) -> &str {
        match self {
            SyncEvent::Connected { match_id, .. }
            | SyncEvent::Payload { match_id, .. }
            | SyncEvent::Disconnected { match_id, .. } => match_id,
        }
    }

    pub fn serial(&self) -> u64 {
        match self {
            SyncEvent::Connected { serial, .. }
            | SyncEvent::Payload { serial, .. }
            | SyncEvent::Disconnected { serial, .. } => *serial,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("websocket error: {0}")]
    Connection(#[from] tungstenite::Error),

    #[error("sync event receiver dropped")]
    ReceiverClosed,
}

struct ConnectionHandle {
    match_id: String,
    serial: u64,
    task: JoinHandle<()>,
}

/// Owner of at most one live subscription. Dropping it closes the connection.
pub struct SyncChannel {
    url: String,
    tx: mpsc::Sender<SyncEvent>,
    handle: Option<ConnectionHandle>,
    /// Serial given to the next connection. Events from older connections
    /// carry a lower serial and are never current.
    next_serial: u64,
}

impl SyncChannel {
    /// Events for every connection this channel opens are sent through `tx`.
    pub fn new(url: impl Into<String>, tx: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            url: url.into(),
            tx,
            handle: None,
            next_serial: 1,
        }
    }

    /// The match id of the live connection, if any.
    pub fn match_id(&self) -> Option<&str> {
        self.handle
            .as_ref()
            .filter(|h| !h.task.is_finished())
            .map(|h| h.match_id.as_str())
    }

    pub fn is_open(&self) -> bool {
        self.match_id().is_some()
    }

    /// Whether `event` came from the connection this channel currently owns.
    /// A finished connection stays current until its disconnect is handled.
    pub fn is_current(&self, event: &SyncEvent) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.serial == event.serial() && h.match_id == event.match_id())
    }

    /// Subscribe to `match_id`. A no-op if already subscribed to it; any
    /// other connection is closed first. Must be called inside a tokio
    /// runtime.
    pub fn open(&mut self, match_id: &str) {
        if self.match_id() == Some(match_id) {
            debug!("Sync channel already open for match {match_id}");
            return;
        }
        self.close();

        let serial = self.next_serial;
        self.next_serial += 1;
        info!(
            "Opening sync channel {serial} for match {match_id} at {}",
            self.url
        );
        let task = tokio::spawn(run_connection(
            self.url.clone(),
            match_id.to_string(),
            serial,
            self.tx.clone(),
        ));
        self.handle = Some(ConnectionHandle {
            match_id: match_id.to_string(),
            serial,
            task,
        });
    }

    /// Tear down the current connection, if any. Always safe to call.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.task.abort();
            info!(
                "Closed sync channel {} for match {}",
                handle.serial, handle.match_id
            );
        }
    }

    /// Forget the handle after its connection reported a disconnect.
    /// Returns false, leaving the handle alone, for a stale event.
    pub fn handle_disconnect(&mut self, event: &SyncEvent) -> bool {
        if !self.is_current(event) {
            debug!(
                "Ignoring disconnect from old sync channel {} for match {}",
                event.serial(),
                event.match_id()
            );
            return false;
        }
        self.close();
        true
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    url: String,
    match_id: String,
    serial: u64,
    tx: mpsc::Sender<SyncEvent>,
) {
    match connect_and_stream(&url, &match_id, serial, &tx).await {
        Ok(()) => info!("Sync channel for match {match_id} closed by remote"),
        Err(SyncError::ReceiverClosed) => return,
        Err(e) => warn!("Sync channel for match {match_id} failed: {e}"),
    }
    let _ = tx.send(SyncEvent::Disconnected { match_id, serial }).await;
}

async fn connect_and_stream(
    url: &str,
    match_id: &str,
    serial: u64,
    tx: &mpsc::Sender<SyncEvent>,
) -> Result<(), SyncError> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, read) = ws_stream.split();

    write.send(Message::Text(match_id.to_string().into())).await?;
    info!("Subscribed to match {match_id}");

    tx.send(SyncEvent::Connected {
        match_id: match_id.to_string(),
        serial,
    })
    .await
    .map_err(|_| SyncError::ReceiverClosed)?;

    // `write` stays alive for the whole read loop so the connection is not
    // half-closed underneath it.
    let result = process_message_stream(read, tx, match_id, serial).await;
    drop(write);
    result
}

/// Decode text frames from `stream` and forward them as payload events.
///
/// Undecodable frames are logged and dropped. Returns `Ok` on a close frame
/// or end of stream, and an error on a transport failure or when the
/// receiver is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<SyncEvent>,
    match_id: &str,
    serial: u64,
) -> Result<(), SyncError>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match StatePayload::parse(text.as_str()) {
                Ok(payload) => {
                    let event = SyncEvent::Payload {
                        match_id: match_id.to_string(),
                        serial,
                        payload,
                    };
                    if tx.send(event).await.is_err() {
                        return Err(SyncError::ReceiverClosed);
                    }
                }
                Err(e) => {
                    warn!("Dropping undecodable push for match {match_id}: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                info!("Server sent close frame for match {match_id}");
                return Ok(());
            }
            Err(e) => return Err(SyncError::Connection(e)),
            _ => {
                // Binary, Ping, Pong and raw frames carry no state.
            }
        }
    }
    Ok(())
}
