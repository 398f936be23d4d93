//! Realtime push channel over the service's websocket.
//!
//! Each [`ChangeFeed`] gets its own socket. The socket joins one channel,
//! forwards changed rows into the [`ChangeStream`] and leaves when the stream
//! is dropped.

use std::time::Duration;

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use todo_store::{ChangeEvent, ChangeFeed, ChangeSender, ChangeStream, Row};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{ClientError, ClientResult, HostedConfig};

/// Interval between heartbeats. The service drops silent sockets.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
/// How long to wait for the channel join to be acknowledged.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

const HEARTBEAT_TOPIC: &str = "phoenix";
const JOIN_REF: &str = "1";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketWriter = SplitSink<Socket, Message>;
type SocketReader = SplitStream<Socket>;

/// Channel topic for a feed: `realtime:<schema>:<table>`.
pub fn channel_topic(feed: &ChangeFeed) -> String {
    format!("realtime:{}:{}", feed.schema, feed.table)
}

/// One frame of the channel protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Correlates replies with the frame that caused them.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    /// Request to join the feed's channel.
    pub fn join(feed: &ChangeFeed, access_token: &str) -> Self {
        let mut change = json!({
            "event": feed.event.as_str(),
            "schema": feed.schema,
            "table": feed.table,
        });
        if let Some(filter) = &feed.filter {
            change["filter"] = Value::String(filter.to_string());
        }
        Self {
            topic: channel_topic(feed),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [change],
                },
                "access_token": access_token,
            }),
            reference: Some(JOIN_REF.to_string()),
        }
    }

    /// Keep-alive frame.
    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: HEARTBEAT_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Request to leave `topic`.
    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Status of a reply frame (`ok` or `error`).
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != "phx_reply" {
            return None;
        }
        self.payload.get("status")?.as_str()
    }

    /// Reason given in an error reply or error event.
    pub fn error_reason(&self) -> String {
        let response = self.payload.get("response").unwrap_or(&self.payload);
        ["reason", "message"]
            .iter()
            .find_map(|key| response.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} on {}", self.event, self.topic))
    }

    /// The changed row, if this is a change event the feed delivers.
    pub fn changed_row(&self, feed: &ChangeFeed) -> Option<Row> {
        if self.event != "postgres_changes" {
            return None;
        }
        let data = self.payload.get("data")?;
        let event = ChangeEvent::parse(data.get("type")?.as_str()?)?;
        if !feed.event.covers(event) {
            return None;
        }
        data.get("record").cloned()
    }

    fn encode(&self) -> ClientResult<Message> {
        let text = serde_json::to_string(self)
            .map_err(|e| ClientError::Deserialization(e.to_string()))?;
        Ok(Message::text(text))
    }
}

fn decode(text: &str) -> Option<PhoenixMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable realtime frame");
            None
        }
    }
}

/// Opens push subscriptions on the realtime service.
#[derive(Clone)]
pub struct RealtimeClient {
    config: HostedConfig,
}

impl RealtimeClient {
    /// Creates a client; no connection is opened until `subscribe`.
    pub fn new(config: HostedConfig) -> Self {
        Self { config }
    }

    /// Connects, joins the feed's channel and waits for the join to be
    /// acknowledged. Rows are delivered until the stream is dropped or the
    /// socket closes.
    pub async fn subscribe(&self, feed: &ChangeFeed) -> ClientResult<ChangeStream> {
        let url = self.config.realtime_url()?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Realtime(format!("connect: {}", e)))?;
        let (mut write, mut read) = socket.split();

        let topic = channel_topic(feed);
        write
            .send(PhoenixMessage::join(feed, self.config.bearer_token()).encode()?)
            .await
            .map_err(|e| ClientError::Realtime(format!("send join: {}", e)))?;

        tokio::time::timeout(JOIN_TIMEOUT, await_join_reply(&mut read, &topic))
            .await
            .map_err(|_| ClientError::Realtime(format!("join of {} timed out", topic)))??;
        info!(%topic, filter = ?feed.filter.as_ref().map(ToString::to_string), "Realtime channel joined");

        let (tx, stream) = ChangeStream::channel();
        tokio::spawn(run_channel(write, read, feed.clone(), tx));
        Ok(stream)
    }
}

async fn await_join_reply(read: &mut SocketReader, topic: &str) -> ClientResult<()> {
    while let Some(frame) = read.next().await {
        let frame = frame.map_err(|e| ClientError::Realtime(format!("read: {}", e)))?;
        let Message::Text(text) = frame else {
            continue;
        };
        let Some(message) = decode(text.as_str()) else {
            continue;
        };
        if message.topic != topic {
            continue;
        }
        match message.reply_status() {
            Some("ok") => return Ok(()),
            Some(_) => return Err(ClientError::Realtime(message.error_reason())),
            None => {}
        }
    }
    Err(ClientError::Realtime(format!(
        "socket closed before {} was joined",
        topic
    )))
}

async fn run_channel(
    mut write: SocketWriter,
    mut read: SocketReader,
    feed: ChangeFeed,
    tx: ChangeSender,
) {
    let topic = channel_topic(&feed);
    let mut reference: u64 = 1;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                reference += 1;
                debug!(%topic, "Change stream dropped, leaving channel");
                if let Ok(leave) = PhoenixMessage::leave(&topic, reference).encode() {
                    let _ = write.send(leave).await;
                }
                let _ = write.close().await;
                break;
            }
            _ = heartbeat.tick() => {
                reference += 1;
                let sent = match PhoenixMessage::heartbeat(reference).encode() {
                    Ok(frame) => write.send(frame).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(e) = sent {
                    warn!(%topic, error = %e, "Realtime heartbeat failed");
                    break;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !forward_frame(text.as_str(), &feed, &topic, &tx) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(%topic, "Realtime socket closed by server");
                    break;
                }
                Some(Err(e)) => {
                    warn!(%topic, error = %e, "Realtime socket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Handles one text frame. Returns false when the channel is finished.
fn forward_frame(text: &str, feed: &ChangeFeed, topic: &str, tx: &ChangeSender) -> bool {
    let Some(message) = decode(text) else {
        return true;
    };
    if message.topic != topic {
        return true;
    }
    if let Some(row) = message.changed_row(feed) {
        debug!(%topic, "Realtime change received");
        return tx.send(row).is_ok();
    }
    match message.event.as_str() {
        "phx_error" | "phx_close" => {
            warn!(%topic, reason = %message.error_reason(), "Realtime channel closed");
            false
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use todo_store::{ChangeFilter, NOTIFICATIONS_TABLE};

    use super::*;

    fn feed() -> ChangeFeed {
        ChangeFeed::inserts(NOTIFICATIONS_TABLE).with_filter(ChangeFilter::eq("recipient_id", "u2"))
    }

    fn change(kind: &str) -> String {
        json!({
            "topic": "realtime:public:notifications",
            "event": "postgres_changes",
            "payload": {
                "ids": [12345],
                "data": {
                    "schema": "public",
                    "table": "notifications",
                    "type": kind,
                    "commit_timestamp": "2024-01-15T10:00:00Z",
                    "record": {"id": 7, "recipient_id": "u2", "sender_id": "u1"},
                },
            },
            "ref": null,
        })
        .to_string()
    }

    #[test]
    fn test_join_frame() {
        let join = PhoenixMessage::join(&feed(), "jwt");

        assert_eq!(join.topic, "realtime:public:notifications");
        assert_eq!(join.event, "phx_join");
        assert_eq!(join.reference.as_deref(), Some("1"));
        assert_eq!(
            join.payload["config"]["postgres_changes"],
            json!([{
                "event": "INSERT",
                "schema": "public",
                "table": "notifications",
                "filter": "recipient_id=eq.u2",
            }])
        );
        assert_eq!(join.payload["access_token"], "jwt");
    }

    #[test]
    fn test_heartbeat_and_leave_frames() {
        let heartbeat = serde_json::to_value(PhoenixMessage::heartbeat(3)).unwrap();
        assert_eq!(
            heartbeat,
            json!({"topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "3"})
        );

        let leave = PhoenixMessage::leave("realtime:public:notifications", 4);
        assert_eq!(leave.event, "phx_leave");
        assert_eq!(leave.topic, "realtime:public:notifications");
    }

    #[test]
    fn test_reply_status() {
        let ok = decode(
            r#"{"topic":"realtime:public:notifications","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#,
        )
        .unwrap();
        assert_eq!(ok.reply_status(), Some("ok"));

        let rejected = decode(
            r#"{"topic":"realtime:public:notifications","event":"phx_reply","payload":{"status":"error","response":{"reason":"Invalid JWT"}},"ref":"1"}"#,
        )
        .unwrap();
        assert_eq!(rejected.reply_status(), Some("error"));
        assert_eq!(rejected.error_reason(), "Invalid JWT");

        let heartbeat = PhoenixMessage::heartbeat(2);
        assert_eq!(heartbeat.reply_status(), None);
    }

    #[test]
    fn test_changed_row_extracts_record() {
        let message = decode(&change("INSERT")).unwrap();
        assert_eq!(
            message.changed_row(&feed()),
            Some(json!({"id": 7, "recipient_id": "u2", "sender_id": "u1"}))
        );

        let update = decode(&change("UPDATE")).unwrap();
        assert_eq!(update.changed_row(&feed()), None);
    }

    #[tokio::test]
    async fn test_forward_frame() {
        let (tx, mut stream) = ChangeStream::channel();
        let feed = feed();
        let topic = channel_topic(&feed);

        assert!(forward_frame("not json", &feed, &topic, &tx));
        assert!(forward_frame(&change("INSERT"), &feed, &topic, &tx));
        assert_eq!(stream.recv().await.unwrap()["id"], 7);

        let closed = r#"{"topic":"realtime:public:notifications","event":"phx_close","payload":{},"ref":"1"}"#;
        assert!(!forward_frame(closed, &feed, &topic, &tx));

        drop(stream);
        assert!(!forward_frame(&change("INSERT"), &feed, &topic, &tx));
    }
}
