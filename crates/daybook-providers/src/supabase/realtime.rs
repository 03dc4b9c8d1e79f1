//! Supabase Realtime change feed.
//!
//! Realtime speaks the Phoenix channel protocol over a websocket. A
//! subscription joins one channel with a `postgres_changes` filter on the
//! owner's rows, sends a heartbeat every 25 seconds and forwards row changes
//! to the [`Subscription`] until it is dropped.

use std::time::Duration;

use daybook_core::{Change, RecordKind};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::store::{SUBSCRIPTION_BUFFER, Subscription};

use super::config::SupabaseConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";

/// A decoded Realtime frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A row change on the joined table.
    Change(Change),
    /// Reply to a join or heartbeat.
    Reply {
        reference: Option<String>,
        ok: bool,
        reason: Option<String>,
    },
    /// The server reported a channel error.
    ChannelError(String),
    /// The server closed the channel.
    Closed,
    /// Presence, broadcasts and anything else we do not use.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    change_type: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// Decodes one text frame. Malformed frames are logged and ignored.
pub fn parse_message(text: &str) -> RealtimeEvent {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("ignoring malformed realtime frame: {}", e);
            return RealtimeEvent::Ignored;
        }
    };

    match frame.event.as_str() {
        "postgres_changes" => parse_change(&frame.payload),
        "phx_reply" => {
            let ok = frame.payload.get("status").and_then(Value::as_str) == Some("ok");
            let reason = frame
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .map(String::from);
            RealtimeEvent::Reply {
                reference: frame.reference,
                ok,
                reason,
            }
        }
        "system" if frame.payload.get("status").and_then(Value::as_str) == Some("error") => {
            let message = frame
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("channel error");
            RealtimeEvent::ChannelError(message.to_string())
        }
        "phx_error" => RealtimeEvent::ChannelError("channel crashed".to_string()),
        "phx_close" => RealtimeEvent::Closed,
        _ => RealtimeEvent::Ignored,
    }
}

fn parse_change(payload: &Value) -> RealtimeEvent {
    let data: ChangeData = match payload.get("data").cloned().map(serde_json::from_value) {
        Some(Ok(data)) => data,
        _ => {
            warn!("ignoring postgres_changes frame without data");
            return RealtimeEvent::Ignored;
        }
    };

    let id_of = |row: &Option<Value>| {
        row.as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(String::from)
    };

    let change = match data.change_type.as_str() {
        "INSERT" | "UPDATE" => match (id_of(&data.record), data.record) {
            (Some(id), Some(record)) if data.change_type == "INSERT" => Change::insert(id, record),
            (Some(id), Some(record)) => Change::update(id, record),
            _ => {
                warn!("ignoring {} without a record id", data.change_type);
                return RealtimeEvent::Ignored;
            }
        },
        "DELETE" => match id_of(&data.old_record) {
            Some(id) => Change::delete(id),
            None => {
                warn!("ignoring DELETE without an old record id");
                return RealtimeEvent::Ignored;
            }
        },
        other => {
            warn!("ignoring unknown change type {}", other);
            return RealtimeEvent::Ignored;
        }
    };
    RealtimeEvent::Change(change)
}

fn topic(kind: RecordKind, owner: &str) -> String {
    format!("realtime:daybook:{}:{}", kind.table(), owner)
}

fn join_message(kind: RecordKind, owner: &str, access_token: &str) -> Value {
    json!({
        "topic": topic(kind, owner),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": {"self": false},
                "presence": {"key": ""},
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": kind.table(),
                    "filter": format!("user_id=eq.{}", owner)
                }]
            },
            "access_token": access_token
        },
        "ref": JOIN_REF,
        "join_ref": JOIN_REF
    })
}

fn heartbeat_message(reference: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string()
    })
}

fn join_error(reason: Option<String>) -> ProviderError {
    let reason = reason.unwrap_or_else(|| "unknown reason".to_string());
    let lower = reason.to_lowercase();
    let rejected_token =
        lower.contains("jwt") || lower.contains("token") || lower.contains("unauthorized");
    let error = if rejected_token {
        ProviderError::authentication(format!("realtime join rejected: {}", reason))
    } else {
        ProviderError::server(format!("realtime join failed: {}", reason))
    };
    error.with_provider("supabase")
}

/// Connects, joins the owner's channel for `kind` and starts forwarding.
///
/// Returns once the server has acknowledged the join, so a rejected token
/// surfaces here rather than on the first `recv`.
pub(crate) async fn subscribe(
    config: &SupabaseConfig,
    kind: RecordKind,
    owner: &str,
    access_token: &str,
) -> ProviderResult<Subscription> {
    let url = config.realtime_url().map_err(ProviderError::configuration)?;
    debug!(%kind, "connecting to realtime");

    let (socket, _) = tokio::time::timeout(config.timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| ProviderError::network("timeout connecting to realtime"))?
        .map_err(|e| ProviderError::network(format!("realtime connect failed: {}", e)))?;
    let (mut write, mut read) = socket.split();

    write
        .send(Message::Text(join_message(kind, owner, access_token).to_string()))
        .await
        .map_err(|e| ProviderError::network(format!("failed to join realtime channel: {}", e)))?;

    tokio::time::timeout(config.timeout, wait_for_join(&mut read))
        .await
        .map_err(|_| ProviderError::network("timeout waiting for realtime join"))??;
    info!(%kind, "subscribed to realtime changes");

    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let task = tokio::spawn(forward(write, read, tx, config.heartbeat_interval));
    Ok(Subscription::new(kind, rx, task))
}

async fn wait_for_join(read: &mut SplitStream<Socket>) -> ProviderResult<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_message(&text) {
                RealtimeEvent::Reply {
                    reference,
                    ok,
                    reason,
                } if reference.as_deref() == Some(JOIN_REF) => {
                    return if ok { Ok(()) } else { Err(join_error(reason)) };
                }
                RealtimeEvent::ChannelError(reason) => return Err(join_error(Some(reason))),
                _ => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(ProviderError::network(format!("realtime error: {}", e))),
        }
    }
    Err(ProviderError::network("realtime connection closed before join"))
}

async fn forward(
    mut write: SplitSink<Socket, Message>,
    mut read: SplitStream<Socket>,
    tx: mpsc::Sender<ProviderResult<Change>>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    // The first tick fires immediately; the join already proved liveness.
    heartbeat.tick().await;
    let mut reference: u64 = 1;

    let failure = loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                reference += 1;
                debug!(reference, "realtime heartbeat");
                let frame = Message::Text(heartbeat_message(reference).to_string());
                if let Err(e) = write.send(frame).await {
                    break Some(ProviderError::network(format!("realtime heartbeat failed: {}", e)));
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_message(&text) {
                    RealtimeEvent::Change(change) => {
                        if tx.send(Ok(change)).await.is_err() {
                            break None;
                        }
                    }
                    RealtimeEvent::ChannelError(reason) => {
                        let message = format!("realtime channel error: {}", reason);
                        break Some(ProviderError::server(message));
                    }
                    RealtimeEvent::Closed => {
                        break Some(ProviderError::network("realtime channel closed"));
                    }
                    RealtimeEvent::Reply { ok: false, reason, .. } => {
                        warn!("realtime request rejected: {}", reason.unwrap_or_default());
                    }
                    _ => {}
                },
                Some(Ok(Message::Close(_))) | None => {
                    break Some(ProviderError::network("realtime connection closed"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break Some(ProviderError::network(format!("realtime error: {}", e)));
                }
            },
            _ = tx.closed() => break None,
        }
    };

    if let Some(error) = failure {
        warn!("realtime subscription ended: {}", error);
        let _ = tx.send(Err(error.with_provider("supabase"))).await;
    }
    let _ = write.close().await;
}
