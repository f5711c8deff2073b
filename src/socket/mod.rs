//! Live event subscription on the game socket.
//!
//! One connection per room: authenticate with the room user's token, subscribe to the room
//! channel and the user's CPU channel, then forward every decoded event to a single queue.
//! The queue is drained by one consumer, so events of a room are applied in the order they
//! were received, while events of different rooms interleave freely.

pub mod protocol;

use std::time::Duration;

use crate::prelude::*;
use futures::{SinkExt, Stream, StreamExt};
use protocol::{
    ChannelKind, ServerMessage, auth_message, channel_kind, cpu_channel, parse_message,
    room_channel, subscribe_message,
};
use room_tracker::{CpuSample, RoomName, RoomSnapshot};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Snapshot(RoomSnapshot),
    Cpu(CpuSample),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent {
    pub room: RoomName,
    pub event: TelemetryEvent,
}

/// Receives decoded events, one method per event category.
pub trait EventConsumer {
    fn on_room_snapshot(&mut self, room: &str, snapshot: RoomSnapshot);
    fn on_cpu_sample(&mut self, room: &str, sample: CpuSample);
}

pub fn dispatch(consumer: &mut dyn EventConsumer, event: RoomEvent) {
    match event.event {
        TelemetryEvent::Snapshot(snapshot) => consumer.on_room_snapshot(&event.room, snapshot),
        TelemetryEvent::Cpu(sample) => consumer.on_cpu_sample(&event.room, sample),
    }
}

/// Who the connection of a room authenticates as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCredentials {
    pub room: RoomName,
    pub token: String,
    pub user_id: String,
}

/// Decode an event for the room of `credentials`, dropping anything else.
pub fn decode_event(credentials: &RoomCredentials, message: ServerMessage) -> Option<TelemetryEvent> {
    let ServerMessage::Event { channel, data } = message else {
        return None;
    };
    let event = match channel_kind(&channel) {
        ChannelKind::Room(room) if room == credentials.room => {
            RoomSnapshot::from_json(&data).map(TelemetryEvent::Snapshot)
        }
        ChannelKind::Cpu { user_id } if user_id == credentials.user_id => {
            CpuSample::from_json(&data).map(TelemetryEvent::Cpu)
        }
        _ => {
            trace!("[{}] Ignoring event on {channel}", credentials.room);
            return None;
        }
    };
    if event.is_none() {
        debug!("[{}] Dropping malformed event on {channel}", credentials.room);
    }
    event
}

/// Open the subscription of one room and forward its events until the connection closes or
/// nobody listens anymore.
pub async fn subscribe_room(
    socket_url: &Url,
    credentials: RoomCredentials,
    events: UnboundedSender<RoomEvent>,
) -> Result<JoinHandle<()>> {
    let (socket, _) = connect_async(socket_url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {socket_url}"))?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(auth_message(&credentials.token)))
        .await
        .context("Failed to authenticate on the game socket")?;
    timeout(AUTH_TIMEOUT, wait_for_auth(&mut stream))
        .await
        .map_err(|_| anyhow!("Timed out authenticating on the game socket"))??;

    for channel in [
        room_channel(&credentials.room),
        cpu_channel(&credentials.user_id),
    ] {
        sink.send(Message::Text(subscribe_message(&channel)))
            .await
            .with_context(|| format!("Failed to subscribe to {channel}"))?;
    }
    debug!("[{}] Subscribed to room and cpu events", credentials.room);

    Ok(tokio::spawn(async move {
        // Dropping the sink would close the connection
        let _sink = sink;
        forward_events(stream, &credentials, &events).await;
    }))
}

async fn wait_for_auth<S>(stream: &mut S) -> Result<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let message = message.context("Game socket error during authentication")?;
        if let Message::Text(text) = message {
            match parse_message(&text) {
                ServerMessage::AuthOk => return Ok(()),
                ServerMessage::AuthFailed => bail!("The game socket rejected the credentials"),
                _ => {}
            }
        }
    }
    bail!("The game socket closed during authentication")
}

async fn forward_events<S>(
    mut stream: S,
    credentials: &RoomCredentials,
    events: &UnboundedSender<RoomEvent>,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let Some(event) = decode_event(credentials, parse_message(&text)) else {
                    continue;
                };
                let event = RoomEvent {
                    room: credentials.room.clone(),
                    event,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("[{}] Game socket error: {err}", credentials.room);
                break;
            }
        }
    }
    warn!("[{}] Event subscription closed", credentials.room);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn credentials() -> RoomCredentials {
        RoomCredentials {
            room: "W8N3".into(),
            token: "token123".into(),
            user_id: "u1".into(),
        }
    }

    #[derive(Default)]
    struct Recorder {
        snapshots: Vec<(String, RoomSnapshot)>,
        samples: Vec<(String, CpuSample)>,
    }

    impl EventConsumer for Recorder {
        fn on_room_snapshot(&mut self, room: &str, snapshot: RoomSnapshot) {
            self.snapshots.push((room.to_owned(), snapshot));
        }

        fn on_cpu_sample(&mut self, room: &str, sample: CpuSample) {
            self.samples.push((room.to_owned(), sample));
        }
    }

    #[test]
    fn test_decode_event_filters_other_rooms_and_users() {
        let credentials = credentials();
        let snapshot = ServerMessage::Event {
            channel: "room:W8N3".into(),
            data: json!({ "gameTime": 5, "objects": {} }),
        };
        assert!(matches!(
            decode_event(&credentials, snapshot),
            Some(TelemetryEvent::Snapshot(RoomSnapshot {
                game_time: Some(5),
                ..
            }))
        ));

        let other_room = ServerMessage::Event {
            channel: "room:W2N5".into(),
            data: json!({ "gameTime": 5 }),
        };
        assert_eq!(decode_event(&credentials, other_room), None);

        let other_user = ServerMessage::Event {
            channel: "user:u2/cpu".into(),
            data: json!({ "cpu": 1.0, "memory": 10 }),
        };
        assert_eq!(decode_event(&credentials, other_user), None);

        let malformed_cpu = ServerMessage::Event {
            channel: "user:u1/cpu".into(),
            data: json!({ "cpu": "lots" }),
        };
        assert_eq!(decode_event(&credentials, malformed_cpu), None);
    }

    #[test]
    fn test_dispatch_routes_by_category() {
        let mut recorder = Recorder::default();
        dispatch(
            &mut recorder,
            RoomEvent {
                room: "W8N3".into(),
                event: TelemetryEvent::Cpu(CpuSample {
                    cpu_used: 2.5,
                    memory_used: 100,
                }),
            },
        );
        dispatch(
            &mut recorder,
            RoomEvent {
                room: "W2N5".into(),
                event: TelemetryEvent::Snapshot(RoomSnapshot::default()),
            },
        );
        assert_eq!(recorder.samples.len(), 1);
        assert_eq!(recorder.samples[0].0, "W8N3");
        assert_eq!(recorder.snapshots.len(), 1);
        assert_eq!(recorder.snapshots[0].0, "W2N5");
    }

    #[test_log::test(tokio::test)]
    async fn test_forward_events_stops_on_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let messages = futures::stream::iter(vec![
            Ok(Message::Text("protocol 14".into())),
            Ok(Message::Text(r#"["user:u1/cpu",{"cpu":3.5,"memory":4096}]"#.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"["room:W8N3",{"gameTime":1}]"#.into())),
        ]);

        forward_events(messages, &credentials(), &tx).await;
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.event,
            TelemetryEvent::Cpu(CpuSample {
                cpu_used: 3.5,
                memory_used: 4096
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test_log::test(tokio::test)]
    async fn test_wait_for_auth_rejected() {
        let mut messages = futures::stream::iter(vec![
            Ok(Message::Text("time 100".into())),
            Ok(Message::Text("auth failed".into())),
        ]);
        assert!(wait_for_auth(&mut messages).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_subscribe_room_against_local_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut received = vec![];
            while received.len() < 3 {
                if let Some(Ok(Message::Text(text))) = socket.next().await {
                    if text.starts_with("auth ") {
                        socket
                            .send(Message::Text("auth ok token123".into()))
                            .await
                            .unwrap();
                    }
                    received.push(text);
                }
            }
            socket
                .send(Message::Text(
                    r#"["room:W8N3",{"gameTime":42,"objects":{"c":{"type":"controller","level":1}}}]"#
                        .into(),
                ))
                .await
                .unwrap();
            socket.close(None).await.ok();
            received
        });

        let url = Url::parse(&format!("ws://{address}/socket/websocket")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = subscribe_room(&url, credentials(), tx).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.room, "W8N3");
        match event.event {
            TelemetryEvent::Snapshot(snapshot) => assert_eq!(snapshot.game_time, Some(42)),
            other => panic!("unexpected event: {other:?}"),
        }
        handle.await.unwrap();
        assert_eq!(rx.recv().await, None);

        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                "auth token123".to_owned(),
                "subscribe room:W8N3".to_owned(),
                "subscribe user:u1/cpu".to_owned(),
            ]
        );
    }
}
