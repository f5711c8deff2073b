use serde_json::Value;

/// A text frame received on the game socket
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    AuthOk,
    AuthFailed,
    /// `["<channel>", <data>]`
    Event { channel: String, data: Value },
    /// Anything else (`time`, `protocol`, `package` announcements...)
    Other(String),
}

/// What a subscribed channel carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Room(String),
    Cpu { user_id: String },
    Unknown,
}

pub fn auth_message(token: &str) -> String {
    format!("auth {token}")
}

pub fn subscribe_message(channel: &str) -> String {
    format!("subscribe {channel}")
}

pub fn room_channel(room: &str) -> String {
    format!("room:{room}")
}

pub fn cpu_channel(user_id: &str) -> String {
    format!("user:{user_id}/cpu")
}

pub fn parse_message(text: &str) -> ServerMessage {
    if let Some(auth) = text.strip_prefix("auth ") {
        return if auth.starts_with("ok") {
            ServerMessage::AuthOk
        } else {
            ServerMessage::AuthFailed
        };
    }

    if text.starts_with('[')
        && let Ok(Value::Array(mut parts)) = serde_json::from_str::<Value>(text)
        && parts.len() == 2
        && let Some(data) = parts.pop()
        && let Some(Value::String(channel)) = parts.pop()
    {
        return ServerMessage::Event { channel, data };
    }

    ServerMessage::Other(text.to_owned())
}

pub fn channel_kind(channel: &str) -> ChannelKind {
    if let Some(room) = channel.strip_prefix("room:") {
        return ChannelKind::Room(room.to_owned());
    }
    if let Some(user) = channel.strip_prefix("user:")
        && let Some(user_id) = user.strip_suffix("/cpu")
    {
        return ChannelKind::Cpu {
            user_id: user_id.to_owned(),
        };
    }
    ChannelKind::Unknown
}
