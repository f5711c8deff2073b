use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Payload of a `room:<name>` event.
///
/// The server sends the full object list on the first event and partial diffs afterwards: only
/// the changed fields of an object are present, and removed objects are sent as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    pub game_time: Option<u64>,
    /// `None` marks an object removed since the previous event.
    pub objects: BTreeMap<String, Option<ObjectSnapshot>>,
}

/// The subset of a room object the tracker looks at. Every field is optional since diffs only
/// carry what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSnapshot {
    pub kind: Option<String>,
    pub level: Option<u8>,
    pub safe_mode: Option<u64>,
}

impl RoomSnapshot {
    /// Lenient conversion from the raw event payload.
    ///
    /// Returns `None` only when the payload isn't an object at all. Fields with unexpected
    /// shapes are dropped individually so that one odd object doesn't hide the rest.
    pub fn from_json(data: &Value) -> Option<Self> {
        let data = data.as_object()?;
        let game_time = data.get("gameTime").and_then(Value::as_u64);
        let objects = data
            .get("objects")
            .and_then(Value::as_object)
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|(id, object)| match object {
                        Value::Null => Some((id.clone(), None)),
                        Value::Object(_) => {
                            Some((id.clone(), Some(ObjectSnapshot::from_json(object))))
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self { game_time, objects })
    }
}

impl ObjectSnapshot {
    fn from_json(object: &Value) -> Self {
        Self {
            kind: object.get("type").and_then(Value::as_str).map(str::to_owned),
            level: object
                .get("level")
                .and_then(Value::as_u64)
                .and_then(|level| u8::try_from(level).ok()),
            safe_mode: object.get("safeMode").and_then(Value::as_u64),
        }
    }
}

/// Payload of a `user:<id>/cpu` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    #[serde(rename = "cpu")]
    pub cpu_used: f64,
    #[serde(rename = "memory")]
    pub memory_used: u64,
}

impl CpuSample {
    pub fn from_json(data: &Value) -> Option<Self> {
        Some(Self {
            cpu_used: data.get("cpu")?.as_f64()?,
            memory_used: data.get("memory")?.as_u64()?,
        })
    }
}
