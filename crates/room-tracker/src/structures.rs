use serde::{Deserialize, Serialize};

/// Object type name the server uses for room controllers.
pub const CONTROLLER_TYPE: &str = "controller";

/// Buildable structure types recognized as benchmark signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructureType {
    Spawn,
    Extension,
    Road,
    ConstructedWall,
    Rampart,
    Link,
    Storage,
    Tower,
    Observer,
    PowerSpawn,
    Extractor,
    Lab,
    Terminal,
    Container,
    Nuker,
    Factory,
}

impl StructureType {
    pub const ALL: [StructureType; 16] = [
        StructureType::Spawn,
        StructureType::Extension,
        StructureType::Road,
        StructureType::ConstructedWall,
        StructureType::Rampart,
        StructureType::Link,
        StructureType::Storage,
        StructureType::Tower,
        StructureType::Observer,
        StructureType::PowerSpawn,
        StructureType::Extractor,
        StructureType::Lab,
        StructureType::Terminal,
        StructureType::Container,
        StructureType::Nuker,
        StructureType::Factory,
    ];

    /// Parse the `type` field of a room object. Returns `None` for anything that isn't a
    /// recognized buildable structure (creeps, sources, the controller, ...).
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.type_name() == name)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StructureType::Spawn => "spawn",
            StructureType::Extension => "extension",
            StructureType::Road => "road",
            StructureType::ConstructedWall => "constructedWall",
            StructureType::Rampart => "rampart",
            StructureType::Link => "link",
            StructureType::Storage => "storage",
            StructureType::Tower => "tower",
            StructureType::Observer => "observer",
            StructureType::PowerSpawn => "powerSpawn",
            StructureType::Extractor => "extractor",
            StructureType::Lab => "lab",
            StructureType::Terminal => "terminal",
            StructureType::Container => "container",
            StructureType::Nuker => "nuker",
            StructureType::Factory => "factory",
        }
    }

    /// Energy needed to build one structure of this type.
    pub fn construction_cost(&self) -> u64 {
        match self {
            StructureType::Spawn => 15_000,
            StructureType::Extension => 3_000,
            StructureType::Road => 300,
            StructureType::ConstructedWall => 1,
            StructureType::Rampart => 1,
            StructureType::Link => 5_000,
            StructureType::Storage => 30_000,
            StructureType::Tower => 5_000,
            StructureType::Observer => 8_000,
            StructureType::PowerSpawn => 100_000,
            StructureType::Extractor => 5_000,
            StructureType::Lab => 50_000,
            StructureType::Terminal => 100_000,
            StructureType::Container => 5_000,
            StructureType::Nuker => 100_000,
            StructureType::Factory => 100_000,
        }
    }

    /// Perimeter structures are tracked but never reported: they are built in bulk and carry no
    /// progression signal.
    pub fn is_silent(&self) -> bool {
        matches!(self, StructureType::Rampart)
    }
}

impl std::fmt::Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}
