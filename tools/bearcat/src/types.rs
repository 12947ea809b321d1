use serde::{Deserialize, Serialize};

/// The dataframe packages a recorder knows how to wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// The reference engine; its containers are the canonical value model.
    Tabula,
    /// Columnar engine exposed through the `shard.tabula` compatibility namespace.
    Shard,
}

impl EngineKind {
    pub const REFERENCE: Self = Self::Tabula;

    pub fn parse_package(value: &str) -> Option<Self> {
        match value.trim() {
            "tabula" => Some(Self::Tabula),
            "shard.tabula" => Some(Self::Shard),
            _ => None,
        }
    }

    pub fn package_name(self) -> &'static str {
        match self {
            Self::Tabula => "tabula",
            Self::Shard => "shard.tabula",
        }
    }

    pub fn known_packages() -> &'static [&'static str] {
        &["tabula", "shard.tabula"]
    }
}

/// How an instrumented entry point crosses into the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Rust,
    /// Entry points that hand off to a foreign kernel.
    Native,
}
