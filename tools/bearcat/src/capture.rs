use crate::engines::shard::ShardValue;
use crate::errors::BearcatError;
use crate::types::EngineKind;
use crate::value::{Array, DataFrame, Index, RecordedValue, Scalar, Series};

/// A value as an engine returned it, before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Captured {
    Canonical(RecordedValue),
    Shard(ShardValue),
    Sequence(Vec<Captured>),
}

/// Implemented by every type an instrumented entry point can return.
pub trait Capture {
    fn capture(&self) -> Captured;
}

impl Capture for DataFrame {
    fn capture(&self) -> Captured {
        Captured::Canonical(RecordedValue::Frame(self.clone()))
    }
}

impl Capture for Series {
    fn capture(&self) -> Captured {
        Captured::Canonical(RecordedValue::Series(self.clone()))
    }
}

impl Capture for Index {
    fn capture(&self) -> Captured {
        Captured::Canonical(RecordedValue::Index(self.clone()))
    }
}

impl Capture for Array {
    fn capture(&self) -> Captured {
        Captured::Canonical(RecordedValue::Array(self.clone()))
    }
}

impl Capture for Scalar {
    fn capture(&self) -> Captured {
        Captured::Canonical(RecordedValue::Scalar(self.clone()))
    }
}

impl Capture for RecordedValue {
    fn capture(&self) -> Captured {
        Captured::Canonical(self.clone())
    }
}

impl Capture for (usize, usize) {
    fn capture(&self) -> Captured {
        Captured::Sequence(vec![
            Captured::Canonical(RecordedValue::Scalar(Scalar::Int64(self.0 as i64))),
            Captured::Canonical(RecordedValue::Scalar(Scalar::Int64(self.1 as i64))),
        ])
    }
}

/// Conversion into canonical form, chosen once per wrapped package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// The reference engine already returns canonical containers.
    Identity,
    /// Translate shard containers; everything else passes through.
    FromShard,
}

impl Conversion {
    pub fn for_engine(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Tabula => Self::Identity,
            EngineKind::Shard => Self::FromShard,
        }
    }

    pub fn apply(self, captured: Captured) -> Result<RecordedValue, BearcatError> {
        match captured {
            Captured::Canonical(value) => Ok(value),
            Captured::Sequence(items) => items
                .into_iter()
                .map(|item| self.apply(item))
                .collect::<Result<Vec<_>, _>>()
                .map(RecordedValue::Sequence),
            Captured::Shard(value) => match self {
                Self::FromShard => Ok(value.to_tabula()),
                Self::Identity => Err(BearcatError::Serialize(format!(
                    "{} value cannot be recorded without conversion from {}",
                    value.type_name(),
                    EngineKind::Shard.package_name()
                ))),
            },
        }
    }
}
