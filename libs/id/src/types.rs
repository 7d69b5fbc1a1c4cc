//! Run identifier types.

use std::fmt;
use std::str::FromStr;

use crate::{IdError, TempRunId};

// =============================================================================
// Durable (store-assigned) IDs
// =============================================================================

/// Identifier assigned by the run store.
///
/// Opaque to the scheduler: the store may hand out UUIDs, integers, or
/// anything else, so the value is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    /// Wraps a store-assigned identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for RunId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RunId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Stores with integer primary keys send numbers.
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Job IDs
// =============================================================================

/// Identifier of a scheduled job, durable or temporary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobId {
    /// Persisted job.
    Durable(RunId),
    /// Job created locally and not yet confirmed by the store.
    Temp(TempRunId),
}

impl JobId {
    /// Mints a fresh temporary id.
    #[must_use]
    pub fn temp() -> Self {
        Self::Temp(TempRunId::new())
    }

    /// Returns true for ids that have not been confirmed by the store.
    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    /// Returns the durable id, if any.
    pub fn durable(&self) -> Option<&RunId> {
        match self {
            Self::Durable(id) => Some(id),
            Self::Temp(_) => None,
        }
    }

    /// Parses a job id, classifying `tmp_{ulid}` as temporary.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if let Ok(temp) = TempRunId::parse(s) {
            return Ok(Self::Temp(temp));
        }
        RunId::new(s).map(Self::Durable)
    }
}

impl From<RunId> for JobId {
    fn from(id: RunId) -> Self {
        Self::Durable(id)
    }
}

impl From<TempRunId> for JobId {
    fn from(id: TempRunId) -> Self {
        Self::Temp(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Durable(id) => id.fmt(f),
            Self::Temp(id) => id.fmt(f),
        }
    }
}

impl FromStr for JobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = RunId::deserialize(deserializer)?;
        Self::parse(id.as_str()).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Keys carried in from outside
// =============================================================================

/// Defines an opaque, non-empty string key that also accepts JSON numbers.
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wraps a key, trimming surrounding whitespace.
            pub fn new(key: impl Into<String>) -> Result<Self, IdError> {
                let key = key.into();
                let trimmed = key.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty);
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = RunId::deserialize(deserializer)?;
                Self::new(raw.0).map_err(serde::de::Error::custom)
            }
        }
    };
}

define_key!(
    /// Key of the block a run draws from; the join key between runs and
    /// completion events.
    SourceKey
);

define_key!(
    /// Batch identifier reported by the packing line and attached to a run.
    ExternalTag
);

// =============================================================================
// Tests
// =============================================================================
