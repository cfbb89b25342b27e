use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Replica count requested for a workload.
///
/// Either a fixed count or a `{min, max}` range. Only `min` is used as the initial desired
/// count; `max` is carried along into the workload description but never enforced here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Replicas {
    Fixed(u32),
    Range { min: u32, max: u32 },
}

impl Replicas {
    /// Desired replica count at creation time.
    pub fn initial(&self) -> u32 {
        match *self {
            Replicas::Fixed(n) => n,
            Replicas::Range { min, .. } => min,
        }
    }

    /// Upper bound recorded for autoscaling.
    pub fn max(&self) -> u32 {
        match *self {
            Replicas::Fixed(n) => n,
            Replicas::Range { max, .. } => max,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if let Replicas::Range { min, max } = *self {
            if min > max {
                return Err(ModelError::InvalidReplicas(format!(
                    "min ({min}) is greater than max ({max})"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Replicas {
    fn default() -> Self {
        Replicas::Fixed(1)
    }
}

/// Accepts `N` or `MIN:MAX`.
impl FromStr for Replicas {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| ModelError::InvalidReplicas(s.to_string()))
        };
        let replicas = match s.split_once(':') {
            Some((min, max)) => Replicas::Range {
                min: parse(min)?,
                max: parse(max)?,
            },
            None => Replicas::Fixed(parse(s)?),
        };
        replicas.validate()?;
        Ok(replicas)
    }
}

impl fmt::Display for Replicas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replicas::Fixed(n) => write!(f, "{n}"),
            Replicas::Range { min, max } => write!(f, "{min}:{max}"),
        }
    }
}
