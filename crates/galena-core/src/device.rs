//! Execution target tags for partitioned graph segments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution target of a graph segment: the accelerator or the CPU fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// The accelerator.
    #[serde(rename = "tt")]
    Tt,

    /// CPU fallback for regions the accelerator compiler rejected.
    #[serde(rename = "cpu")]
    Cpu,
}

impl Device {
    /// Check whether this is the CPU fallback device.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Tt => write!(f, "tt"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}
