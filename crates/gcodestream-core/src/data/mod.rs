//! Data models for machine status and streaming sessions
//!
//! This module provides:
//! - Three-axis positions used by status reports
//! - Status snapshots produced from asynchronous controller reports
//! - Session state, pause reasons, and progress/status records (see [`session`])

pub mod session;

pub use session::{
    LineError, PauseReason, RecoveryReport, SessionState, StreamProgress, StreamStatus,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A three-axis coordinate reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a position from its three components
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Parse a comma separated coordinate list such as `"1.000,2.000,3.000"`.
    ///
    /// Extra axes beyond Z are ignored and missing trailing axes default to
    /// zero. Returns `None` when no component parses.
    pub fn parse(coords: &str) -> Option<Self> {
        let values: Vec<Option<f64>> = coords
            .split(',')
            .map(|s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect();

        if values.iter().all(Option::is_none) {
            return None;
        }

        let axis = |i: usize| values.get(i).copied().flatten().unwrap_or(0.0);
        Some(Self::new(axis(0), axis(1), axis(2)))
    }

    /// Component-wise sum
    pub fn offset_by(&self, other: &Position) -> Position {
        Position::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise difference
    pub fn minus(&self, other: &Position) -> Position {
        Position::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Planner and serial RX availability reported in `Bf:`/`Buf:` fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferReport {
    /// Free planner blocks
    pub planner_blocks: u16,
    /// Free RX buffer bytes
    pub rx_bytes: u16,
}

/// Machine state carried by one asynchronous status report
///
/// Ephemeral: produced for each `<...>` report and handed to observers,
/// never stored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Controller state name (`Idle`, `Run`, `Hold:0`, ...), `"Unknown"` when absent
    pub state: String,
    /// Machine position
    pub machine_position: Position,
    /// Work coordinate offset
    pub work_offset: Position,
    /// Current feed rate
    pub feed_rate: f64,
    /// Current spindle speed
    pub spindle_speed: f64,
    /// Buffer availability, when the controller reports it
    pub buffer: Option<BufferReport>,
}

impl StatusSnapshot {
    /// Work position derived from machine position and offset
    pub fn work_position(&self) -> Position {
        self.machine_position.minus(&self.work_offset)
    }

    /// Check whether the controller reports an alarm state
    pub fn is_alarm(&self) -> bool {
        self.state.starts_with("Alarm")
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: "Unknown".to_string(),
            machine_position: Position::default(),
            work_offset: Position::default(),
            feed_rate: 0.0,
            spindle_speed: 0.0,
            buffer: None,
        }
    }
}
