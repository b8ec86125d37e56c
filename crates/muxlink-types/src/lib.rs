//! Core types for muxlink
//!
//! This crate provides the value types shared by every muxlink crate: the
//! terminal targets the pool is keyed on and the window/pane metadata the
//! remote multiplexer reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Constants
// ============================================================================

/// Default number of pooled terminal connections
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default idle time after which an unused connection is swept
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default period of the idle sweep
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Minimum spacing between two recorded touches of the same entry
pub const DEFAULT_TOUCH_DEBOUNCE_MS: u64 = 1000;

/// Delay between connectivity coming back and the reconnection attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Path prefix of the terminal websocket endpoint
pub const TERMINAL_PATH_PREFIX: &str = "/ws/terminal";

// ============================================================================
// Targets and keys
// ============================================================================

/// A window of a multiplexer session inside a container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalTarget {
    pub container_id: String,
    pub session_name: String,
    #[serde(default)]
    pub window_index: u32,
}

impl TerminalTarget {
    pub fn new(
        container_id: impl Into<String>,
        session_name: impl Into<String>,
        window_index: u32,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            session_name: session_name.into(),
            window_index,
        }
    }

    /// Pool key for this target. The window index is not part of the key.
    pub fn key(&self) -> PoolKey {
        PoolKey::new(self.container_id.clone(), self.session_name.clone())
    }

    /// Same session, different window
    pub fn with_window(&self, window_index: u32) -> Self {
        Self {
            window_index,
            ..self.clone()
        }
    }
}

impl fmt::Display for TerminalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.container_id, self.session_name, self.window_index)
    }
}

/// Identity of a pooled connection: one per (container, session) pair
///
/// Equality compares the two parts separately, so `("a-b", "c")` and
/// `("a", "b-c")` stay distinct even though they display the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    container_id: String,
    session_name: String,
}

impl PoolKey {
    pub fn new(container_id: impl Into<String>, session_name: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            session_name: session_name.into(),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.container_id, self.session_name)
    }
}

impl From<&TerminalTarget> for PoolKey {
    fn from(target: &TerminalTarget) -> Self {
        target.key()
    }
}

// ============================================================================
// Windows and panes
// ============================================================================

/// A multiplexer window as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_count: Option<u32>,
}

/// A pane inside a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pane {
    pub index: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Pane {
    pub fn new(index: u32, active: bool) -> Self {
        Self {
            index,
            active,
            width: None,
            height: None,
            title: None,
            command: None,
        }
    }
}

/// Full window snapshot pushed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u32>,
    pub windows: Vec<Window>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panes: Option<Vec<Pane>>,
}

// ============================================================================
// Directions
// ============================================================================

/// Scroll direction carried by the `SCROLL` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            _ => Err(format!("Invalid scroll direction: '{}'. Valid options: 'up', 'down'", s)),
        }
    }
}

/// Direction for moving between panes of a window, by list position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneDirection {
    Previous,
    Next,
}
