use std::fmt;

use muxlink_types::{Pane, WindowState};

use crate::{TAG_BELL_WARNING, TAG_MOUSE_WARNING, TAG_PANE_CONTENT, TAG_PANE_LIST, TAG_WINDOW_STATE};

/// State string carried by an advisory warning
///
/// The raw text is kept so the event re-encodes byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningState(String);

impl WarningState {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the server reports the problem as already corrected.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.0.trim().to_ascii_lowercase().as_str(),
            "off" | "disabled" | "false" | "0" | "fixed"
        )
    }

    /// True when a corrective command is warranted. Unknown states count.
    pub fn needs_correction(&self) -> bool {
        !self.is_resolved()
    }
}

impl fmt::Display for WarningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events pushed by the terminal server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    MouseWarning(WarningState),
    BellWarning(WarningState),
    WindowState(WindowState),
    PaneList(Vec<Pane>),
    PaneContent { window_index: u32, text: String },
}

impl ControlEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            ControlEvent::MouseWarning(_) => TAG_MOUSE_WARNING,
            ControlEvent::BellWarning(_) => TAG_BELL_WARNING,
            ControlEvent::WindowState(_) => TAG_WINDOW_STATE,
            ControlEvent::PaneList(_) => TAG_PANE_LIST,
            ControlEvent::PaneContent { .. } => TAG_PANE_CONTENT,
        }
    }

    /// Encode the event the way the server sends it
    pub fn encode(&self) -> String {
        let tag = self.tag();
        match self {
            ControlEvent::MouseWarning(state) | ControlEvent::BellWarning(state) => {
                format!("{}:{}", tag, state)
            }
            ControlEvent::WindowState(state) => format!("{}:{}", tag, to_json(state)),
            ControlEvent::PaneList(panes) => format!("{}:{}", tag, to_json(panes)),
            ControlEvent::PaneContent { window_index, text } => {
                format!("{}:{}:{}", tag, window_index, text)
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    // Serializing plain data structs cannot fail
    serde_json::to_string(value).unwrap_or_default()
}

/// Why a text frame was not turned into an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unrecognized {
    /// No known tag prefix
    UnknownTag,
    /// Known tag, unusable payload
    Malformed { tag: &'static str, reason: String },
}

impl fmt::Display for Unrecognized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unrecognized::UnknownTag => write!(f, "unknown tag"),
            Unrecognized::Malformed { tag, reason } => write!(f, "malformed {}: {}", tag, reason),
        }
    }
}

/// Result of classifying one inbound text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(ControlEvent),
    Unrecognized(Unrecognized),
}

impl Decoded {
    pub fn into_event(self) -> Option<ControlEvent> {
        match self {
            Decoded::Event(event) => Some(event),
            Decoded::Unrecognized(_) => None,
        }
    }
}

/// Classify an inbound text frame by its tag prefix
pub fn decode(text: &str) -> Decoded {
    let Some((tag, payload)) = text.split_once(':') else {
        return Decoded::Unrecognized(Unrecognized::UnknownTag);
    };

    let result = match tag {
        TAG_MOUSE_WARNING => Ok(ControlEvent::MouseWarning(WarningState::new(payload))),
        TAG_BELL_WARNING => Ok(ControlEvent::BellWarning(WarningState::new(payload))),
        TAG_WINDOW_STATE => serde_json::from_str::<WindowState>(payload)
            .map(ControlEvent::WindowState)
            .map_err(|e| malformed(TAG_WINDOW_STATE, e)),
        TAG_PANE_LIST => serde_json::from_str::<Vec<Pane>>(payload)
            .map(ControlEvent::PaneList)
            .map_err(|e| malformed(TAG_PANE_LIST, e)),
        TAG_PANE_CONTENT => decode_pane_content(payload),
        _ => Err(Unrecognized::UnknownTag),
    };

    match result {
        Ok(event) => Decoded::Event(event),
        Err(reason) => Decoded::Unrecognized(reason),
    }
}

fn decode_pane_content(payload: &str) -> Result<ControlEvent, Unrecognized> {
    let (window, text) = payload
        .split_once(':')
        .ok_or_else(|| malformed(TAG_PANE_CONTENT, "missing window index separator"))?;
    let window_index = window
        .parse()
        .map_err(|e| malformed(TAG_PANE_CONTENT, format!("bad window index '{}': {}", window, e)))?;
    Ok(ControlEvent::PaneContent {
        window_index,
        text: text.to_string(),
    })
}

fn malformed(tag: &'static str, reason: impl fmt::Display) -> Unrecognized {
    Unrecognized::Malformed {
        tag,
        reason: reason.to_string(),
    }
}
