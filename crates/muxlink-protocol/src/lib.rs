//! Control protocol spoken over the terminal websocket
//!
//! Binary frames carry raw terminal bytes and never pass through this crate.
//! Text frames carry a small colon-delimited control grammar: commands go
//! out (`RESIZE:80:24`), tagged events come in (`PANE_LIST:[...]`). The tag
//! strings are the wire contract with the server and are case-sensitive.

mod command;
mod event;

pub use command::{CommandSink, ControlCommand};
pub use event::{decode, ControlEvent, Decoded, Unrecognized, WarningState};

// Outbound command tags
pub const TAG_RESIZE: &str = "RESIZE";
pub const TAG_SELECT_WINDOW: &str = "SELECT_WINDOW";
pub const TAG_SCROLL: &str = "SCROLL";
pub const TAG_DISABLE_MOUSE: &str = "DISABLE_MOUSE";
pub const TAG_FIX_BELL: &str = "FIX_BELL";
pub const TAG_LIST_PANES: &str = "LIST_PANES";
pub const TAG_ZOOM_PANE: &str = "ZOOM_PANE";
pub const TAG_UNZOOM_PANE: &str = "UNZOOM_PANE";
pub const TAG_CAPTURE_PANE: &str = "CAPTURE_PANE";

// Inbound event tags
pub const TAG_MOUSE_WARNING: &str = "MOUSE_WARNING";
pub const TAG_BELL_WARNING: &str = "BELL_WARNING";
pub const TAG_WINDOW_STATE: &str = "WINDOW_STATE";
pub const TAG_PANE_LIST: &str = "PANE_LIST";
pub const TAG_PANE_CONTENT: &str = "PANE_CONTENT";
