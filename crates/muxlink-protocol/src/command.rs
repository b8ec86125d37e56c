use std::fmt;

use muxlink_types::ScrollDirection;

use crate::{
    TAG_CAPTURE_PANE, TAG_DISABLE_MOUSE, TAG_FIX_BELL, TAG_LIST_PANES, TAG_RESIZE, TAG_SCROLL,
    TAG_SELECT_WINDOW, TAG_UNZOOM_PANE, TAG_ZOOM_PANE,
};

/// Commands sent from the client to the terminal server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Resize { cols: u16, rows: u16 },
    SelectWindow { index: u32 },
    Scroll { direction: ScrollDirection, count: u32 },
    DisableMouse,
    FixBell,
    ListPanes { window_index: u32 },
    ZoomPane { window_index: u32, pane_index: u32 },
    UnzoomPane,
    CapturePane { window_index: u32, pane_index: u32 },
}

impl ControlCommand {
    /// Wire tag of this command
    pub fn tag(&self) -> &'static str {
        match self {
            ControlCommand::Resize { .. } => TAG_RESIZE,
            ControlCommand::SelectWindow { .. } => TAG_SELECT_WINDOW,
            ControlCommand::Scroll { .. } => TAG_SCROLL,
            ControlCommand::DisableMouse => TAG_DISABLE_MOUSE,
            ControlCommand::FixBell => TAG_FIX_BELL,
            ControlCommand::ListPanes { .. } => TAG_LIST_PANES,
            ControlCommand::ZoomPane { .. } => TAG_ZOOM_PANE,
            ControlCommand::UnzoomPane => TAG_UNZOOM_PANE,
            ControlCommand::CapturePane { .. } => TAG_CAPTURE_PANE,
        }
    }

    /// Encode as a text frame payload
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a text frame produced by [`ControlCommand::encode`]
    ///
    /// Servers and tests use this; the client itself only encodes.
    pub fn parse(text: &str) -> Option<Self> {
        let (tag, args) = text.split_once(':')?;
        let command = match tag {
            TAG_RESIZE => {
                let (cols, rows) = args.split_once(':')?;
                ControlCommand::Resize {
                    cols: cols.parse().ok()?,
                    rows: rows.parse().ok()?,
                }
            }
            TAG_SELECT_WINDOW => ControlCommand::SelectWindow {
                index: args.parse().ok()?,
            },
            TAG_SCROLL => {
                let (direction, count) = args.split_once(':')?;
                ControlCommand::Scroll {
                    direction: direction.parse().ok()?,
                    count: count.parse().ok()?,
                }
            }
            TAG_DISABLE_MOUSE if args.is_empty() => ControlCommand::DisableMouse,
            TAG_FIX_BELL if args.is_empty() => ControlCommand::FixBell,
            TAG_LIST_PANES => ControlCommand::ListPanes {
                window_index: args.parse().ok()?,
            },
            TAG_ZOOM_PANE => {
                let (window_index, pane_index) = parse_pane_address(args)?;
                ControlCommand::ZoomPane {
                    window_index,
                    pane_index,
                }
            }
            TAG_UNZOOM_PANE if args.is_empty() => ControlCommand::UnzoomPane,
            TAG_CAPTURE_PANE => {
                let (window_index, pane_index) = parse_pane_address(args)?;
                ControlCommand::CapturePane {
                    window_index,
                    pane_index,
                }
            }
            _ => return None,
        };
        Some(command)
    }
}

/// `<window>.<pane>`
fn parse_pane_address(args: &str) -> Option<(u32, u32)> {
    let (window, pane) = args.split_once('.')?;
    Some((window.parse().ok()?, pane.parse().ok()?))
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match self {
            ControlCommand::Resize { cols, rows } => write!(f, "{}:{}:{}", tag, cols, rows),
            ControlCommand::SelectWindow { index } => write!(f, "{}:{}", tag, index),
            ControlCommand::Scroll { direction, count } => {
                write!(f, "{}:{}:{}", tag, direction, count)
            }
            ControlCommand::ListPanes { window_index } => write!(f, "{}:{}", tag, window_index),
            ControlCommand::ZoomPane {
                window_index,
                pane_index,
            }
            | ControlCommand::CapturePane {
                window_index,
                pane_index,
            } => write!(f, "{}:{}.{}", tag, window_index, pane_index),
            ControlCommand::DisableMouse | ControlCommand::FixBell | ControlCommand::UnzoomPane => {
                write!(f, "{}:", tag)
            }
        }
    }
}

/// Anything that can carry control commands to the server
///
/// Sending is fire-and-forget: failures are recorded by the implementor,
/// never returned to the caller.
pub trait CommandSink {
    fn send_command(&self, command: ControlCommand);

    fn resize(&self, cols: u16, rows: u16) {
        self.send_command(ControlCommand::Resize { cols, rows });
    }

    fn select_window(&self, index: u32) {
        self.send_command(ControlCommand::SelectWindow { index });
    }

    fn scroll(&self, direction: ScrollDirection, count: u32) {
        self.send_command(ControlCommand::Scroll { direction, count });
    }

    fn disable_mouse(&self) {
        self.send_command(ControlCommand::DisableMouse);
    }

    fn fix_bell(&self) {
        self.send_command(ControlCommand::FixBell);
    }

    fn list_panes(&self, window_index: u32) {
        self.send_command(ControlCommand::ListPanes { window_index });
    }

    fn zoom_pane(&self, window_index: u32, pane_index: u32) {
        self.send_command(ControlCommand::ZoomPane {
            window_index,
            pane_index,
        });
    }

    fn unzoom_pane(&self) {
        self.send_command(ControlCommand::UnzoomPane);
    }

    fn capture_pane(&self, window_index: u32, pane_index: u32) {
        self.send_command(ControlCommand::CapturePane {
            window_index,
            pane_index,
        });
    }
}

impl<T: CommandSink + ?Sized> CommandSink for &T {
    fn send_command(&self, command: ControlCommand) {
        (**self).send_command(command)
    }
}

impl<T: CommandSink + ?Sized> CommandSink for std::sync::Arc<T> {
    fn send_command(&self, command: ControlCommand) {
        (**self).send_command(command)
    }
}
