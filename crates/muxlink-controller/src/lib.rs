//! Per-terminal mode state machine
//!
//! The controller sits between a pooled connection and a rendering surface.
//! In multiplexer mode the raw byte stream is shown as-is; app mode zooms a
//! single pane and paints its captured scrollback instead.

mod controller;
mod surface;

pub use controller::{Mode, TerminalController};
pub use surface::{RenderSurface, SURFACE_RESET};
