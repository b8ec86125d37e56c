use std::io::{self, Write};

use muxlink_controller::RenderSurface;
use tracing::warn;

/// Writes terminal bytes straight to our own stdout
pub struct StdoutSurface {
    out: io::Stdout,
}

impl StdoutSurface {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl RenderSurface for StdoutSurface {
    fn feed(&mut self, bytes: &[u8]) {
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(bytes).and_then(|_| out.flush()) {
            warn!(error = %e, "Failed to write terminal output");
        }
    }
}

/// Headless screen backed by a vt100 parser
pub struct ScreenSurface {
    parser: vt100::Parser,
    rows: u16,
    cols: u16,
}

impl ScreenSurface {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, 0),
            rows,
            cols,
        }
    }

    /// Visible screen text, one line per row
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }
}

impl RenderSurface for ScreenSurface {
    fn feed(&mut self, bytes: &[u8]) {
        // Pane captures separate lines with a bare LF
        let mut normalized = Vec::with_capacity(bytes.len());
        let mut previous = None;
        for &byte in bytes {
            if byte == b'\n' && previous != Some(b'\r') {
                normalized.push(b'\r');
            }
            normalized.push(byte);
            previous = Some(byte);
        }
        self.parser.process(&normalized);
    }

    fn reset(&mut self) {
        self.parser = vt100::Parser::new(self.rows, self.cols, 0);
    }
}
