/// Home the cursor, clear the screen, drop the scrollback
pub const SURFACE_RESET: &[u8] = b"\x1b[H\x1b[2J\x1b[3J";

/// Whatever turns terminal bytes into glyphs
///
/// The owner of the surface forwards its resize events to
/// [`TerminalController::resize`](crate::TerminalController::resize).
pub trait RenderSurface {
    fn feed(&mut self, bytes: &[u8]);

    fn reset(&mut self) {
        self.feed(SURFACE_RESET);
    }
}

impl RenderSurface for Vec<u8> {
    fn feed(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl<S: RenderSurface + ?Sized> RenderSurface for &mut S {
    fn feed(&mut self, bytes: &[u8]) {
        (**self).feed(bytes)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

impl<S: RenderSurface + ?Sized> RenderSurface for Box<S> {
    fn feed(&mut self, bytes: &[u8]) {
        (**self).feed(bytes)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}
