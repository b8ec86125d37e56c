use std::fmt;

use muxlink_protocol::{decode, CommandSink, ControlEvent, Decoded, WarningState};
use muxlink_types::{Pane, PaneDirection, ScrollDirection, Window, WindowState};
use tracing::{debug, info};

use crate::surface::RenderSurface;

/// What the terminal view is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Raw multiplexer output, every pane visible
    Multiplexer,
    /// One pane zoomed; `zoomed` stays false until the pane list arrives
    App { zoomed: bool },
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Multiplexer => write!(f, "multiplexer"),
            Mode::App { zoomed: false } => write!(f, "app"),
            Mode::App { zoomed: true } => write!(f, "app (zoomed)"),
        }
    }
}

/// Tracks whether a corrective command is outstanding for one warning
#[derive(Debug, Default, Clone, Copy)]
struct Correction {
    sent: bool,
}

impl Correction {
    /// Returns true when the corrective command should go out now
    fn observe(&mut self, state: &WarningState) -> bool {
        if state.is_resolved() {
            self.sent = false;
            return false;
        }
        if self.sent {
            return false;
        }
        self.sent = true;
        true
    }
}

/// State machine for one open terminal view
///
/// Commands go out through `C` (a connection handle in practice), pane
/// captures are painted onto `S`. Both are driven from the task that owns
/// the surface.
pub struct TerminalController<C, S> {
    commands: C,
    surface: S,
    mode: Mode,
    windows: Vec<Window>,
    active_window: u32,
    panes: Vec<Pane>,
    /// `Pane::index` of the active pane, not its list position
    active_pane: Option<u32>,
    mouse: Correction,
    bell: Correction,
}

impl<C, S> fmt::Debug for TerminalController<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalController")
            .field("mode", &self.mode)
            .field("active_window", &self.active_window)
            .field("windows", &self.windows.len())
            .field("panes", &self.panes.len())
            .field("active_pane", &self.active_pane)
            .finish()
    }
}

impl<C: CommandSink, S: RenderSurface> TerminalController<C, S> {
    pub fn new(commands: C, surface: S, window_index: u32) -> Self {
        Self {
            commands,
            surface,
            mode: Mode::Multiplexer,
            windows: Vec::new(),
            active_window: window_index,
            panes: Vec::new(),
            active_pane: None,
            mouse: Correction::default(),
            bell: Correction::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_app_mode(&self) -> bool {
        matches!(self.mode, Mode::App { .. })
    }

    pub fn is_zoomed(&self) -> bool {
        matches!(self.mode, Mode::App { zoomed: true })
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn active_window(&self) -> u32 {
        self.active_window
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn active_pane_index(&self) -> Option<u32> {
        self.active_pane
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        let index = self.active_pane?;
        self.panes.iter().find(|pane| pane.index == index)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn commands(&self) -> &C {
        &self.commands
    }

    pub fn into_parts(self) -> (C, S) {
        (self.commands, self.surface)
    }

    /// Write raw data-plane bytes to the surface
    pub fn feed(&mut self, bytes: &[u8]) {
        self.surface.feed(bytes);
    }

    pub fn enter_app_mode(&mut self) {
        if self.is_app_mode() {
            return;
        }
        info!(window = self.active_window, "Entering app mode");
        self.mode = Mode::App { zoomed: false };
        self.commands.list_panes(self.active_window);
    }

    pub fn exit_app_mode(&mut self) {
        if !self.is_app_mode() {
            return;
        }
        info!(window = self.active_window, "Leaving app mode");
        self.mode = Mode::Multiplexer;
        self.commands.unzoom_pane();
    }

    /// Move to the neighbouring pane in list order, stopping at either end
    ///
    /// Returns whether the active pane changed.
    pub fn switch_pane(&mut self, direction: PaneDirection) -> bool {
        if !self.is_app_mode() || self.panes.len() < 2 {
            return false;
        }

        let current = self
            .active_pane
            .and_then(|index| self.panes.iter().position(|pane| pane.index == index))
            .unwrap_or(0);
        let next = match direction {
            PaneDirection::Previous => current.saturating_sub(1),
            PaneDirection::Next => (current + 1).min(self.panes.len() - 1),
        };
        if next == current && self.active_pane.is_some() {
            return false;
        }

        let index = self.panes[next].index;
        debug!(window = self.active_window, pane = index, "Switching pane");
        self.focus_pane(index);
        true
    }

    pub fn switch_window(&mut self, index: u32) {
        debug!(window = index, mode = %self.mode, "Switching window");
        self.active_window = index;
        self.commands.select_window(index);
        if self.is_app_mode() {
            self.mode = Mode::App { zoomed: false };
            self.commands.list_panes(index);
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        self.commands.resize(cols, rows);
    }

    pub fn scroll(&self, direction: ScrollDirection, count: u32) {
        self.commands.scroll(direction, count);
    }

    /// Decode a text frame and apply it
    ///
    /// Returns false, leaving all state untouched, for frames that are not
    /// well-formed control events.
    pub fn handle_text(&mut self, text: &str) -> bool {
        match decode(text) {
            Decoded::Event(event) => {
                self.handle_event(event);
                true
            }
            Decoded::Unrecognized(reason) => {
                debug!(%reason, "Ignoring control frame");
                false
            }
        }
    }

    pub fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::PaneList(panes) => self.on_pane_list(panes),
            ControlEvent::WindowState(state) => self.on_window_state(state),
            ControlEvent::PaneContent { window_index, text } => {
                self.on_pane_content(window_index, &text)
            }
            ControlEvent::MouseWarning(state) => {
                if self.mouse.observe(&state) {
                    info!(state = %state, "Mouse mode is on; disabling it");
                    self.commands.disable_mouse();
                }
            }
            ControlEvent::BellWarning(state) => {
                if self.bell.observe(&state) {
                    info!(state = %state, "Bell is audible; fixing it");
                    self.commands.fix_bell();
                }
            }
        }
    }

    fn on_pane_list(&mut self, panes: Vec<Pane>) {
        if !self.is_app_mode() {
            debug!(count = panes.len(), "Pane list outside app mode; ignored");
            return;
        }

        let chosen = panes
            .iter()
            .find(|pane| pane.active)
            .or_else(|| panes.first())
            .map(|pane| pane.index);
        self.panes = panes;

        match chosen {
            Some(index) => self.focus_pane(index),
            None => {
                debug!(window = self.active_window, "Window has no panes");
                self.active_pane = None;
                self.mode = Mode::App { zoomed: false };
            }
        }
    }

    fn on_window_state(&mut self, state: WindowState) {
        let active = state
            .active
            .or_else(|| state.windows.iter().find(|w| w.active).map(|w| w.index));
        self.windows = state.windows;
        if let Some(active) = active {
            self.active_window = active;
        }

        if let Some(panes) = state.panes {
            self.panes = panes;
            let still_present = self
                .active_pane
                .map(|index| self.panes.iter().any(|pane| pane.index == index))
                .unwrap_or(false);
            if !still_present {
                self.active_pane = self.panes.first().map(|pane| pane.index);
            }
        }
    }

    fn on_pane_content(&mut self, window_index: u32, text: &str) {
        if !self.is_app_mode() {
            return;
        }
        debug!(window = window_index, len = text.len(), "Painting pane capture");
        self.surface.reset();
        self.surface.feed(text.as_bytes());
    }

    fn focus_pane(&mut self, index: u32) {
        self.active_pane = Some(index);
        self.mode = Mode::App { zoomed: true };
        self.commands.zoom_pane(self.active_window, index);
        self.commands.capture_pane(self.active_window, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use muxlink_protocol::ControlCommand;

    use crate::surface::SURFACE_RESET;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl Recorder {
        fn take(&self) -> Vec<String> {
            self.0.borrow_mut().drain(..).collect()
        }
    }

    impl CommandSink for Recorder {
        fn send_command(&self, command: ControlCommand) {
            self.0.borrow_mut().push(command.encode());
        }
    }

    fn controller() -> TerminalController<Recorder, Vec<u8>> {
        TerminalController::new(Recorder::default(), Vec::new(), 0)
    }

    fn panes(actives: &[(u32, bool)]) -> Vec<Pane> {
        actives.iter().map(|&(index, active)| Pane::new(index, active)).collect()
    }

    #[test]
    fn test_enter_app_mode_requests_panes_once() {
        let mut c = controller();
        c.enter_app_mode();
        c.enter_app_mode();
        assert_eq!(c.mode(), Mode::App { zoomed: false });
        assert_eq!(c.commands().take(), vec!["LIST_PANES:0"]);
    }

    #[test]
    fn test_pane_list_zooms_marked_pane() {
        let mut c = controller();
        c.enter_app_mode();
        c.commands().take();

        c.handle_event(ControlEvent::PaneList(panes(&[(0, false), (3, true), (5, false)])));
        assert_eq!(c.mode(), Mode::App { zoomed: true });
        assert_eq!(c.active_pane_index(), Some(3));
        assert_eq!(c.commands().take(), vec!["ZOOM_PANE:0.3", "CAPTURE_PANE:0.3"]);
    }

    #[test]
    fn test_pane_list_without_marker_uses_first() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(2, false), (4, false)])));
        assert_eq!(c.active_pane_index(), Some(2));
    }

    #[test]
    fn test_empty_pane_list_stays_unzoomed() {
        let mut c = controller();
        c.enter_app_mode();
        c.commands().take();
        c.handle_event(ControlEvent::PaneList(Vec::new()));
        assert_eq!(c.mode(), Mode::App { zoomed: false });
        assert_eq!(c.active_pane_index(), None);
        assert!(c.commands().take().is_empty());
    }

    #[test]
    fn test_pane_list_ignored_in_multiplexer_mode() {
        let mut c = controller();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, true)])));
        assert_eq!(c.mode(), Mode::Multiplexer);
        assert!(c.panes().is_empty());
        assert!(c.commands().take().is_empty());
    }

    #[test]
    fn test_switch_pane_clamps_at_ends() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, true), (1, false), (2, false)])));
        c.commands().take();

        assert!(!c.switch_pane(PaneDirection::Previous));
        assert!(c.switch_pane(PaneDirection::Next));
        assert!(c.switch_pane(PaneDirection::Next));
        assert!(!c.switch_pane(PaneDirection::Next));
        assert_eq!(c.active_pane_index(), Some(2));
        assert_eq!(
            c.commands().take(),
            vec!["ZOOM_PANE:0.1", "CAPTURE_PANE:0.1", "ZOOM_PANE:0.2", "CAPTURE_PANE:0.2"]
        );
    }

    #[test]
    fn test_switch_pane_walks_list_order_with_sparse_indices() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(5, true), (2, false), (9, false)])));
        assert_eq!(c.active_pane_index(), Some(5));
        c.commands().take();

        assert!(c.switch_pane(PaneDirection::Next));
        assert_eq!(c.active_pane_index(), Some(2));
        assert!(c.switch_pane(PaneDirection::Next));
        assert_eq!(c.active_pane_index(), Some(9));
        assert!(!c.switch_pane(PaneDirection::Next));
        assert_eq!(c.active_pane_index(), Some(9));
        assert_eq!(
            c.commands().take(),
            vec!["ZOOM_PANE:0.2", "CAPTURE_PANE:0.2", "ZOOM_PANE:0.9", "CAPTURE_PANE:0.9"]
        );

        assert!(c.switch_pane(PaneDirection::Previous));
        assert_eq!(c.active_pane_index(), Some(2));
        assert!(c.switch_pane(PaneDirection::Previous));
        assert_eq!(c.active_pane_index(), Some(5));
        assert!(!c.switch_pane(PaneDirection::Previous));
        assert_eq!(
            c.commands().take(),
            vec!["ZOOM_PANE:0.2", "CAPTURE_PANE:0.2", "ZOOM_PANE:0.5", "CAPTURE_PANE:0.5"]
        );
    }

    #[test]
    fn test_switch_pane_needs_two_panes_in_app_mode() {
        let mut c = controller();
        assert!(!c.switch_pane(PaneDirection::Next));

        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, true)])));
        assert!(!c.switch_pane(PaneDirection::Next));
    }

    #[test]
    fn test_exit_app_mode_unzooms() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, true)])));
        c.commands().take();

        c.exit_app_mode();
        c.exit_app_mode();
        assert_eq!(c.mode(), Mode::Multiplexer);
        assert!(!c.is_zoomed());
        assert_eq!(c.commands().take(), vec!["UNZOOM_PANE:"]);
    }

    #[test]
    fn test_switch_window_in_app_mode_refetches_panes() {
        let mut c = controller();
        c.switch_window(2);
        assert_eq!(c.commands().take(), vec!["SELECT_WINDOW:2"]);

        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, true)])));
        c.commands().take();

        c.switch_window(1);
        assert_eq!(c.active_window(), 1);
        assert_eq!(c.mode(), Mode::App { zoomed: false });
        assert_eq!(c.commands().take(), vec!["SELECT_WINDOW:1", "LIST_PANES:1"]);
    }

    #[test]
    fn test_window_state_falls_back_to_first_pane() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, false), (7, true)])));
        assert_eq!(c.active_pane_index(), Some(7));

        c.exit_app_mode();
        c.handle_event(ControlEvent::WindowState(WindowState {
            active: Some(3),
            windows: vec![Window {
                index: 3,
                name: "logs".into(),
                active: true,
                pane_count: Some(2),
            }],
            panes: Some(panes(&[(1, false), (2, false)])),
        }));

        assert_eq!(c.active_window(), 3);
        assert_eq!(c.windows().len(), 1);
        assert_eq!(c.active_pane_index(), Some(1));
        assert_eq!(c.active_pane().map(|p| p.index), Some(1));
    }

    #[test]
    fn test_window_state_keeps_surviving_pane() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, false), (4, true)])));

        c.handle_event(ControlEvent::WindowState(WindowState {
            active: None,
            windows: Vec::new(),
            panes: Some(panes(&[(4, false), (5, false)])),
        }));
        assert_eq!(c.active_pane_index(), Some(4));
        assert_eq!(c.active_window(), 0);
    }

    #[test]
    fn test_pane_content_repaints_in_app_mode_only() {
        let mut c = controller();
        c.handle_event(ControlEvent::PaneContent {
            window_index: 0,
            text: "ignored".into(),
        });
        assert!(c.surface().is_empty());

        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneContent {
            window_index: 0,
            text: "a:b".into(),
        });
        let mut expected = SURFACE_RESET.to_vec();
        expected.extend_from_slice(b"a:b");
        assert_eq!(c.surface(), &expected);
    }

    #[test]
    fn test_warning_correction_rearms_after_fix() {
        let mut c = controller();
        let warn = |state: &str| ControlEvent::MouseWarning(WarningState::new(state));

        c.handle_event(warn("on"));
        c.handle_event(warn("on"));
        assert_eq!(c.commands().take(), vec!["DISABLE_MOUSE:"]);

        c.handle_event(warn("off"));
        c.handle_event(warn("something-new"));
        assert_eq!(c.commands().take(), vec!["DISABLE_MOUSE:"]);

        c.handle_event(ControlEvent::BellWarning(WarningState::new("1")));
        c.handle_event(ControlEvent::BellWarning(WarningState::new("fixed")));
        c.handle_event(ControlEvent::BellWarning(WarningState::new("enabled")));
        assert_eq!(c.commands().take(), vec!["FIX_BELL:", "FIX_BELL:"]);
    }

    #[test]
    fn test_malformed_pane_list_leaves_state() {
        let mut c = controller();
        c.enter_app_mode();
        c.handle_event(ControlEvent::PaneList(panes(&[(0, false), (1, true)])));
        c.commands().take();

        assert!(!c.handle_text("PANE_LIST:[invalid json"));
        assert_eq!(c.panes().len(), 2);
        assert_eq!(c.active_pane_index(), Some(1));
        assert!(c.commands().take().is_empty());
    }

    #[test]
    fn test_handle_text_applies_events() {
        let mut c = controller();
        c.enter_app_mode();
        assert!(c.handle_text(r#"PANE_LIST:[{"index":0,"active":true}]"#));
        assert!(c.is_zoomed());
    }

    #[test]
    fn test_passthrough_commands() {
        let mut c = controller();
        c.resize(100, 30);
        c.scroll(ScrollDirection::Up, 5);
        c.feed(b"raw");
        assert_eq!(c.commands().take(), vec!["RESIZE:100:30", "SCROLL:up:5"]);
        assert_eq!(c.surface(), b"raw");
    }
}
