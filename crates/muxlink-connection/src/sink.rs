use tokio::sync::mpsc;

use muxlink_protocol::ControlEvent;

/// Receives raw terminal output from the data plane
pub trait DataSink: Send + Sync + 'static {
    fn on_data(&self, bytes: Vec<u8>);
}

/// Receives decoded control events
pub trait ControlSink: Send + Sync + 'static {
    fn on_control(&self, event: ControlEvent);
}

/// Inbound traffic of one connection, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Data(Vec<u8>),
    Control(ControlEvent),
}

// A closed receiver means the view went away; dropping frames is fine then.
impl DataSink for mpsc::UnboundedSender<TerminalEvent> {
    fn on_data(&self, bytes: Vec<u8>) {
        let _ = self.send(TerminalEvent::Data(bytes));
    }
}

impl ControlSink for mpsc::UnboundedSender<TerminalEvent> {
    fn on_control(&self, event: ControlEvent) {
        let _ = self.send(TerminalEvent::Control(event));
    }
}

/// One channel for both sinks
///
/// The receiver is drained by whichever task owns the rendering surface, so
/// data and control events reach it in the order the socket delivered them.
pub fn channel_sinks() -> (
    mpsc::UnboundedSender<TerminalEvent>,
    mpsc::UnboundedReceiver<TerminalEvent>,
) {
    mpsc::unbounded_channel()
}
