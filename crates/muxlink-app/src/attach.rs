use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use muxlink_connection::{ConnectionHandle, ConnectionPhase, TerminalEvent};
use muxlink_controller::{RenderSurface, TerminalController};
use muxlink_protocol::CommandSink;
use muxlink_types::{PaneDirection, ScrollDirection, TerminalTarget};

use crate::config::AppConfig;
use crate::surface::StdoutSurface;
use crate::terminal::OpenTerminal;

/// Local command typed at the start of an input line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Escape {
    AppMode,
    MuxMode,
    Pane(PaneDirection),
    Window(u32),
    Resize(u16, u16),
    Scroll(ScrollDirection, u32),
    Quit,
}

/// Lines starting with `~` drive the controller instead of the shell
fn parse_escape(line: &str) -> Option<Result<Escape, String>> {
    let rest = line.strip_prefix('~')?;
    let mut parts = rest.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    let parsed = match (command, args.as_slice()) {
        ("app", []) => Ok(Escape::AppMode),
        ("mux", []) => Ok(Escape::MuxMode),
        ("next", []) => Ok(Escape::Pane(PaneDirection::Next)),
        ("prev", []) => Ok(Escape::Pane(PaneDirection::Previous)),
        ("quit", []) => Ok(Escape::Quit),
        ("window", [index]) => index
            .parse()
            .map(Escape::Window)
            .map_err(|_| format!("Invalid window index: '{}'", index)),
        ("resize", [cols, rows]) => match (cols.parse(), rows.parse()) {
            (Ok(cols), Ok(rows)) => Ok(Escape::Resize(cols, rows)),
            _ => Err(format!("Invalid size: '{} {}'", cols, rows)),
        },
        ("scroll", [direction, count]) => {
            let direction = direction.parse::<ScrollDirection>();
            let count = count.parse::<u32>();
            match (direction, count) {
                (Ok(direction), Ok(count)) => Ok(Escape::Scroll(direction, count)),
                (Err(e), _) => Err(e),
                (_, Err(_)) => Err("Invalid scroll count".to_string()),
            }
        }
        _ => Err(format!(
            "Unknown command '~{}'. Try ~app, ~mux, ~next, ~prev, ~window N, ~resize C R, ~scroll up|down N, ~quit",
            rest.trim()
        )),
    };
    Some(parsed)
}

/// Apply an escape; returns false when the session should end
fn apply_escape<C, S>(controller: &mut TerminalController<C, S>, escape: Escape) -> bool
where
    C: CommandSink,
    S: RenderSurface,
{
    match escape {
        Escape::AppMode => controller.enter_app_mode(),
        Escape::MuxMode => controller.exit_app_mode(),
        Escape::Pane(direction) => {
            if !controller.switch_pane(direction) {
                eprintln!("{}", "No pane in that direction".yellow());
            }
        }
        Escape::Window(index) => controller.switch_window(index),
        Escape::Resize(cols, rows) => controller.resize(cols, rows),
        Escape::Scroll(direction, count) => controller.scroll(direction, count),
        Escape::Quit => return false,
    }
    true
}

/// Follows the local terminal size so the remote window can match it
struct SizeWatcher {
    last: Option<(u16, u16)>,
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl SizeWatcher {
    fn new() -> Self {
        Self {
            last: None,
            #[cfg(unix)]
            signal: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
                .map_err(|e| warn!(error = %e, "Cannot watch terminal resizes"))
                .ok(),
        }
    }

    /// Size of our own terminal, when stdout is one
    fn local_size() -> Option<(u16, u16)> {
        crossterm::terminal::size().ok()
    }

    /// Remember `size`; returns it when it differs from the last one forwarded
    fn update(&mut self, size: Option<(u16, u16)>) -> Option<(u16, u16)> {
        let size = size.filter(|&(cols, rows)| cols > 0 && rows > 0)?;
        if self.last == Some(size) {
            return None;
        }
        self.last = Some(size);
        Some(size)
    }

    /// Wait for the next resize signal; never returns when none can arrive
    async fn changed(&mut self) {
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal.as_mut() {
                if signal.recv().await.is_some() {
                    return;
                }
                self.signal = None;
            }
        }
        std::future::pending::<()>().await
    }
}

fn report_phase(handle: &ConnectionHandle, phase: ConnectionPhase) {
    let label = phase.to_string();
    let label = match phase {
        ConnectionPhase::Connected => label.green().bold(),
        ConnectionPhase::Connecting => label.cyan(),
        ConnectionPhase::Disconnected => label.yellow(),
        ConnectionPhase::Failed => label.red().bold(),
    };
    match handle.last_error() {
        Some(error) if phase != ConnectionPhase::Connected => {
            eprintln!("{} {} ({})", "Connection".bold(), label, error)
        }
        _ => eprintln!("{} {}", "Connection".bold(), label),
    }
}

/// Interactive session: remote output to stdout, stdin lines to the remote
pub async fn run(config: &AppConfig, target: TerminalTarget, app_mode: bool) -> Result<()> {
    let mut terminal = OpenTerminal::open(config, &target).await?;
    eprintln!(
        "{} {} {}",
        "Attached to".green().bold(),
        target.to_string().bold(),
        "(~quit to leave)".dimmed()
    );

    let mut controller =
        TerminalController::new(terminal.handle.clone(), StdoutSurface::new(), target.window_index);
    if app_mode {
        controller.enter_app_mode();
    }

    let mut size = SizeWatcher::new();
    if let Some((cols, rows)) = size.update(SizeWatcher::local_size()) {
        controller.resize(cols, rows);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut status = tokio::time::interval(Duration::from_secs(1));
    let mut last_phase = terminal.handle.phase();

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            event = terminal.events.recv() => match event {
                Some(TerminalEvent::Data(bytes)) => {
                    terminal.touch();
                    controller.feed(&bytes);
                }
                Some(TerminalEvent::Control(event)) => {
                    terminal.touch();
                    controller.handle_event(event);
                }
                None => break Ok(()),
            },
            _ = size.changed() => {
                if let Some((cols, rows)) = size.update(SizeWatcher::local_size()) {
                    debug!(cols, rows, "Local terminal resized");
                    terminal.touch();
                    controller.resize(cols, rows);
                }
            }
            line = stdin.next_line() => match line {
                Ok(Some(line)) => match parse_escape(&line) {
                    Some(Ok(escape)) => {
                        terminal.touch();
                        if !apply_escape(&mut controller, escape) {
                            break Ok(());
                        }
                    }
                    Some(Err(message)) => eprintln!("{}", message.yellow()),
                    None => {
                        let mut input = line.into_bytes();
                        input.push(b'\r');
                        terminal.touch();
                        terminal.handle.send_binary(input);
                    }
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(anyhow::Error::new(e).context("Failed to read stdin")),
            },
            _ = status.tick() => {
                let phase = terminal.handle.phase();
                if phase != last_phase {
                    report_phase(&terminal.handle, phase);
                    last_phase = phase;
                }
            }
        }
    };

    if controller.is_app_mode() {
        controller.exit_app_mode();
    }
    terminal.close().await;
    eprintln!("{}", "Detached".yellow());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_are_not_escapes() {
        assert_eq!(parse_escape("ls -la"), None);
    }

    #[test]
    fn test_parse_escapes() {
        assert_eq!(parse_escape("~app"), Some(Ok(Escape::AppMode)));
        assert_eq!(parse_escape("~next"), Some(Ok(Escape::Pane(PaneDirection::Next))));
        assert_eq!(parse_escape("~window 3"), Some(Ok(Escape::Window(3))));
        assert_eq!(parse_escape("~resize 120 40"), Some(Ok(Escape::Resize(120, 40))));
        assert_eq!(
            parse_escape("~scroll down 5"),
            Some(Ok(Escape::Scroll(ScrollDirection::Down, 5)))
        );
    }

    #[test]
    fn test_size_watcher_forwards_changes_only() {
        let mut size = SizeWatcher {
            last: None,
            #[cfg(unix)]
            signal: None,
        };
        assert_eq!(size.update(Some((120, 40))), Some((120, 40)));
        assert_eq!(size.update(Some((120, 40))), None);
        assert_eq!(size.update(None), None);
        assert_eq!(size.update(Some((0, 0))), None);
        assert_eq!(size.update(Some((100, 30))), Some((100, 30)));
        assert_eq!(size.update(Some((120, 40))), Some((120, 40)));
    }

    #[test]
    fn test_bad_escapes_explain() {
        assert!(matches!(parse_escape("~window x"), Some(Err(_))));
        assert!(matches!(parse_escape("~scroll sideways 1"), Some(Err(e)) if e.contains("sideways")));
        assert!(matches!(parse_escape("~bogus"), Some(Err(e)) if e.contains("~bogus")));
    }
}
