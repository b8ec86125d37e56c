use std::time::Duration;

use anyhow::Result;

use muxlink_connection::TerminalEvent;
use muxlink_controller::TerminalController;
use muxlink_protocol::ControlEvent;
use muxlink_types::TerminalTarget;

use crate::config::AppConfig;
use crate::surface::ScreenSurface;
use crate::terminal::OpenTerminal;

const CAPTURE_ROWS: u16 = 50;
const CAPTURE_COLS: u16 = 200;

/// Zoom the active pane, wait for its captured content and render it
pub async fn run(config: &AppConfig, target: TerminalTarget, timeout: Duration) -> Result<String> {
    let mut terminal = OpenTerminal::open(config, &target).await?;
    let mut controller = TerminalController::new(
        terminal.handle.clone(),
        ScreenSurface::new(CAPTURE_ROWS, CAPTURE_COLS),
        target.window_index,
    );
    controller.enter_app_mode();

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => {
                break Err(anyhow::anyhow!(
                    "No pane content from {} after {}s",
                    target,
                    timeout.as_secs()
                ));
            }
            event = terminal.events.recv() => match event {
                Some(TerminalEvent::Control(event @ ControlEvent::PaneContent { .. })) => {
                    controller.handle_event(event);
                    break Ok(());
                }
                Some(TerminalEvent::Control(event)) => controller.handle_event(event),
                // Raw output is not part of the capture
                Some(TerminalEvent::Data(_)) => {}
                None => break Err(anyhow::anyhow!("Connection to {} closed", target)),
            },
        }
    };

    controller.exit_app_mode();
    let screen = controller.surface().contents();
    terminal.close().await;

    outcome?;
    Ok(screen.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::routing::get;
    use axum::Router;
    use muxlink_protocol::ControlCommand;
    use muxlink_types::Pane;

    /// Answers pane listing and capture requests like a multiplexer server
    async fn fake_server(mut socket: WebSocket) {
        while let Some(Ok(Message::Text(text))) = socket.recv().await {
            let reply = match ControlCommand::parse(&text) {
                Some(ControlCommand::ListPanes { .. }) => {
                    ControlEvent::PaneList(vec![Pane::new(0, false), Pane::new(1, true)])
                }
                Some(ControlCommand::CapturePane {
                    window_index,
                    pane_index,
                }) => ControlEvent::PaneContent {
                    window_index,
                    text: format!("$ echo pane{}\npane{}\n", pane_index, pane_index),
                },
                _ => continue,
            };
            if socket.send(Message::Text(reply.encode())).await.is_err() {
                break;
            }
        }
    }

    async fn start_server() -> String {
        let app = Router::new().route(
            "/ws/terminal/:container/:session/:window",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(fake_server) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_capture_renders_active_pane() {
        let config = AppConfig {
            base_url: start_server().await,
            ..AppConfig::default()
        };
        let text = run(&config, TerminalTarget::new("c1", "s1", 0), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["$ echo pane1", "pane1"]);
    }

    #[tokio::test]
    async fn test_capture_times_out_without_content() {
        let app = Router::new().route(
            "/ws/terminal/:container/:session/:window",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|mut socket: WebSocket| async move {
                    while let Some(Ok(_)) = socket.recv().await {}
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = AppConfig {
            base_url: format!("http://{}", addr),
            ..AppConfig::default()
        };
        let err = run(&config, TerminalTarget::new("c1", "s1", 0), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No pane content"));
    }
}
