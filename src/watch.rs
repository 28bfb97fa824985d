//! `watch` command: stream live events to stdout as JSON lines

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use realtime_client::channel::{listener, ConnectionState, EventChannelClient};
use realtime_client::config::RealtimeConfig;
use realtime_client::error::{Error, ErrorReport};
use realtime_client::protocol::{Event, EventName, Room, ServerEvent};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(config: RealtimeConfig, token: String, rooms: Vec<Room>) -> anyhow::Result<()> {
    let base_url = config.base_url();
    let client = EventChannelClient::new(config.client_config())
        .with_context(|| format!("Failed to set up realtime client for {}", base_url))?;

    let printer = listener(print_event);
    for kind in ServerEvent::ALL {
        client.on(kind, printer.clone());
    }
    client.on(EventName::SocketError, printer.clone());

    let last_error: Arc<Mutex<Option<ErrorReport>>> = Arc::new(Mutex::new(None));
    {
        let last_error = last_error.clone();
        client.on(
            EventName::ConnectionError,
            listener(move |event| {
                print_event(event);
                if let Event::ConnectionError(report) = event {
                    *last_error.lock() = Some(report.clone());
                }
            }),
        );
    }

    // Rooms are per-transport on the server, so rejoin on every connect
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<Option<String>>();
    {
        let watcher = client.clone();
        client.on(
            EventName::ConnectionStatus,
            listener(move |event| {
                print_event(event);
                let Event::ConnectionStatus(status) = event else {
                    return;
                };
                if status.connected {
                    for room in &rooms {
                        watcher.join(room);
                    }
                } else if watcher.state() == ConnectionState::Disconnected {
                    let _ = ended_tx.send(status.reason.clone());
                }
            }),
        );
    }

    let handle = client
        .connect(&token)
        .await
        .ok_or_else(|| Error::ServerUnavailable { url: base_url.clone() })?;
    info!(id = %handle, url = %base_url, "Watching realtime events");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
        reason = ended_rx.recv() => {
            let reason = reason.flatten().unwrap_or_else(|| "session ended".to_string());
            warn!(reason = %reason, "Realtime session ended");
            Err(session_error(last_error.lock().take(), reason))
        }
    };

    client.disconnect();
    outcome.map_err(anyhow::Error::from)
}

/// Error to exit with once the client gave up on its own
fn session_error(last: Option<ErrorReport>, reason: String) -> Error {
    match last {
        Some(report) if report.auth => Error::auth_failed(report.message),
        _ => Error::ConnectionLost { message: reason },
    }
}

fn print_event(event: &Event) {
    let line = json!({
        "at": chrono::Utc::now().to_rfc3339(),
        "event": event.name().as_str(),
        "data": event.data(),
    });
    println!("{}", line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_prefers_auth_report() {
        let report = Error::auth_failed("jwt expired").report();
        let err = session_error(Some(report), "authentication failed".to_string());
        assert!(err.is_auth_failure());

        let err = session_error(None, "reconnect attempts exhausted".to_string());
        assert!(matches!(err, Error::ConnectionLost { .. }));
    }
}
