//! Button input sources.
//!
//! Each source runs on its own OS thread, since GPIO polling and stdin reads
//! block, and forwards actions into the orchestrator's channel.

use airbuddy_hw::{ButtonAction, GpioButton};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ButtonConfig, ButtonSource};

/// How long one GPIO poll blocks before rechecking for shutdown.
const POLL_SLICE: Duration = Duration::from_millis(500);

/// Starts the configured input source.
pub fn spawn(
    config: &ButtonConfig,
    actions: mpsc::Sender<ButtonAction>,
    cancel: CancellationToken,
) -> Result<()> {
    match config.source {
        ButtonSource::Gpio => {
            let button = match GpioButton::open(config.gpio, config.active_low) {
                Ok(button) => button
                    .with_poll(Duration::from_millis(config.poll_ms.max(1)))
                    .with_debounce(Duration::from_millis(config.debounce_ms))
                    .with_double_click(Duration::from_millis(config.double_click_ms)),
                Err(e) => {
                    warn!("Button unavailable: {}. Use the web API to trigger readings", e);
                    return Ok(());
                }
            };
            thread::Builder::new()
                .name("airbuddy-button".into())
                .spawn(move || gpio_loop(button, actions, cancel))
                .context("Failed to spawn button thread")?;
        }
        ButtonSource::Stdin => {
            info!("Reading button actions from stdin (Enter = single, d = double)");
            // Detached: a blocked stdin read cannot be interrupted
            thread::Builder::new()
                .name("airbuddy-stdin".into())
                .spawn(move || stdin_loop(actions))
                .context("Failed to spawn stdin thread")?;
        }
        ButtonSource::None => info!("No button input configured"),
    }
    Ok(())
}

fn gpio_loop(
    mut button: GpioButton,
    actions: mpsc::Sender<ButtonAction>,
    cancel: CancellationToken,
) {
    let mut failing = false;
    while !cancel.is_cancelled() {
        match button.poll_action(POLL_SLICE) {
            Ok(Some(action)) => {
                failing = false;
                if actions.blocking_send(action).is_err() {
                    break;
                }
            }
            Ok(None) => failing = false,
            Err(e) => {
                if !failing {
                    warn!("Button read failed: {}", e);
                    failing = true;
                }
                thread::sleep(POLL_SLICE);
            }
        }
    }
    debug!("Button thread exiting");
}

fn stdin_loop(actions: mpsc::Sender<ButtonAction>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        match parse_line(&line) {
            Some(action) => {
                if actions.blocking_send(action).is_err() {
                    break;
                }
            }
            None => warn!("Unrecognized input {:?}", line.trim()),
        }
    }
    debug!("Stdin closed");
}

/// Maps one line of console input to an action.
fn parse_line(line: &str) -> Option<ButtonAction> {
    match line.trim() {
        "" => Some(ButtonAction::Single),
        "d" | "D" => Some(ButtonAction::Double),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(""), Some(ButtonAction::Single));
        assert_eq!(parse_line("  \n"), Some(ButtonAction::Single));
        assert_eq!(parse_line("d"), Some(ButtonAction::Double));
        assert_eq!(parse_line("double"), Some(ButtonAction::Double));
        assert_eq!(parse_line("single"), Some(ButtonAction::Single));
        assert_eq!(parse_line("x"), None);
    }

    #[tokio::test]
    async fn test_gpio_loop_forwards_press() {
        let dir = tempfile::tempdir().unwrap();
        let value = dir.path().join("value");
        std::fs::write(&value, "1\n").unwrap();

        let button = GpioButton::with_value_path(17, value, false)
            .with_poll(Duration::from_millis(1))
            .with_double_click(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let worker = {
            let cancel = cancel.clone();
            thread::spawn(move || gpio_loop(button, tx, cancel))
        };

        let action = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(action, Some(ButtonAction::Single));

        cancel.cancel();
        tokio::task::spawn_blocking(move || worker.join().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gpio_loop_survives_missing_line() {
        let button = GpioButton::with_value_path(3, PathBuf::from("/nonexistent/value"), false);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let worker = {
            let cancel = cancel.clone();
            thread::spawn(move || gpio_loop(button, tx, cancel))
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!worker.is_finished());
        cancel.cancel();
        tokio::task::spawn_blocking(move || worker.join().unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn test_none_source_spawns_nothing() {
        let config = ButtonConfig {
            source: ButtonSource::None,
            ..ButtonConfig::default()
        };
        let (tx, _rx) = mpsc::channel(1);
        spawn(&config, tx, CancellationToken::new()).unwrap();
    }
}
