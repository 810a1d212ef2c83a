//! A minimal terminal spinner shown while the crew works.

use std::io::Write;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const INTERVAL: Duration = Duration::from_millis(80);

/// A stderr spinner running in a background task; stdout stays clean for the report.
pub struct Spinner {
    handle: JoinHandle<()>,
    message: watch::Sender<String>,
    cancel: watch::Sender<bool>,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (message_tx, message_rx) = watch::channel(message.to_string());

        let handle = tokio::spawn(async move {
            let mut i = 0;
            loop {
                let frame = FRAMES[i % FRAMES.len()];
                let message = message_rx.borrow().clone();
                // \r moves to start of line, \x1b[2K clears the line
                eprint!("\x1b[2K\r{frame} {message}");
                let _ = std::io::stderr().flush();

                tokio::select! {
                    _ = tokio::time::sleep(INTERVAL) => {}
                    _ = cancel_rx.changed() => break,
                }
                i += 1;
            }
            eprint!("\x1b[2K\r");
            let _ = std::io::stderr().flush();
        });

        Self {
            handle,
            message: message_tx,
            cancel: cancel_tx,
        }
    }

    /// Replace the text next to the spinner, e.g. when the next task starts.
    pub fn set_message(&self, message: impl Into<String>) {
        let _ = self.message.send(message.into());
    }

    /// Stop the spinner and clear its line.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_single_braille_chars() {
        assert!(!FRAMES.is_empty());
        for frame in FRAMES {
            assert_eq!(frame.chars().count(), 1);
        }
    }

    #[tokio::test]
    async fn spinner_updates_and_stops() {
        let spinner = Spinner::start("analyzing");
        tokio::time::sleep(Duration::from_millis(100)).await;
        spinner.set_message("researching");
        tokio::time::sleep(Duration::from_millis(100)).await;
        spinner.stop().await;
    }

    #[tokio::test]
    async fn spinner_immediate_stop() {
        Spinner::start("quick").stop().await;
    }
}
