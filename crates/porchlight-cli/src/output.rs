//! Output formatting for CLI

use porchlight_core::{DisplaySink, Notification};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

/// Writes each notification as one JSON line
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> DisplaySink for JsonLinesSink<W> {
    fn deliver(&self, notification: Notification) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };

        let written = serde_json::to_writer(&mut *out, &notification)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());

        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to write notification");
        }
    }
}

/// Pretty JSON for one-shot command output
pub fn format_output<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}
