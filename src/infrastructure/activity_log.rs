use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const ENGINE_LOG: &str = "engine.log";

/// Append-only JSON-lines record of what the engine did, one object per line.
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl ActivityLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(ENGINE_LOG),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, at: DateTime<Utc>, command: &str, message: &str) {
        self.append(at, "info", command, message);
    }

    pub fn error(&self, at: DateTime<Utc>, command: &str, message: &str) {
        self.append(at, "error", command, message);
    }

    fn append(&self, at: DateTime<Utc>, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": at.to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}
