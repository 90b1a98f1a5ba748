use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smith::models::message::Message;

/// One line of the conversation log
#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub pwd: String,
    pub message: Message,
}

/// Appends every emitted message to a JSON-lines file
pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    /// `<dir>/logs/<profile>.jsonl`
    pub fn for_profile(dir: &Path, profile: &str) -> Result<Self> {
        let logs = dir.join("logs");
        if !logs.exists() {
            fs::create_dir_all(&logs)?;
        }
        Ok(Self::new(logs.join(format!("{}.jsonl", profile))))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &Message) -> Result<()> {
        let pwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        let entry = LogEntry {
            timestamp: Utc::now(),
            pwd,
            message: message.clone(),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, &entry)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_writes_one_line_per_message() -> Result<()> {
        let dir = tempdir()?;
        let log = ConversationLog::for_profile(dir.path(), "default")?;
        assert!(log.path().ends_with("logs/default.jsonl"));

        log.append(&Message::user().with_text("Hi").with_author("User"))?;
        log.append(&Message::assistant().with_text("Hello!").with_author("Assistant"))?;

        let content = fs::read_to_string(log.path())?;
        let entries: Vec<LogEntry> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message.text(), Some("Hi"));
        assert_eq!(entries[1].message.author.as_deref(), Some("Assistant"));
        assert!(!entries[0].pwd.is_empty());
        Ok(())
    }
}
