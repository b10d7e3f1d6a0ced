//! Optional append-only message journal.
//!
//! One JSON line per appended message, written in append order so the
//! ordering invariants of the conversation survive a reload. Journaling is
//! off by default; the engine enables it when a journal directory is
//! configured.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Message;

/// Append-only JSONL journal for one investigation's messages.
#[derive(Debug)]
pub struct MessageJournal {
    path: PathBuf,
}

impl MessageJournal {
    /// Open (creating if needed) the journal for an investigation.
    ///
    /// # Errors
    ///
    /// Fails if the journal directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>, investigation_id: Uuid) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            path: dir.join(format!("{investigation_id}.jsonl")),
        })
    }

    /// The journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one message as a JSON line.
    ///
    /// # Errors
    ///
    /// Fails on serialization or file I/O errors.
    pub async fn append(&self, message: &Message) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }

    /// Reload the full message sequence in append order.
    ///
    /// # Errors
    ///
    /// Fails on file I/O or on a corrupt line.
    pub async fn load(&self) -> Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}
