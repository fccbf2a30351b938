use anyhow::{Result, bail};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use txtme_db::models::MessageRow;
use txtme_types::models::MessageKind;

/// Largest accepted voice note: 15 MiB.
pub const MAX_AUDIO_BYTES: usize = 15 * 1024 * 1024;

const MAX_NAME_ATTEMPTS: u32 = 16;

/// On-disk store for uploaded voice notes.
///
/// Each object is a flat file at `{dir}/{name}`, where `name` is generated
/// here and never reused. The same directory is served read-only under
/// `/uploads`.
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Audio storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a stored object, or `None` if `name` could escape the directory.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        let safe = !name.is_empty()
            && !name.starts_with('.')
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
        safe.then(|| self.dir.join(name))
    }

    /// Write `bytes` under a fresh name derived from the current nanosecond
    /// timestamp. The file is created exclusively, so an existing object is
    /// never overwritten. Returns the generated name.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<String> {
        let stamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.{}", stamp, extension)
            } else {
                format!("{}-{}.{}", stamp, attempt, extension)
            };
            let path = self.dir.join(&name);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = write_all(&mut file, bytes).await {
                let _ = fs::remove_file(&path).await;
                return Err(e.into());
            }
            return Ok(name);
        }

        bail!("no free object name after {} attempts", MAX_NAME_ATTEMPTS)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let Some(path) = self.path_for(name) else {
            bail!("refusing to delete suspicious object name '{}'", name);
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Audio object {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of the audio objects behind deleted messages.
    pub async fn discard_for(&self, rows: &[MessageRow]) {
        for row in rows.iter().filter(|r| r.kind == MessageKind::Audio.as_str()) {
            if let Err(e) = self.delete(&row.content).await {
                warn!("Failed to remove audio for message {}: {}", row.id, e);
            }
        }
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}
