use roi_vision::DetectorConfig;
use std::path::PathBuf;
use std::time::SystemTime;

/// Re-reads a JSON detector config whenever its modification time changes.
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Starts watching from the file's current state, so the config that was
    /// just loaded at startup is not reported again.
    pub async fn new(path: PathBuf) -> Self {
        let last_modified = modified(&path).await;
        Self {
            path,
            last_modified,
        }
    }

    /// Returns the reloaded config if the file changed since the last call.
    /// A file that fails to parse is logged and skipped until it changes again.
    pub async fn poll(&mut self) -> Option<DetectorConfig> {
        let current = modified(&self.path).await?;
        if self.last_modified == Some(current) {
            return None;
        }
        self.last_modified = Some(current);

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "cannot read config");
                return None;
            }
        };
        match DetectorConfig::from_json_str(&contents) {
            Ok(config) => {
                tracing::info!(path = %self.path.display(), "config reloaded");
                Some(config)
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring invalid config");
                None
            }
        }
    }
}

async fn modified(path: &std::path::Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
