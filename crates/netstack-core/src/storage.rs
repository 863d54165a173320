//! JSON state files for the in-process backends

use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read `path` as JSON; a missing file yields `None`
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let data = serde_json::from_str(&content)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
            log::debug!("Loaded state from {}", path.display());
            Ok(Some(data))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No existing state at {}, starting fresh", path.display());
            Ok(None)
        }
        Err(e) => {
            log::warn!("Failed to load state from {}: {}", path.display(), e);
            Err(e)
        }
    }
}

/// Write `data` to `path` through a temporary file and rename
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }

    let content = serde_json::to_string_pretty(data)
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    tokio::fs::write(&temp_path, content).await?;
    tokio::fs::rename(&temp_path, path).await?;

    log::debug!("Saved state to {}", path.display());
    Ok(())
}
