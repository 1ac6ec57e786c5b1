//! Persistence of decoded metadata.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::MetadataError;

/// Directory the bootstrap pipeline reads configuration from.
pub const DEFAULT_CONFIG_DIR: &str = "/run/config";

/// File name of the persisted metadata inside the config directory.
pub const METADATA_FILE: &str = "metadata";

/// Permission bits of the persisted metadata file.
pub const METADATA_MODE: u32 = 0o644;

/// Write `data` to `<config_dir>/metadata`, replacing any previous file.
///
/// Returns the path written.
pub async fn write_metadata(config_dir: &Path, data: &[u8]) -> Result<PathBuf, MetadataError> {
    let path = config_dir.join(METADATA_FILE);

    write_file(&path, data)
        .await
        .map_err(|source| MetadataError::Persist {
            path: path.clone(),
            source,
        })?;

    debug!(path = %path.display(), bytes = data.len(), "wrote metadata");
    Ok(path)
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(METADATA_MODE);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.flush().await?;

    // `mode` only applies on creation; an existing file keeps its bits otherwise.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(METADATA_MODE);
        tokio::fs::set_permissions(path, permissions).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metadata(dir.path(), b"{\"hostname\":\"vm-1\"}")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join(METADATA_FILE));
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"hostname\":\"vm-1\"}");
    }

    #[tokio::test]
    async fn test_write_metadata_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "a much longer previous value").unwrap();

        let path = write_metadata(dir.path(), b"short").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_metadata_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join(METADATA_FILE);
        std::fs::write(&existing, "old").unwrap();
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o600)).unwrap();

        let path = write_metadata(dir.path(), b"new").await.unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, METADATA_MODE);
    }

    #[tokio::test]
    async fn test_write_metadata_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");

        let result = write_metadata(&missing, b"data").await;
        assert!(matches!(
            result,
            Err(MetadataError::Persist { ref path, .. }) if *path == missing.join(METADATA_FILE)
        ));
    }
}
