use std::fs;
use std::io;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::error::{AppError, Context, Result};

/// On-disk store of raw response bodies keyed by request URL.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    pub fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Other(
                anyhow::Error::new(err)
                    .context(format!("Failed to read cache entry {}", path.display())),
            )),
        }
    }

    pub fn store(&self, key: &str, body: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, body)
            .with_context(|| format!("Failed to write cache entry {}", path.display()))?;
        Ok(())
    }
}
