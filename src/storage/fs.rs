//! Filesystem byte store rooted at the cache directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::Result;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path that no concurrent writer will pick.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.tmp-{}-{n}", std::process::id()))
}

// == Write Atomic ==
/// Writes `bytes` to `path` via a temp file and rename, creating parent
/// directories as needed. Readers see either the old or the new content.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path_for(path);
    let result = async {
        let mut file = File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    Ok(result?)
}

// == Storage ==
/// Byte store rooted at one directory. All paths passed in are relative to it.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Opens (creating if needed) the store at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a root-relative location.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Atomically writes a byte buffer, returning the byte count.
    pub async fn write(&self, relative: &Path, bytes: &[u8]) -> Result<u64> {
        write_atomic(&self.resolve(relative), bytes).await?;
        Ok(bytes.len() as u64)
    }

    /// Streams a reader to storage atomically, returning the exact byte count.
    pub async fn write_stream<R>(&self, relative: &Path, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.resolve(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path_for(&path);
        let result = async {
            let mut file = File::create(&tmp).await?;
            let written = tokio::io::copy(reader, &mut file).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        Ok(result?)
    }

    pub async fn read(&self, relative: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(relative)).await?)
    }

    pub async fn open_file(&self, relative: &Path) -> Result<File> {
        Ok(File::open(self.resolve(relative)).await?)
    }

    /// On-disk size of a stored payload.
    pub async fn size(&self, relative: &Path) -> Result<u64> {
        Ok(fs::metadata(self.resolve(relative)).await?.len())
    }

    pub async fn exists(&self, relative: &Path) -> bool {
        fs::try_exists(self.resolve(relative)).await.unwrap_or(false)
    }

    /// Removes a file. Returns `Ok(false)` when it was already gone.
    pub async fn remove(&self, relative: &Path) -> Result<bool> {
        match fs::remove_file(self.resolve(relative)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a directory tree. Missing directories are not an error.
    pub async fn remove_dir(&self, relative: &Path) -> Result<()> {
        match fs::remove_dir_all(self.resolve(relative)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let path = Path::new("a/b/c.bin");

        let written = storage.write(path, b"payload").await.unwrap();
        assert_eq!(written, 7);
        assert_eq!(storage.read(path).await.unwrap(), b"payload");
        assert_eq!(storage.size(path).await.unwrap(), 7);
        assert!(storage.exists(path).await);
    }

    #[tokio::test]
    async fn test_write_stream_counts_bytes() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let mut reader: &[u8] = &[7u8; 1000];

        let written = storage
            .write_stream(Path::new("blob"), &mut reader)
            .await
            .unwrap();
        assert_eq!(written, 1000);
        assert_eq!(storage.size(Path::new("blob")).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        storage.write(Path::new("x"), b"1").await.unwrap();
        storage.write(Path::new("x"), b"22").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["x"]);
        assert_eq!(storage.read(Path::new("x")).await.unwrap(), b"22");
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();

        assert!(!storage.remove(Path::new("nothing")).await.unwrap());
        storage.write(Path::new("f"), b"1").await.unwrap();
        assert!(storage.remove(Path::new("f")).await.unwrap());
        assert!(!storage.exists(Path::new("f")).await);
        storage.remove_dir(Path::new("no-dir")).await.unwrap();
    }
}
