//! Filesystem access used by the generator and applier.

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Asynchronous file operations on absolute or root-joined paths
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a UTF-8 file; `Ok(None)` when it does not exist
    async fn read(&self, path: &Path) -> io::Result<Option<String>>;

    async fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    async fn delete(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and all missing parents
    async fn ensure_dir(&self, path: &Path) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> io::Result<bool>;
}

/// [`FileSystem`] on the local disk via `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl FileSystem for LocalFs {
    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        tokio::fs::write(path, content).await
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_fs_roundtrip() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs;
        let nested = dir.path().join("a").join("b");
        let file = nested.join("c.txt");

        assert_eq!(fs.read(&file).await.unwrap(), None);
        assert!(!fs.exists(&file).await.unwrap());

        fs.ensure_dir(&nested).await.unwrap();
        fs.write(&file, "hello").await.unwrap();
        assert!(fs.exists(&file).await.unwrap());
        assert_eq!(fs.read(&file).await.unwrap().as_deref(), Some("hello"));

        fs.delete(&file).await.unwrap();
        assert!(!fs.exists(&file).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let result = LocalFs.delete(&dir.path().join("missing")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
