//! Local filesystem backend.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use uristore_common::{Error, PropertyBag, Result};

use super::{BoxReader, BoxWriter};

/// A directory entry returned by [`LocalFileSystem::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Local filesystem backend.
///
/// Operates on absolute paths; there is no root confinement.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Open a file for reading.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    pub async fn open_read(&self, path: &Path) -> Result<BoxReader> {
        let file = fs::File::open(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))?;
        Ok(Box::pin(file))
    }

    /// Open a file for writing.
    ///
    /// Without `overwrite` the file is created exclusively, so an existing
    /// file is reported as `AlreadyExists` without touching its contents.
    /// The size hint is not used for local files.
    ///
    /// # Errors
    /// - `AlreadyExists` if `overwrite` is false and the file exists
    /// - `NotFound` if the parent directory does not exist
    pub async fn open_write(
        &self,
        path: &Path,
        overwrite: bool,
        _size_hint: Option<u64>,
    ) -> Result<BoxWriter> {
        let mut options = fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options
            .open(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))?;
        Ok(Box::pin(file))
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    /// Whether `path` exists and is a directory.
    pub async fn is_dir(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a file.
    pub async fn delete_file(&self, path: &Path) -> Result<()> {
        if fs::metadata(path).await.map_err(|e| Error::from_io(e, path.display()))?.is_dir() {
            return Err(Error::InvalidInput(format!(
                "{} is a directory",
                path.display()
            )));
        }
        fs::remove_file(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))
    }

    /// Delete a directory and everything below it.
    pub async fn delete_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))
    }

    /// Create a directory and all missing ancestors.
    pub async fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path).await?)
    }

    /// Properties of a file or directory.
    ///
    /// Keys: `Name`, `FullName`, `IsDirectory`, `ReadOnly`, `Length` (files
    /// only), `LastModified` and `Created` where the platform reports them.
    pub async fn properties(&self, path: &Path) -> Result<PropertyBag> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))?;

        let mut props = PropertyBag::new();
        if let Some(name) = path.file_name() {
            props.insert("Name".into(), Value::from(name.to_string_lossy().into_owned()));
        }
        props.insert("FullName".into(), Value::from(path.display().to_string()));
        props.insert("IsDirectory".into(), Value::from(meta.is_dir()));
        props.insert("ReadOnly".into(), Value::from(meta.permissions().readonly()));
        if meta.is_file() {
            props.insert("Length".into(), Value::from(meta.len()));
        }
        if let Ok(modified) = meta.modified() {
            let modified: DateTime<Utc> = modified.into();
            props.insert("LastModified".into(), Value::from(modified.to_rfc3339()));
        }
        if let Ok(created) = meta.created() {
            let created: DateTime<Utc> = created.into();
            props.insert("Created".into(), Value::from(created.to_rfc3339()));
        }
        Ok(props)
    }

    /// Size of a file in bytes.
    pub async fn len(&self, path: &Path) -> Result<u64> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))?;
        Ok(meta.len())
    }

    /// Direct children of a directory, sorted by path.
    ///
    /// # Errors
    /// - `NotFound` if the directory does not exist
    pub async fn list(&self, path: &Path) -> Result<Vec<LocalEntry>> {
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| Error::from_io(e, path.display()))?;

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            results.push(LocalEntry {
                path: entry.path(),
                is_dir,
            });
        }
        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uristore_common::ErrorKind;

    async fn write(fs: &LocalFileSystem, path: &Path, data: &[u8], overwrite: bool) -> Result<()> {
        let mut writer = fs.open_write(path, overwrite, Some(data.len() as u64)).await?;
        writer.write_all(data).await?;
        writer.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_local_write_read() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let path = temp.path().join("test.txt");

        write(&fs, &path, b"Hello, Local!", false).await.unwrap();

        let mut reader = fs.open_read(&path).await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"Hello, Local!");
        assert_eq!(fs.len(&path).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn test_local_write_without_overwrite_keeps_content() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let path = temp.path().join("test.txt");

        write(&fs, &path, b"original", false).await.unwrap();
        let err = write(&fs, &path, b"replacement", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"original");

        write(&fs, &path, b"new", true).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_local_properties() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let props = fs.properties(&path).await.unwrap();
        assert_eq!(props["Length"], Value::from(3));
        assert_eq!(props["Name"], Value::from("data.bin"));
        assert!(props.contains_key("LastModified"));

        let dir_props = fs.properties(temp.path()).await.unwrap();
        assert!(!dir_props.contains_key("Length"));
        assert_eq!(dir_props["IsDirectory"], Value::from(true));
    }

    #[tokio::test]
    async fn test_local_list_and_delete() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        fs.create_dir_all(&temp.path().join("dir/nested")).await.unwrap();
        std::fs::write(temp.path().join("dir/file1.txt"), [1]).unwrap();
        std::fs::write(temp.path().join("dir/file2.txt"), [2]).unwrap();

        let contents = fs.list(&temp.path().join("dir")).await.unwrap();
        assert_eq!(contents.len(), 3);
        assert!(contents[2].is_dir);

        fs.delete_file(&temp.path().join("dir/file1.txt")).await.unwrap();
        assert!(!fs.exists(&temp.path().join("dir/file1.txt")).await.unwrap());
        let err = fs.delete_file(&temp.path().join("dir/file1.txt")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(fs.is_dir(&temp.path().join("dir")).await.unwrap());
        assert!(!fs.is_dir(&temp.path().join("dir/file2.txt")).await.unwrap());
        fs.delete_dir(&temp.path().join("dir")).await.unwrap();
        assert!(!fs.exists(&temp.path().join("dir")).await.unwrap());
    }
}
