//! Filesystem storage for persisted credentials.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use doccheck_core::error::StoreError;
use doccheck_core::traits::{CredentialStore, StoreKey};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// On-disk layout: a flat JSON object keyed by [`StoreKey::as_str`].
type Entries = BTreeMap<String, String>;

/// A [`CredentialStore`] persisted as a single JSON file.
///
/// Every mutation rewrites the whole file through a temp file and an atomic
/// rename, under an exclusive lock on a sibling `.lock` file, so concurrent
/// processes never see a torn token pair.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by `path` (created lazily on first write).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn temp_path(&self) -> PathBuf {
        let name = format!(".{}.tmp", Uuid::new_v4().simple());
        match self.path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Take the inter-process lock. Released when the handle drops.
    fn lock(&self, exclusive: bool) -> Result<File, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;

        if exclusive {
            FileExt::lock_exclusive(&lock_file)?;
        } else {
            FileExt::lock_shared(&lock_file)?;
        }
        Ok(lock_file)
    }

    fn read_entries(&self) -> Result<Entries, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Entries::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_entries(&self, entries: &Entries) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(entries)?;
        let temp_path = self.temp_path();

        let result = (|| {
            let mut file = File::create(&temp_path)?;

            #[cfg(unix)]
            file.set_permissions(fs::Permissions::from_mode(0o600))?;

            file.write_all(content.as_bytes())?;
            file.sync_data()?;
            fs::rename(&temp_path, &self.path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        trace!(path = %self.path.display(), keys = entries.len(), "Wrote credential store");
        Ok(())
    }

    /// Read-modify-write under the exclusive lock.
    fn update(&self, apply: impl FnOnce(&mut Entries)) -> Result<(), StoreError> {
        let lock = self.lock(true)?;
        let mut entries = match self.read_entries() {
            Err(err @ StoreError::Corrupt { .. }) => {
                warn!(path = %self.path.display(), error = %err, "Replacing unreadable credential store");
                Entries::new()
            }
            other => other?,
        };
        apply(&mut entries);
        let result = self.write_entries(&entries);
        FileExt::unlock(&lock)?;
        result
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let lock = self.lock(false)?;
        let entries = self.read_entries();
        FileExt::unlock(&lock)?;

        Ok(entries?.get(key.as_str()).cloned())
    }

    #[instrument(skip(self, entries), fields(path = %self.path.display()))]
    fn put(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError> {
        debug!(keys = ?entries.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), "Storing credentials");
        self.update(|stored| {
            for (key, value) in entries {
                stored.insert(key.as_str().to_string(), value.clone());
            }
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }

        debug!("Removing credentials");
        self.update(|stored| {
            for key in keys {
                stored.remove(key.as_str());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("session.json"))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
        store.remove(&StoreKey::ALL).unwrap();
    }

    #[test]
    fn entries_survive_a_new_handle() {
        let dir = TempDir::new().unwrap();
        store(&dir)
            .put(&[
                (StoreKey::AccessToken, "T1".into()),
                (StoreKey::RefreshToken, "R1".into()),
            ])
            .unwrap();

        let reopened = store(&dir);
        assert_eq!(reopened.get(StoreKey::AccessToken).unwrap().as_deref(), Some("T1"));
        assert_eq!(reopened.get(StoreKey::RefreshToken).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn keys_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put(&[
                (StoreKey::AccessToken, "T1".into()),
                (StoreKey::RefreshToken, "R1".into()),
                (StoreKey::User, "{}".into()),
            ])
            .unwrap();

        store.remove(&[StoreKey::User]).unwrap();

        assert_eq!(store.get(StoreKey::User).unwrap(), None);
        assert_eq!(store.get(StoreKey::AccessToken).unwrap().as_deref(), Some("T1"));
    }

    #[test]
    fn rotation_replaces_both_tokens() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put(&[
                (StoreKey::AccessToken, "T1".into()),
                (StoreKey::RefreshToken, "R1".into()),
            ])
            .unwrap();
        store
            .put(&[
                (StoreKey::AccessToken, "T2".into()),
                (StoreKey::RefreshToken, "R2".into()),
            ])
            .unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let on_disk: Entries = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.get("access_token").map(String::as_str), Some("T2"));
        assert_eq!(on_disk.get("refresh_token").map(String::as_str), Some("R2"));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put(&[(StoreKey::AccessToken, "T1".into())]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "not json").unwrap();

        let err = store.get(StoreKey::AccessToken).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn corrupt_file_is_replaced_on_write() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{not json").unwrap();

        store
            .put(&[
                (StoreKey::AccessToken, "T1".into()),
                (StoreKey::RefreshToken, "R1".into()),
            ])
            .unwrap();

        assert_eq!(store.get(StoreKey::AccessToken).unwrap().as_deref(), Some("T1"));
        assert_eq!(store.get(StoreKey::RefreshToken).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn corrupt_file_is_replaced_on_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{not json").unwrap();

        store.remove(&[StoreKey::AccessToken]).unwrap();

        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put(&[(StoreKey::AccessToken, "T1".into())]).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
