//! Locked JSON key-value document on disk
//!
//! Both stores persist a single JSON object mapping string keys to records.
//! Every operation runs load -> modify -> save inside one critical section
//! guarded by a per-document tokio Mutex, so two tasks never interleave a
//! load and a save on the same file. Saves go through a temp file + rename
//! so readers never observe a partially written document.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub(crate) type Entries<V> = HashMap<String, V>;

pub(crate) struct JsonDocument<V> {
    path: PathBuf,
    lock: Mutex<()>,
    _values: PhantomData<fn() -> V>,
}

impl<V> JsonDocument<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Open the document at `path`, creating the parent directory and an
    /// empty `{}` document when the file does not exist yet.
    ///
    /// An existing file that fails to parse is an error: the store refuses
    /// to start rather than discard what is on disk.
    pub(crate) async fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Io(format!("creating {}: {e}", dir.display())))?;
        }

        let entries = load::<V>(&path).await?;
        match entries {
            Some(entries) => {
                info!(path = %path.display(), entries = entries.len(), "loaded store document");
            }
            None => {
                info!(path = %path.display(), "store document not found, creating empty document");
                write_atomic(&path, &Entries::<V>::new()).await?;
            }
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
            _values: PhantomData,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document and run `f` against it without saving.
    pub(crate) async fn read<R>(&self, f: impl FnOnce(&Entries<V>) -> R) -> Result<R> {
        let _guard = self.lock.lock().await;
        let entries = load::<V>(&self.path).await?.unwrap_or_default();
        Ok(f(&entries))
    }

    /// Load the document, let `f` mutate it, then save it.
    ///
    /// `f` returns its result plus whether the document changed; unchanged
    /// documents are not rewritten.
    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut Entries<V>) -> (R, bool)) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut entries = load::<V>(&self.path).await?.unwrap_or_default();
        let (result, changed) = f(&mut entries);
        if changed {
            write_atomic(&self.path, &entries).await?;
        }
        Ok(result)
    }
}

/// Read and parse the document. `Ok(None)` means the file does not exist.
async fn load<V: DeserializeOwned>(path: &Path) -> Result<Option<Entries<V>>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading {}: {e}", path.display()))),
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| Error::CorruptDocument(format!("{}: {e}", path.display())))
}

/// Write the document atomically with 0600 permissions.
///
/// The temp file name is derived from the target file name so that two
/// documents in the same directory never share a temp path.
async fn write_atomic<V: Serialize>(path: &Path, entries: &Entries<V>) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| Error::Io(format!("serializing {}: {e}", path.display())))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io(format!("store path {} has no file name", path.display())))?
        .to_string_lossy();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp file {}: {e}", tmp_path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting permissions on {}: {e}", tmp_path.display())))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming {}: {e}", tmp_path.display())))?;

    debug!(path = %path.display(), entries = entries.len(), "persisted store document");
    Ok(())
}
