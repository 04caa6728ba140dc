//! Credential store
//!
//! The refresh credential lives in a one-line `KEY=value` file that is the
//! source of truth at startup. Every write goes through a single worker task
//! so a rotation can never interleave with another write.

use crate::config::CREDENTIAL_KEY;
use crate::{Error, Result, TokenRotation};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Write `initial` to `path` unless a file is already there.
///
/// Returns true when a new file was written.
pub async fn ensure(path: &Path, initial: &str) -> Result<bool> {
    if tokio::fs::try_exists(path).await? {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(path, format!("{}={}", CREDENTIAL_KEY, initial)).await?;
    Ok(true)
}

/// Replace the first occurrence of `old` with `new` in the stored value.
///
/// Only the text after `RING_2FA_REFRESH_TOKEN=` is searched, never the key.
/// An absent or empty `old` is a no-op: the file already holds the value
/// written by [`ensure`]. Returns true when the file was rewritten.
pub async fn apply_rotation(path: &Path, old: Option<&str>, new: &str) -> Result<bool> {
    let old = match old {
        Some(old) if !old.is_empty() => old,
        _ => return Ok(false),
    };

    let contents = tokio::fs::read_to_string(path).await?;
    let prefix = format!("{}=", CREDENTIAL_KEY);

    let mut replaced = false;
    let mut updated = String::with_capacity(contents.len() + new.len());
    for line in contents.split_inclusive('\n') {
        match line.strip_prefix(&prefix) {
            Some(value) if !replaced && value.contains(old) => {
                updated.push_str(&prefix);
                updated.push_str(&value.replacen(old, new, 1));
                replaced = true;
            }
            _ => updated.push_str(line),
        }
    }

    if !replaced {
        return Err(Error::CredentialStore(format!(
            "stored credential in {} does not match the rotated value",
            path.display()
        )));
    }

    tokio::fs::write(path, updated).await?;
    Ok(true)
}

/// Read the stored credential value
pub async fn load(path: &Path) -> Result<Option<String>> {
    let contents = tokio::fs::read_to_string(path).await?;

    for item in dotenvy::from_read_iter(contents.as_bytes()) {
        let (key, value) = item.map_err(|e| Error::CredentialStore(e.to_string()))?;
        if key == CREDENTIAL_KEY {
            return Ok(Some(value));
        }
    }

    Ok(None)
}

enum Job {
    Ensure {
        initial: String,
        ack: oneshot::Sender<Result<bool>>,
    },
    Rotate {
        rotation: TokenRotation,
        ack: oneshot::Sender<Result<bool>>,
    },
}

/// Sequential writer for the credential file
#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    jobs: mpsc::UnboundedSender<Job>,
}

impl CredentialStore {
    /// Start the writer task for `path`
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker_path = path.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Ensure { initial, ack } => {
                        let _ = ack.send(ensure(&worker_path, &initial).await);
                    }
                    Job::Rotate { rotation, ack } => {
                        let _ = ack.send(rotate(&worker_path, rotation).await);
                    }
                }
            }
            debug!(path = %worker_path.display(), "Credential writer stopped");
        });

        Self { path, jobs }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue an [`ensure`] and wait for it
    pub async fn ensure(&self, initial: &str) -> Result<bool> {
        let (ack, done) = oneshot::channel();
        self.submit(Job::Ensure {
            initial: initial.to_string(),
            ack,
        })?;
        Self::wait(done).await
    }

    /// Queue a rotation and wait for it
    pub async fn rotate(&self, rotation: TokenRotation) -> Result<bool> {
        let (ack, done) = oneshot::channel();
        self.submit(Job::Rotate { rotation, ack })?;
        Self::wait(done).await
    }

    /// Read the stored credential
    pub async fn load(&self) -> Result<Option<String>> {
        load(&self.path).await
    }

    /// Seed the file from config on first run, then return the stored value.
    ///
    /// The file wins over `initial` once it exists: rotations since the
    /// first run live only there.
    pub async fn bootstrap(&self, initial: &str) -> Result<String> {
        if self.ensure(initial).await? {
            info!(path = %self.path.display(), "Credential file created");
        }
        self.load().await?.ok_or(Error::MissingCredential)
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.jobs
            .send(job)
            .map_err(|_| Error::CredentialStore("writer task is gone".to_string()))
    }

    async fn wait(done: oneshot::Receiver<Result<bool>>) -> Result<bool> {
        done.await
            .map_err(|_| Error::CredentialStore("writer task dropped the request".to_string()))?
    }
}

/// Apply a rotation using whatever is stored now as the search target
async fn rotate(path: &Path, rotation: TokenRotation) -> Result<bool> {
    info!("Refresh Token Updated");

    if rotation.old.as_deref().map_or(true, str::is_empty) {
        return Ok(false);
    }

    let stored = load(path).await?;
    let target = match stored {
        Some(ref current) if current == &rotation.new => return Ok(false),
        Some(ref current) => {
            if Some(current.as_str()) != rotation.old.as_deref() {
                warn!(path = %path.display(), "Stored credential differs from rotated value, replacing stored value");
            }
            Some(current.as_str())
        }
        None => rotation.old.as_deref(),
    };

    apply_rotation(path, target, &rotation.new).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_ensure_writes_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        assert!(ensure(&path, "first").await.unwrap());
        assert!(!ensure(&path, "second").await.unwrap());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "RING_2FA_REFRESH_TOKEN=first");
        assert_eq!(load(&path).await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_ensure_then_rotate_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        ensure(&path, "old-token").await.unwrap();
        assert!(apply_rotation(&path, Some("old-token"), "new-token").await.unwrap());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("new-token"));
        assert!(!contents.contains("old-token"));
    }

    #[tokio::test]
    async fn test_rotation_never_touches_the_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        ensure(&path, "TOKEN").await.unwrap();
        assert!(apply_rotation(&path, Some("TOKEN"), "fresh").await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "RING_2FA_REFRESH_TOKEN=fresh");

        assert!(apply_rotation(&path, Some("f"), "F").await.unwrap());
        assert_eq!(load(&path).await.unwrap().as_deref(), Some("Fresh"));

        // Matches only inside the key are not a match
        assert!(apply_rotation(&path, Some("REFRESH"), "x").await.is_err());
        assert_eq!(load(&path).await.unwrap().as_deref(), Some("Fresh"));
    }

    #[tokio::test]
    async fn test_rotation_without_old_value_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        ensure(&path, "kept").await.unwrap();
        assert!(!apply_rotation(&path, None, "ignored").await.unwrap());
        assert!(!apply_rotation(&path, Some(""), "ignored").await.unwrap());
        assert_eq!(load(&path).await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_store_rotations_are_monotonic() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::spawn(dir.path().join(".env"));

        assert!(store.ensure("t0").await.unwrap());
        assert!(store
            .rotate(TokenRotation { old: Some("t0".into()), new: "t1".into() })
            .await
            .unwrap());

        // Provider reports a stale old value; the stored one is replaced anyway
        assert!(store
            .rotate(TokenRotation { old: Some("t0".into()), new: "t2".into() })
            .await
            .unwrap());

        assert_eq!(store.load().await.unwrap().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_bootstrap_prefers_stored_value() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::spawn(dir.path().join(".env"));

        assert_eq!(store.bootstrap("from-config").await.unwrap(), "from-config");
        store
            .rotate(TokenRotation { old: Some("from-config".into()), new: "rotated".into() })
            .await
            .unwrap();

        assert_eq!(store.bootstrap("from-config").await.unwrap(), "rotated");
    }

    #[tokio::test]
    async fn test_store_first_rotation_is_noop() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::spawn(dir.path().join(".env"));

        store.ensure("fresh").await.unwrap();
        let rewritten = store
            .rotate(TokenRotation { old: None, new: "fresh".into() })
            .await
            .unwrap();

        assert!(!rewritten);
        assert_eq!(store.load().await.unwrap().as_deref(), Some("fresh"));
    }
}
