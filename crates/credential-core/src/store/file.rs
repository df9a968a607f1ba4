//! File-backed credential store
//!
//! Keeps clients and revoked tokens in a single JSON document. All writes
//! use atomic temp-file + rename to prevent corruption on crash. A tokio
//! Mutex serializes writers so concurrent registrations and revocations
//! never interleave partial documents.
//!
//! Suitable for single-instance deployments; use the Postgres store when
//! several instances share state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ClientRecord, CredentialStore, StoreError, StoreFuture};

/// On-disk document layout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    clients: BTreeMap<String, StoredClient>,
    #[serde(default)]
    revoked_tokens: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredClient {
    secret_digest: String,
    is_admin: bool,
}

/// JSON-file credential store.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<Document>,
}

impl FileStore {
    /// Load the store from the given path.
    ///
    /// If the file doesn't exist it is created as an empty document (cold
    /// start with no clients). A bootstrap admin can then be seeded at
    /// startup.
    pub async fn load(path: PathBuf) -> super::Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Unavailable(format!("reading store file: {e}")))?;
            let document: Document = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Unavailable(format!("parsing store file: {e}")))?;
            info!(
                path = %path.display(),
                clients = document.clients.len(),
                revoked = document.revoked_tokens.len(),
                "loaded credential store"
            );
            document
        } else {
            info!(path = %path.display(), "store file not found, starting with empty store");
            let document = Document::default();
            write_atomic(&path, &document).await?;
            document
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn find_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<ClientRecord>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.clients.get(client_id).map(|c| ClientRecord {
                client_id: client_id.to_owned(),
                secret_digest: c.secret_digest.clone(),
                is_admin: c.is_admin,
            }))
        })
    }

    fn insert_client(&self, client: ClientRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.clients.contains_key(&client.client_id) {
                return Err(StoreError::Conflict);
            }

            // Persist a candidate first so a failed write leaves memory untouched.
            let mut next = state.clone();
            next.clients.insert(
                client.client_id.clone(),
                StoredClient {
                    secret_digest: client.secret_digest,
                    is_admin: client.is_admin,
                },
            );
            write_atomic(&self.path, &next).await?;
            *state = next;

            debug!(client_id = client.client_id, "inserted client");
            Ok(())
        })
    }

    fn insert_revocation<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.revoked_tokens.contains(token) {
                return Ok(());
            }

            let mut next = state.clone();
            next.revoked_tokens.insert(token.to_owned());
            write_atomic(&self.path, &next).await?;
            *state = next;
            Ok(())
        })
    }

    fn is_revoked<'a>(&'a self, token: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.revoked_tokens.contains(token))
        })
    }
}

/// Write the document to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. The temporary file is created with mode 0600 (owner
/// read/write only) before any content is written, since the file holds
/// secret digests and revoked bearer tokens.
async fn write_atomic(path: &Path, document: &Document) -> super::Result<()> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| StoreError::Unavailable(format!("serializing store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Unavailable("store path has no parent directory".into()))?;

    let tmp_path = temp_path(dir);

    // A leftover temp file from a crash keeps its old mode when reopened.
    match tokio::fs::remove_file(&tmp_path).await {
        Ok(()) => debug!(path = %tmp_path.display(), "removed stale temp store file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(StoreError::Unavailable(format!(
                "removing stale temp store file: {e}"
            )));
        }
    }

    write_private(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::Unavailable(format!("writing temp store file: {e}")))?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::Unavailable(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted credential store");
    Ok(())
}

fn temp_path(dir: &Path) -> PathBuf {
    dir.join(format!(".credential-store.tmp.{}", std::process::id()))
}

/// Create `path` owner-only and write `contents` to it.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use tokio::fs::OpenOptions;
    use tokio::io::AsyncWriteExt;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}
