use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use wheel_core::{Catalog, Ledger, LedgerDocument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where the ledger document lives. Both variants hold the serialized bytes,
/// so a memory store behaves exactly like a file that nobody else touches.
#[derive(Debug, Clone)]
pub enum Store {
    Memory(Option<Vec<u8>>),
    File(PathBuf),
}

impl Default for Store {
    fn default() -> Self {
        Self::memory()
    }
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(None)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Reads the ledger, falling back to a fresh one seeded from `catalog`
    /// when the document is missing, empty or unparsable. Any other read
    /// failure is returned so the caller never saves over a document it
    /// could not see.
    pub async fn load(&self, catalog: &Catalog) -> Result<Ledger, StoreError> {
        let bytes = match self {
            Self::Memory(bytes) => bytes.clone(),
            Self::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == ErrorKind::NotFound => None,
                Err(err) => {
                    tracing::error!(path = %path.display(), %err, "ledger unreadable");
                    return Err(err.into());
                }
            },
        };

        let ledger = match bytes {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                match serde_json::from_slice::<LedgerDocument>(&bytes) {
                    Ok(doc) => doc.into_ledger(catalog),
                    Err(err) => {
                        warn!(%err, "ledger corrupted, starting fresh");
                        catalog.fresh_ledger()
                    }
                }
            }
            _ => catalog.fresh_ledger(),
        };
        Ok(ledger)
    }

    pub async fn save(&mut self, ledger: &Ledger) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(ledger)?;
        match self {
            Self::Memory(bytes) => *bytes = Some(json),
            Self::File(path) => write_replacing(path, &json).await?,
        }
        Ok(())
    }

    pub async fn reset(&mut self) -> Result<(), StoreError> {
        match self {
            Self::Memory(bytes) => *bytes = None,
            Self::File(path) => match tokio::fs::remove_file(&*path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            },
        }
        Ok(())
    }
}

async fn write_replacing(path: &Path, json: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("wheel_ledger_{}.json", Uuid::new_v4()))
    }

    fn played_ledger(catalog: &Catalog) -> Ledger {
        let mut ledger = catalog.fresh_ledger();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        ledger.draw("ann", "2025-01-01T00:00:00.000Z", &mut rng).unwrap();
        ledger.draw("bob", "2025-01-01T00:00:01.000Z", &mut rng).unwrap();
        ledger
    }

    #[tokio::test]
    async fn file_round_trip_preserves_order() {
        let catalog = Catalog::builtin();
        let path = temp_path();
        let mut store = Store::file(&path);

        let ledger = played_ledger(&catalog);
        store.save(&ledger).await.unwrap();

        let loaded = Store::file(&path).load(&catalog).await.unwrap();
        assert_eq!(loaded, ledger);

        store.reset().await.unwrap();
        assert!(tokio::fs::metadata(&path).await.is_err());
        assert_eq!(store.load(&catalog).await.unwrap(), catalog.fresh_ledger());
    }

    #[tokio::test]
    async fn memory_round_trip_and_reset() {
        let catalog = Catalog::builtin();
        let mut store = Store::memory();
        assert_eq!(store.load(&catalog).await.unwrap(), catalog.fresh_ledger());

        let ledger = played_ledger(&catalog);
        store.save(&ledger).await.unwrap();
        assert_eq!(store.load(&catalog).await.unwrap(), ledger);

        store.reset().await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.load(&catalog).await.unwrap(), catalog.fresh_ledger());
    }

    #[tokio::test]
    async fn corrupt_or_empty_document_starts_fresh() {
        let catalog = Catalog::builtin();
        let path = temp_path();

        tokio::fs::write(&path, b"{ not json").await.unwrap();
        assert_eq!(Store::file(&path).load(&catalog).await.unwrap(), catalog.fresh_ledger());

        tokio::fs::write(&path, b"  \n").await.unwrap();
        assert_eq!(Store::file(&path).load(&catalog).await.unwrap(), catalog.fresh_ledger());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn unreadable_document_is_an_error_not_a_fresh_start() {
        let catalog = Catalog::builtin();
        // reading a directory fails with something other than NotFound
        let dir = std::env::temp_dir().join(format!("wheel_dir_{}", Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await.unwrap();

        let err = Store::file(&dir).load(&catalog).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        let _ = tokio::fs::remove_dir(&dir).await;
    }
}
