//! Artifact provisioning
//!
//! Brings the local index into existence before the service answers
//! queries. The pipeline runs once, strictly in order:
//!
//! 1. Skip everything when the index is already on disk
//! 2. Resolve the artifact version (following `latest-manifest.json`)
//! 3. Fetch the version manifest and its plaintext digest
//! 4. Download the encrypted artifact into scratch space
//! 5. Decrypt it
//! 6. Verify the plaintext digest, when the manifest has one
//! 7. Extract into the index directory
//! 8. Check the expected layout, then flip readiness
//!
//! Any failure aborts the run and leaves the process not ready.

mod archive;
mod crypto;
mod manifest;
mod object_store;

pub use archive::*;
pub use crypto::*;
pub use manifest::*;
pub use object_store::*;

use crate::config::{ArtifactConfig, Config, IndexConfig, StorageConfig, LATEST_VERSION};
use crate::error::{Error, Result};
use crate::lifecycle::Readiness;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Pipeline stage, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckLocalPresence,
    ResolveVersion,
    FetchManifest,
    Download,
    Decrypt,
    VerifyChecksum,
    Extract,
    VerifyLayout,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckLocalPresence => "check_local_presence",
            Stage::ResolveVersion => "resolve_version",
            Stage::FetchManifest => "fetch_manifest",
            Stage::Download => "download",
            Stage::Decrypt => "decrypt",
            Stage::VerifyChecksum => "verify_checksum",
            Stage::Extract => "extract",
            Stage::VerifyLayout => "verify_layout",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the index came to be ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// Both index paths already existed; nothing was downloaded
    AlreadyPresent,
    /// The artifact for `version` was downloaded and installed
    Installed { version: String },
}

/// Runs the provisioning pipeline
pub struct Provisioner {
    index: IndexConfig,
    storage: StorageConfig,
    artifact: ArtifactConfig,
    object_store: Option<Arc<dyn ObjectStore>>,
    decryptor: Arc<dyn Decryptor>,
}

impl Provisioner {
    pub fn new(config: &Config) -> Self {
        Self {
            index: config.index.clone(),
            storage: config.storage.clone(),
            artifact: config.artifact.clone(),
            object_store: None,
            decryptor: Arc::new(AesCbcDecryptor::new()),
        }
    }

    /// Use `store` instead of building an S3 client from configuration
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    fn object_store(&self) -> Result<Arc<dyn ObjectStore>> {
        match &self.object_store {
            Some(store) => Ok(Arc::clone(store)),
            None => Ok(Arc::new(S3Client::from_config(&self.storage)?)),
        }
    }

    fn index_present(&self) -> bool {
        self.index.qdrant_path().exists() && self.index.state_db_path().exists()
    }

    /// Run the pipeline and mark `readiness` on success
    pub async fn run(&self, readiness: &Readiness) -> Result<ProvisionOutcome> {
        tokio::fs::create_dir_all(&self.index.dir)
            .await
            .map_err(|e| Error::from(e).at_stage(Stage::CheckLocalPresence))?;

        if self.index_present() {
            info!(
                "Index already present at {}, skipping download",
                self.index.dir.display()
            );
            readiness.mark_ready(self.artifact.version.clone());
            return Ok(ProvisionOutcome::AlreadyPresent);
        }

        let store = self.object_store()?;
        if self.artifact.passphrase.is_empty() {
            return Err(Error::Config(
                "RAG_ARTIFACT_ENCRYPTION_KEY is required for decryption".to_string(),
            ));
        }

        let location = self
            .resolve_version(store.as_ref())
            .await
            .map_err(|e| e.at_stage(Stage::ResolveVersion))?;
        info!("Loading artifact version: {}", location.version);

        let manifest = self
            .fetch_manifest(store.as_ref(), &location)
            .await
            .map_err(|e| e.at_stage(Stage::FetchManifest))?;

        // Removed on drop, whichever way this function returns
        let scratch = TempDir::new().map_err(|e| Error::from(e).at_stage(Stage::Download))?;
        let encrypted = scratch.path().join(location.encrypted_file_name());
        let decrypted = scratch.path().join(location.decrypted_file_name());

        info!(
            "Downloading {} ({})...",
            location.artifact_key, self.storage.bucket
        );
        let size = store
            .download_file(&self.storage.bucket, &location.artifact_key, &encrypted)
            .await
            .map_err(|e| e.at_stage(Stage::Download))?;
        info!("Downloaded {} bytes", size);

        info!("Decrypting...");
        self.decrypt(&encrypted, &decrypted)
            .await
            .map_err(|e| e.at_stage(Stage::Decrypt))?;

        match manifest.expected_digest() {
            Some(expected) => {
                info!("Verifying SHA-256 checksum...");
                let path = decrypted.clone();
                let expected = expected.to_string();
                blocking(move || verify_sha256(&path, &expected))
                    .await
                    .map_err(|e| e.at_stage(Stage::VerifyChecksum))?;
                info!("Checksum verified");
            }
            None => warn!(
                "Manifest {} has no plaintext digest, skipping checksum verification",
                location.manifest_key
            ),
        }

        info!("Extracting to {}...", self.index.dir.display());
        let (archive_path, dest) = (decrypted.clone(), self.index.dir.clone());
        blocking(move || extract_tar_gz(&archive_path, &dest))
            .await
            .map_err(|e| e.at_stage(Stage::Extract))?;

        drop(scratch);

        verify_layout(&self.index).map_err(|e| e.at_stage(Stage::VerifyLayout))?;

        info!(
            "Artifact loaded: version={}, qdrant={}, state_db={}",
            location.version,
            self.index.qdrant_path().display(),
            self.index.state_db_path().display()
        );
        readiness.mark_ready(location.version.clone());

        Ok(ProvisionOutcome::Installed {
            version: location.version,
        })
    }

    async fn resolve_version(&self, store: &dyn ObjectStore) -> Result<ArtifactLocation> {
        let version = self.artifact.version.trim();
        if version != LATEST_VERSION {
            return Ok(ArtifactLocation::for_version(version));
        }

        info!("Resolving latest artifact version...");
        let body = store
            .get_object(&self.storage.bucket, LATEST_MANIFEST_KEY)
            .await?;
        let latest: LatestManifest = serde_json::from_slice(&body)?;
        Ok(ArtifactLocation::from_latest(latest))
    }

    async fn fetch_manifest(
        &self,
        store: &dyn ObjectStore,
        location: &ArtifactLocation,
    ) -> Result<ArtifactManifest> {
        debug!("Fetching manifest {}", location.manifest_key);
        let body = store
            .get_object(&self.storage.bucket, &location.manifest_key)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn decrypt(&self, input: &Path, output: &Path) -> Result<()> {
        let decryptor = Arc::clone(&self.decryptor);
        let passphrase = self.artifact.passphrase.clone();
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        blocking(move || decryptor.decrypt(&input, &output, passphrase.expose())).await
    }
}

/// Both index paths must exist after extraction
pub fn verify_layout(index: &IndexConfig) -> Result<()> {
    for expected in [index.qdrant_path(), index.state_db_path()] {
        if !expected.exists() {
            return Err(Error::Extract(format!(
                "Expected {} after extraction, not found",
                expected.display()
            )));
        }
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {}", e)))?
}
