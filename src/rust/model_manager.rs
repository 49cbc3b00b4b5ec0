use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";
const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Invalid model identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Manifest error: {0}")]
    ManifestError(#[from] serde_json::Error),
    #[error("Model verification failed")]
    VerificationFailed,
}

/// SHA-256 digests recorded when a hub model was downloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadManifest {
    pub repo_id: String,
    pub files: BTreeMap<String, String>,
}

/// Caches hub-hosted models (tokenizer plus ONNX graph) on local disk.
///
/// Each repository is stored under `<models_dir>/<owner>--<name>/` next to a
/// `manifest.json` holding the SHA-256 of every file as it was downloaded.
#[derive(Debug, Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    hub_endpoint: String,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("TONAL_CACHE") {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("tonal").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("tonal").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("tonal").join("models")
    }

    /// Hub base URL, overridable through `TONAL_HUB_ENDPOINT`.
    pub fn get_default_hub_endpoint() -> String {
        env::var("TONAL_HUB_ENDPOINT").unwrap_or_else(|_| DEFAULT_HUB_ENDPOINT.to_string())
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            hub_endpoint: Self::get_default_hub_endpoint(),
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn with_hub_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.hub_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Rejects identifiers that would escape the cache directory.
    pub fn validate_repo_id(repo_id: &str) -> Result<(), ModelError> {
        let valid = !repo_id.is_empty()
            && repo_id
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != "..")
            && !repo_id.contains('\\');
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidIdentifier(repo_id.to_string()))
        }
    }

    pub fn get_model_dir(&self, repo_id: &str) -> PathBuf {
        self.models_dir.join(repo_id.replace('/', "--"))
    }

    pub fn get_model_path(&self, repo_id: &str) -> PathBuf {
        self.get_model_dir(repo_id).join(MODEL_FILE)
    }

    pub fn get_tokenizer_path(&self, repo_id: &str) -> PathBuf {
        self.get_model_dir(repo_id).join(TOKENIZER_FILE)
    }

    fn get_manifest_path(&self, repo_id: &str) -> PathBuf {
        self.get_model_dir(repo_id).join(MANIFEST_FILE)
    }

    fn file_url(&self, repo_id: &str, remote_path: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.hub_endpoint, repo_id, remote_path)
    }

    pub fn is_model_downloaded(&self, repo_id: &str) -> bool {
        let model_path = self.get_model_path(repo_id);
        let tokenizer_path = self.get_tokenizer_path(repo_id);
        log::debug!("Checking if model {} is downloaded:", repo_id);
        log::debug!("  Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!("  Tokenizer path: {:?} (exists: {})", tokenizer_path, tokenizer_path.exists());
        model_path.exists() && tokenizer_path.exists()
    }

    pub async fn download_model(&self, repo_id: &str) -> Result<(), ModelError> {
        Self::validate_repo_id(repo_id)?;
        let _lock = self.download_lock.lock().await;

        let model_dir = self.get_model_dir(repo_id);
        log::info!("Creating model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let mut manifest = DownloadManifest {
            repo_id: repo_id.to_string(),
            files: BTreeMap::new(),
        };

        let targets = [
            (TOKENIZER_FILE, TOKENIZER_FILE, self.get_tokenizer_path(repo_id)),
            (MODEL_FILE, "onnx/model.onnx", self.get_model_path(repo_id)),
        ];
        for (name, remote_path, path) in targets {
            let url = self.file_url(repo_id, remote_path);
            match self.download_file(&url, &path, name).await {
                Ok(hash) => {
                    manifest.files.insert(name.to_string(), hash);
                }
                Err(e) => {
                    log::error!("Failed to download {} file: {}", name, e);
                    // Cleanup on failure
                    let _ = self.remove_download(repo_id);
                    return Err(e);
                }
            }
        }

        fs::write(self.get_manifest_path(repo_id), serde_json::to_vec_pretty(&manifest)?)?;
        log::info!("Model {} ready to use", repo_id);
        Ok(())
    }

    /// Downloads `url` to `path` and returns the SHA-256 of the written bytes.
    async fn download_file(&self, url: &str, path: &Path, file_type: &str) -> Result<String, ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        log::debug!("Download response status: {}", response.status());
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = hash_bytes(&bytes);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;

        // Verify after writing
        if !self.verify_file(path, &hash)? {
            return Err(ModelError::VerificationFailed);
        }
        log::info!("{} file downloaded and verified successfully", file_type);
        Ok(hash)
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        let bytes = fs::read(path)?;
        let hash = hash_bytes(&bytes);
        log::debug!("Verifying {:?}: calculated {}, expected {}", path, hash, expected_hash);
        Ok(hash == expected_hash)
    }

    pub fn read_manifest(&self, repo_id: &str) -> Result<DownloadManifest, ModelError> {
        let path = self.get_manifest_path(repo_id);
        if !path.exists() {
            return Err(ModelError::NotDownloaded(repo_id.to_string()));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Checks every cached file against the digests recorded at download time.
    pub fn verify_model(&self, repo_id: &str) -> Result<bool, ModelError> {
        if !self.is_model_downloaded(repo_id) {
            log::info!("Model {} is not downloaded", repo_id);
            return Ok(false);
        }
        let manifest = match self.read_manifest(repo_id) {
            Ok(manifest) => manifest,
            Err(ModelError::NotDownloaded(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let dir = self.get_model_dir(repo_id);
        for name in [MODEL_FILE, TOKENIZER_FILE] {
            let ok = match manifest.files.get(name) {
                Some(expected) => self.verify_file(&dir.join(name), expected)?,
                None => false,
            };
            log::info!("  {} hash verification: {}", name, ok);
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn remove_download(&self, repo_id: &str) -> Result<(), ModelError> {
        for path in [
            self.get_model_path(repo_id),
            self.get_tokenizer_path(repo_id),
            self.get_manifest_path(repo_id),
        ] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified.
    /// If the model doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_model_downloaded(&self, repo_id: &str) -> Result<PathBuf, ModelError> {
        log::info!("Checking if model {} is downloaded...", repo_id);
        if !self.is_model_downloaded(repo_id) {
            log::info!("Model not found, downloading...");
            self.download_model(repo_id).await?;
        } else if !self.verify_model(repo_id)? {
            log::warn!("Model verification failed, re-downloading...");
            self.remove_download(repo_id)?;
            self.download_model(repo_id).await?;
        } else {
            log::info!("Model verification successful");
        }
        Ok(self.get_model_dir(repo_id))
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
