use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log;
use sha2::{Digest, Sha256};

use crate::classifier::{ArtifactBundle, BUNDLE_FORMAT_VERSION};

const BUNDLE_FILE: &str = "bundle.json";
const CHECKSUM_FILE: &str = "bundle.sha256";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Bundle not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Incompatible bundle format: expected version {expected}, found {found}")]
    IncompatibleFormat { expected: u32, found: u32 },
}

/// On-disk store of named artifact bundles.
///
/// Each bundle lives in its own directory as `bundle.json` with a SHA-256
/// sidecar `bundle.sha256`; the checksum is verified on every load.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    bundles_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a new ArtifactStore with the default bundles directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_bundles_dir())
    }

    /// Returns the default bundles directory path
    pub fn get_default_bundles_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("LEXCARF_HOME") {
            return PathBuf::from(path).join("bundles");
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("lexcarf").join("bundles");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("lexcarf").join("bundles");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("lexcarf").join("bundles")
    }

    pub fn new<P: AsRef<Path>>(bundles_dir: P) -> io::Result<Self> {
        let bundles_dir = bundles_dir.as_ref().to_path_buf();
        fs::create_dir_all(&bundles_dir)?;
        Ok(Self { bundles_dir })
    }

    pub fn bundles_dir(&self) -> &Path {
        &self.bundles_dir
    }

    pub fn bundle_path(&self, name: &str) -> PathBuf {
        self.bundles_dir.join(name).join(BUNDLE_FILE)
    }

    pub fn checksum_path(&self, name: &str) -> PathBuf {
        self.bundles_dir.join(name).join(CHECKSUM_FILE)
    }

    pub fn is_present(&self, name: &str) -> bool {
        let bundle_path = self.bundle_path(name);
        let checksum_path = self.checksum_path(name);
        log::debug!("Checking if bundle '{}' is present:", name);
        log::debug!("  Bundle path: {:?} (exists: {})", bundle_path, bundle_path.exists());
        log::debug!("  Checksum path: {:?} (exists: {})", checksum_path, checksum_path.exists());
        bundle_path.exists() && checksum_path.exists()
    }

    /// Writes the bundle and its checksum, replacing any previous version.
    pub fn save(&self, name: &str, bundle: &ArtifactBundle) -> Result<PathBuf, ArtifactError> {
        let bundle_dir = self.bundles_dir.join(name);
        log::info!("Saving bundle '{}' to {:?}", name, bundle_dir);
        fs::create_dir_all(&bundle_dir)?;

        let bytes = serde_json::to_vec(bundle)?;
        let hash = sha256_hex(&bytes);

        let bundle_path = self.bundle_path(name);
        fs::write(&bundle_path, &bytes)?;
        fs::write(self.checksum_path(name), format!("{}\n", hash))?;

        log::info!("Wrote {} bytes (sha256 {})", bytes.len(), hash);
        Ok(bundle_path)
    }

    /// Loads a bundle after verifying its checksum and format version.
    pub fn load(&self, name: &str) -> Result<ArtifactBundle, ArtifactError> {
        if !self.is_present(name) {
            return Err(ArtifactError::NotFound(format!(
                "{} (looked in {:?})",
                name,
                self.bundles_dir.join(name)
            )));
        }

        let bytes = fs::read(self.bundle_path(name))?;
        self.check_hash(name, &bytes)?;

        let bundle: ArtifactBundle = serde_json::from_slice(&bytes)?;
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            log::error!(
                "Bundle '{}' has format version {}, this build reads version {}",
                name,
                bundle.format_version,
                BUNDLE_FORMAT_VERSION
            );
            return Err(ArtifactError::IncompatibleFormat {
                expected: BUNDLE_FORMAT_VERSION,
                found: bundle.format_version,
            });
        }

        log::info!(
            "Loaded bundle '{}': profile {}, {} text features, denylist {}",
            name,
            bundle.profile,
            bundle.vectorizer.dimension(),
            bundle.denylist_version
        );
        Ok(bundle)
    }

    /// Returns whether the stored bundle matches its checksum sidecar.
    pub fn verify(&self, name: &str) -> Result<bool, ArtifactError> {
        if !self.is_present(name) {
            log::info!("Bundle '{}' is not present", name);
            return Ok(false);
        }
        let bytes = fs::read(self.bundle_path(name))?;
        match self.check_hash(name, &bytes) {
            Ok(()) => Ok(true),
            Err(ArtifactError::HashMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn remove(&self, name: &str) -> Result<(), ArtifactError> {
        let bundle_path = self.bundle_path(name);
        let checksum_path = self.checksum_path(name);

        if bundle_path.exists() {
            fs::remove_file(&bundle_path)?;
        }
        if checksum_path.exists() {
            fs::remove_file(&checksum_path)?;
        }
        log::info!("Removed bundle '{}'", name);
        Ok(())
    }

    fn check_hash(&self, name: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let expected = fs::read_to_string(self.checksum_path(name))?;
        let expected = expected.split_whitespace().next().unwrap_or_default().to_lowercase();
        let actual = sha256_hex(bytes);
        log::debug!("Calculated hash: {}", actual);
        log::debug!("Expected hash:   {}", expected);
        if actual != expected {
            log::error!("Bundle '{}' hash mismatch: expected {}, got {}", name, expected, actual);
            return Err(ArtifactError::HashMismatch { expected, actual });
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
