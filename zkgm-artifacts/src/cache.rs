//! On-disk artifact cache keyed by circuit identifier.
//!
//! Layout: `{cache_dir}/{family}/{version}/{file}` where `{file}` is the last
//! segment of the download URL, plus a `manifest.json` with the blake3 digest
//! of each file as downloaded.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::fs;
use tracing::{debug, info, warn};
use zkgm_common::{
    config::ArtifactSettings, hash_bytes_hex, ArtifactBundle, ArtifactFile, CircuitIdentifier,
};

use crate::{
    error::{ArtifactError, Result},
    fetcher::{ArtifactFetcher, HttpFetcher},
};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CIRCUIT_BINARY_EXT: &str = "wasm";
pub const PROVING_KEY_EXT: &str = "zkey";

/// Download locations of one artifact bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactUrls {
    pub circuit_binary: String,
    pub proving_key: String,
}

/// Digests recorded for a cached bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub circuit: CircuitIdentifier,
    pub circuit_binary: ArtifactFile,
    pub proving_key: ArtifactFile,
}

pub struct ArtifactCache<F = HttpFetcher> {
    base_url: String,
    cache_dir: PathBuf,
    fetcher: F,
}

impl ArtifactCache<HttpFetcher> {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(base_url, cache_dir, HttpFetcher::new())
    }

    pub fn from_settings(settings: &ArtifactSettings) -> Self {
        Self::new(settings.base_url.clone(), settings.cache_dir.clone())
    }
}

impl<F: ArtifactFetcher> ArtifactCache<F> {
    pub fn with_fetcher(
        base_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        fetcher: F,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            fetcher,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// `{base}/{family}/{version}/{family}-{p1}-{p2}….{wasm,zkey}`
    pub fn urls(&self, id: &CircuitIdentifier) -> ArtifactUrls {
        let prefix = format!("{}/{}/{}/{}", self.base_url, id.family, id.version, id.file_stem());
        ArtifactUrls {
            circuit_binary: format!("{}.{}", prefix, CIRCUIT_BINARY_EXT),
            proving_key: format!("{}.{}", prefix, PROVING_KEY_EXT),
        }
    }

    pub fn bundle_dir(&self, id: &CircuitIdentifier) -> PathBuf {
        self.cache_dir.join(&id.family).join(&id.version)
    }

    /// Where the bundle for `id` lives, whether or not it has been downloaded.
    pub fn bundle_paths(&self, id: &CircuitIdentifier) -> ArtifactBundle {
        let urls = self.urls(id);
        let dir = self.bundle_dir(id);
        ArtifactBundle {
            circuit_binary: dir.join(url_file_name(&urls.circuit_binary)),
            proving_key: dir.join(url_file_name(&urls.proving_key)),
        }
    }

    /// The cached bundle, if both files are present.
    pub async fn cached(&self, id: &CircuitIdentifier) -> Result<Option<ArtifactBundle>> {
        let bundle = self.bundle_paths(id);
        let binary = file_exists(&bundle.circuit_binary).await?;
        let key = file_exists(&bundle.proving_key).await?;
        Ok((binary && key).then_some(bundle))
    }

    /// Return the local bundle for `id`, downloading whatever is missing.
    ///
    /// Missing files are fetched concurrently into per-call staging files.
    /// The manifest is written before anything is moved into place, and a
    /// failure leaves no partial bundle behind. Callers racing on the same
    /// bundle each stage their own copy and the last rename wins.
    pub async fn resolve(&self, id: &CircuitIdentifier) -> Result<ArtifactBundle> {
        let dir = self.bundle_dir(id);
        let manifest_path = dir.join(MANIFEST_FILE);

        if let Some(bundle) = self.cached(id).await? {
            debug!(circuit = %id.file_stem(), version = %id.version, "artifact cache hit");
            if !file_exists(&manifest_path).await? {
                warn!(circuit = %id.file_stem(), "artifact manifest missing, rebuilding it");
                let manifest = ArtifactManifest {
                    circuit: id.clone(),
                    circuit_binary: hash_cached(&bundle.circuit_binary).await?,
                    proving_key: hash_cached(&bundle.proving_key).await?,
                };
                write_manifest(&dir, &manifest).await?;
            }
            return Ok(bundle);
        }

        ensure_dir(&dir).await?;

        let urls = self.urls(id);
        let bundle = self.bundle_paths(id);

        info!(
            circuit = %id.file_stem(),
            version = %id.version,
            "downloading circuit artifacts"
        );

        // Await both so no write is in flight when a staged file is dropped.
        let (binary, key) = tokio::join!(
            self.acquire(&urls.circuit_binary, &bundle.circuit_binary),
            self.acquire(&urls.proving_key, &bundle.proving_key),
        );
        let (binary, key) = (binary?, key?);

        let manifest = ArtifactManifest {
            circuit: id.clone(),
            circuit_binary: binary.entry,
            proving_key: key.entry,
        };
        write_manifest(&dir, &manifest).await?;

        if let Some(staged) = binary.staged {
            promote(staged, &bundle.circuit_binary)?;
        }
        if let Some(staged) = key.staged {
            promote(staged, &bundle.proving_key)?;
        }

        info!(
            circuit = %id.file_stem(),
            binary_size = manifest.circuit_binary.size,
            key_size = manifest.proving_key.size,
            "cached circuit artifacts"
        );
        Ok(bundle)
    }

    /// Re-hash a cached bundle against the digests recorded at download time.
    pub async fn verify(&self, id: &CircuitIdentifier) -> Result<ArtifactManifest> {
        let dir = self.bundle_dir(id);
        let manifest = read_manifest(&dir.join(MANIFEST_FILE)).await?;
        check_file(&dir, &manifest.circuit_binary, "circuit binary").await?;
        check_file(&dir, &manifest.proving_key, "proving key").await?;
        Ok(manifest)
    }

    /// Hash `target` if it is already cached, otherwise download and stage it.
    async fn acquire(&self, url: &str, target: &Path) -> Result<Acquired> {
        if file_exists(target).await? {
            debug!(path = %target.display(), "reusing cached artifact");
            return Ok(Acquired {
                entry: hash_cached(target).await?,
                staged: None,
            });
        }
        let bytes = self.fetcher.fetch(url).await?;
        let staged = stage(target, &bytes).await?;
        Ok(Acquired {
            entry: ArtifactFile::from_bytes(url_file_name(url), &bytes),
            staged: Some(staged),
        })
    }
}

struct Acquired {
    entry: ArtifactFile,
    /// Downloaded copy waiting to be renamed over the target.
    staged: Option<TempPath>,
}

fn url_file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

async fn file_exists(path: &Path) -> Result<bool> {
    fs::try_exists(path)
        .await
        .map_err(|e| ArtifactError::io(path, e))
}

/// Create the cache directory; losing a creation race to another caller is fine.
async fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::create_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(ArtifactError::io(dir, e)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn hash_cached(path: &Path) -> Result<ArtifactFile> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| ArtifactError::io(path, e))?;
    Ok(ArtifactFile::from_bytes(file_name(path), &bytes))
}

/// Write `bytes` to a uniquely named staging file beside `target`.
///
/// The staging file is removed when the returned path is dropped unpromoted.
async fn stage(target: &Path, bytes: &[u8]) -> Result<TempPath> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let staged = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name(target)))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| ArtifactError::io(dir, e))?
        .into_temp_path();
    fs::write(&staged, bytes)
        .await
        .map_err(|e| ArtifactError::io(staged.to_path_buf(), e))?;
    Ok(staged)
}

/// Rename a staged file over `target`. Losing the race to a concurrent caller
/// that already placed the file is not an error.
fn promote(staged: TempPath, target: &Path) -> Result<()> {
    match staged.persist(target) {
        Ok(()) => Ok(()),
        Err(err) if target.exists() => {
            debug!(path = %target.display(), "artifact placed by a concurrent caller");
            drop(err.path);
            Ok(())
        }
        Err(err) => Err(ArtifactError::io(target, err.error)),
    }
}

async fn write_manifest(dir: &Path, manifest: &ArtifactManifest) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(manifest).map_err(|e| ArtifactError::Manifest {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    promote(stage(&path, &json).await?, &path)
}

async fn read_manifest(path: &Path) -> Result<ArtifactManifest> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ArtifactError::NotCached(path.to_path_buf()))
        }
        Err(e) => return Err(ArtifactError::io(path, e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

async fn check_file(dir: &Path, entry: &ArtifactFile, label: &'static str) -> Result<()> {
    let path = entry.resolve_path(dir);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ArtifactError::NotCached(path)),
        Err(e) => return Err(ArtifactError::io(path, e)),
    };
    if bytes.len() as u64 != entry.size {
        return Err(ArtifactError::SizeMismatch {
            label,
            expected: entry.size,
            actual: bytes.len() as u64,
        });
    }
    let actual = hash_bytes_hex(&bytes);
    if actual != entry.blake3 {
        return Err(ArtifactError::IntegrityMismatch {
            label,
            expected: entry.blake3.clone(),
            actual,
        });
    }
    Ok(())
}
