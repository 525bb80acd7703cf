use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Resolve a model file inside a local model directory.
pub fn resolve_local(dir: &Path, name: &str) -> Result<PathBuf, ModelResolveError> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelResolveError::Missing(path))
    }
}

/// Resolve a model file published under `base_url`.
///
/// A copy already in the user cache directory is reused; otherwise the file
/// is downloaded into the cache first.
pub fn resolve_remote(
    name: &str,
    base_url: &str,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cache_dir = model_cache_dir()?;
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    fs::create_dir_all(&cache_dir).map_err(ModelResolveError::CacheDir)?;
    let url = model_url(base_url, name);
    log::info!("Downloading {name} from {url}");
    download(&url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Joins a release base URL and a model file name.
pub fn model_url(base_url: &str, name: &str) -> String {
    format!("{}/{name}", base_url.trim_end_matches('/'))
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/ExamGuard/models/`
/// - Linux: `$XDG_CACHE_HOME/ExamGuard/models/` or `~/.cache/ExamGuard/models/`
/// - Windows: `%LOCALAPPDATA%/ExamGuard/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("ExamGuard").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("ExamGuard").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(|e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;

    // Stream in chunks; the recognition model is well over 100MB.
    let mut reader = response;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| ModelResolveError::Write {
            path: temp_path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| ModelResolveError::Write {
                path: temp_path.to_path_buf(),
                source: e,
            })?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(|e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
