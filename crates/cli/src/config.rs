use std::fs;
use std::path::{Path, PathBuf};

use examguard_core::detection::domain::inference_provider::ModelSource;
use examguard_core::detection::infrastructure::onnx_inference_provider::ARCFACE_MATCH_THRESHOLD;
use examguard_core::monitoring::monitor_config::MonitorConfig;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub models_dir: Option<PathBuf>,
    pub model_url: Option<String>,
    pub interval_ms: Option<u64>,
    pub match_threshold: Option<f64>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ExamGuard").join("config.json"))
}

/// Loads the config from `explicit`, or from the default location when a
/// file exists there, or falls back to built-in defaults.
pub fn load(explicit: Option<&Path>) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|path| path.is_file()),
    };
    let Some(path) = path else {
        return Ok(parse("{}")?);
    };

    let json = fs::read_to_string(&path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    log::info!("Using config {}", path.display());
    parse(&json).map_err(|e| format!("invalid config {}: {e}", path.display()).into())
}

pub fn parse(json: &str) -> Result<MonitorConfig, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let sets_threshold = value.get("match_threshold").is_some();
    let mut config: MonitorConfig = serde_json::from_value(value)?;
    // The CLI always runs the ArcFace provider.
    if !sets_threshold {
        config.match_threshold = ARCFACE_MATCH_THRESHOLD;
    }
    Ok(config)
}

pub fn apply_overrides(config: &mut MonitorConfig, overrides: &Overrides) {
    if let Some(dir) = &overrides.models_dir {
        config.models.primary = ModelSource::Local(dir.clone());
    }
    if let Some(url) = &overrides.model_url {
        config.models.fallback = Some(ModelSource::Remote(url.clone()));
    }
    if let Some(ms) = overrides.interval_ms {
        config.sample_interval_ms = ms;
    }
    if let Some(threshold) = overrides.match_threshold {
        config.match_threshold = threshold;
    }
}
