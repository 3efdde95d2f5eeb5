//! YAML configuration loading for the CLI.
//!
//! Three files live in the config directory: `sources.yaml` (what to
//! monitor), `profile.yaml` (what matters to us, for relevance scoring),
//! and `settings.yaml` (tuning, optional — defaults apply when absent).
//! Manual records (`manual.yaml`) are loaded by `argus_core::manual`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use argus_core::models::{Profile, Source};

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    name: String,
    url: String,
    #[serde(default = "default_region")]
    region: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_region() -> String {
    "Global".to_string()
}

fn default_active() -> bool {
    true
}

/// Load monitored sources. The ids are placeholders — the database
/// assigns the real ones on upsert, keyed by URL.
pub fn load_sources(path: &Path) -> Result<Vec<Source>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: SourcesFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid sources file {}", path.display()))?;

    let mut sources = Vec::with_capacity(file.sources.len());
    for entry in file.sources {
        if entry.name.trim().is_empty() || entry.url.trim().is_empty() {
            anyhow::bail!("source entries need both a name and a url");
        }
        sources.push(Source {
            id: Uuid::new_v4(),
            name: entry.name,
            url: entry.url,
            region: entry.region,
            active: entry.active,
        });
    }
    Ok(sources)
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    profile: Profile,
}

/// Load the relevance profile.
pub fn load_profile(path: &Path) -> Result<Profile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: ProfileFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid profile file {}", path.display()))?;
    Ok(file.profile)
}

/// Scan tuning, all optional in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_concurrent_fetches: usize,
    pub extract_concurrency: usize,
    pub backlog_limit: usize,
    /// Minimum delay between requests to the same host, in milliseconds.
    pub min_request_delay_ms: u64,
    /// Window for the due-soon status, in days.
    pub due_soon_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            extract_concurrency: 2,
            backlog_limit: 50,
            min_request_delay_ms: 1000,
            due_soon_days: 30,
        }
    }
}

/// Load settings; a missing file means defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("invalid settings file {}", path.display()))
}
