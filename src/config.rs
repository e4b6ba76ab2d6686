use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::{info, warn};

use crate::credentials::ApiKey;
use crate::llm::ProviderSpec;
use crate::orchestrator::RetryPolicy;
use crate::utils::http::DEFAULT_REQUEST_TIMEOUT_SECS;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_PROVIDERS: &str =
    "gemini:gemini-3-pro-image-preview,gemini:gemini-2.5-flash-image";
pub const DEFAULT_EDIT_PROVIDERS: &str = "gemini:gemini-2.5-flash-image";
pub const DEFAULT_POSTER_PROVIDER: &str = "imagen:imagen-4.0-fast-generate-001";
pub const OUTPUT_FILENAME: &str = "hollywood-cut.jpg";

#[derive(Debug, Clone, Deserialize)]
struct ProvidersFile {
    #[serde(default)]
    providers: Vec<ProviderSpec>,
    #[serde(default)]
    edit_providers: Vec<ProviderSpec>,
    #[serde(default)]
    poster_provider: Option<ProviderSpec>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub session_file: PathBuf,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub providers_config_path: PathBuf,
    pub image_providers: Vec<ProviderSpec>,
    pub edit_providers: Vec<ProviderSpec>,
    pub poster_provider: Option<ProviderSpec>,
    pub provider_attempts: u32,
    pub provider_retry_delay_ms: u64,
    pub request_timeout_seconds: u64,
    pub max_quantity: u32,
}

/// Everything the orchestrator needs to reach its providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: ApiKey,
    pub base_url: String,
    pub generation: Vec<ProviderSpec>,
    pub edit: Vec<ProviderSpec>,
    pub poster: Option<ProviderSpec>,
    pub policy: RetryPolicy,
    pub request_timeout: Duration,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Parses a comma separated `kind:model` list, skipping malformed entries.
pub fn parse_provider_specs(value: &str) -> Vec<ProviderSpec> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<ProviderSpec>() {
            Ok(spec) => Some(spec),
            Err(err) => {
                warn!("Ignoring provider entry '{}': {}", entry, err);
                None
            }
        })
        .collect()
}

fn env_providers(name: &str, default: &str) -> Vec<ProviderSpec> {
    let mut specs = parse_provider_specs(&env_string(name, default));
    if specs.is_empty() {
        specs = parse_provider_specs(default);
    }
    specs
}

fn load_providers_file(path: &Path) -> Option<ProvidersFile> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read provider config at {}: {}",
                path.display(),
                err
            );
            return None;
        }
    };
    match serde_json::from_str::<ProvidersFile>(&content) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(
                "Failed to parse provider config at {}: {}",
                path.display(),
                err
            );
            None
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let providers_config_path =
            PathBuf::from(env_string("IMAGE_PROVIDERS_CONFIG_PATH", "image_providers.json"));

        let mut image_providers = env_providers("IMAGE_PROVIDERS", DEFAULT_IMAGE_PROVIDERS);
        let mut edit_providers = env_providers("EDIT_PROVIDERS", DEFAULT_EDIT_PROVIDERS);
        let mut poster_provider = env_providers("POSTER_PROVIDER", DEFAULT_POSTER_PROVIDER)
            .into_iter()
            .next();

        if let Some(file) = load_providers_file(&providers_config_path) {
            info!(
                "Loaded provider chain from {} ({} generation, {} edit)",
                providers_config_path.display(),
                file.providers.len(),
                file.edit_providers.len()
            );
            if !file.providers.is_empty() {
                image_providers = file.providers;
            }
            if !file.edit_providers.is_empty() {
                edit_providers = file.edit_providers;
            }
            if file.poster_provider.is_some() {
                poster_provider = file.poster_provider;
            }
        }

        let max_quantity = env_u32("MAX_QUANTITY", 4);
        if max_quantity == 0 {
            return Err(anyhow::anyhow!("MAX_QUANTITY must be at least 1"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            logs_dir: PathBuf::from(env_string("LOGS_DIR", "logs")),
            session_file: PathBuf::from(env_string(
                "SESSION_FILE",
                ".hollywood_cut/session.json",
            )),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_base_url: env_string("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            providers_config_path,
            image_providers,
            edit_providers,
            poster_provider,
            provider_attempts: env_u32("PROVIDER_ATTEMPTS", 1).max(1),
            provider_retry_delay_ms: env_u64("PROVIDER_RETRY_DELAY_MS", 900),
            request_timeout_seconds: env_u64(
                "REQUEST_TIMEOUT_SECONDS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            max_quantity,
        })
    }

    pub fn provider_config(&self, api_key: ApiKey) -> ProviderConfig {
        ProviderConfig {
            api_key,
            base_url: self.gemini_base_url.clone(),
            generation: self.image_providers.clone(),
            edit: self.edit_providers.clone(),
            poster: self.poster_provider.clone(),
            policy: RetryPolicy {
                attempts_per_provider: self.provider_attempts,
                retry_delay: Duration::from_millis(self.provider_retry_delay_ms),
            },
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
        }
    }
}
