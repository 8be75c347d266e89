//! Persistent host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use lumi_core::{codec::wire::DEFAULT_INBOUND_SAMPLE_RATE, EngineConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub inbound_sample_rate: u32,
    pub chunk_queue_capacity: usize,
    pub start_muted: bool,
    pub playback_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            preferred_output_device: None,
            inbound_sample_rate: DEFAULT_INBOUND_SAMPLE_RATE,
            chunk_queue_capacity: 64,
            start_muted: false,
            playback_enabled: true,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.inbound_sample_rate = self.inbound_sample_rate.clamp(8_000, 192_000);
        self.chunk_queue_capacity = self.chunk_queue_capacity.clamp(1, 1024);
        self.preferred_input_device = normalize_device_name(self.preferred_input_device.take());
        self.preferred_output_device = normalize_device_name(self.preferred_output_device.take());
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            inbound_sample_rate: self.inbound_sample_rate,
            chunk_queue_capacity: self.chunk_queue_capacity,
            start_muted: self.start_muted,
            ..EngineConfig::default()
        }
    }
}

fn normalize_device_name(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lumi")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("lumi")
            .join("settings.json")
    }
}

/// Missing or unparsable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
