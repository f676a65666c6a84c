use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: HostConfig,
    pub translator: TranslatorConfig,
    pub banks: BankConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Plugin host binary, started with stdin/stdout piped.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Exported to the host process as LV2_PATH.
    pub lv2_path: Option<String>,
    /// Quiescence window when draining host responses.
    pub response_timeout_ms: u64,
    /// MIDI channel written into midi_map commands.
    pub midi_chan: u8,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            program: PathBuf::from("/usr/local/bin/mod-host"),
            args: vec!["-i".to_string()],
            lv2_path: None,
            response_timeout_ms: 100,
            midi_chan: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Pedalboard-to-host-command translator binary.
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        TranslatorConfig {
            program: PathBuf::from("pedalboard2modhost"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// Directories scanned for pedalboard banks.
    pub dirs: Vec<PathBuf>,
}

impl Default for BankConfig {
    fn default() -> Self {
        BankConfig {
            dirs: vec![PathBuf::from("data/mod-pedalboards")],
        }
    }
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
