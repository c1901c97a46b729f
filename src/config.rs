// Config

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bevy::log::info;
use serde::{Deserialize, Serialize};

use crate::error::FlowResult;
use crate::levels::LevelId;
use crate::transition::Easing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// JSON file backing the flag store. `None` keeps flags in memory only.
    pub flags_path: Option<PathBuf>,
    pub start_level: LevelId,
    /// Length of the full-screen fade around level switches.
    pub screen_fade_secs: f32,
    /// Length of title card fades.
    pub title_fade_secs: f32,
    pub easing: Easing,
    /// Log once when a node runs this long without leaving.
    pub stall_warning_secs: Option<f32>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flags_path: None,
            start_level: LevelId::Menu,
            screen_fade_secs: 0.6,
            title_fade_secs: 0.4,
            easing: Easing::SmoothStep,
            stall_warning_secs: None,
        }
    }
}

impl FlowConfig {
    pub fn from_toml_str(text: &str) -> FlowResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}
