use crate::muted_error;
use serde::Deserialize;
use std::fs::read_to_string;

/// One preconfigured launch a front end can offer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LaunchPreset {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Client settings, read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Debug agent endpoint (host:port).
    pub endpoint: String,
    /// Launch presets offered by front ends.
    #[serde(default)]
    pub launch: Vec<LaunchPreset>,
}

impl Default for Settings {
    fn default() -> Self {
        let preset = include_str!("preset/settings.toml");
        toml::de::from_str(preset).expect("should de")
    }
}

impl Settings {
    const DEFAULT_PATH: &'static str = ".config/wirestalker/settings.toml";

    /// Load settings from a file. Return [`None`] on errors.
    ///
    /// With no explicit path the user config directory is probed.
    pub fn from_file(path: Option<&str>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => muted_error!(read_to_string(path))?,
        };
        muted_error!(toml::de::from_str(&data), "settings parse error:")
    }
}
