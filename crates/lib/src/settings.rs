//! Local settings: the two environment values the user can store on this machine
//! (`settings.json` next to the config file).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// OpenAI API key handed to the agents.
    #[serde(default)]
    pub openai_key: String,
    /// Free-form extra variable.
    #[serde(default)]
    pub other_variable: String,
}

impl Settings {
    /// Load from `path`; a missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parsing settings from {}", path.display()))
    }

    /// Write to `path`, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating settings directory {}", dir.display()))?;
        }
        let s = serde_json::to_string_pretty(self)?;
        std::fs::write(path, s).with_context(|| format!("writing settings to {}", path.display()))?;
        log::info!("saved settings to {}", path.display());
        Ok(())
    }

    /// The key with all but the last four characters hidden.
    pub fn masked_openai_key(&self) -> String {
        let chars: Vec<char> = self.openai_key.chars().collect();
        if chars.is_empty() {
            return String::new();
        }
        let keep = if chars.len() > 8 { 4 } else { 0 };
        let hidden = chars.len() - keep;
        let tail: String = chars[hidden..].iter().collect();
        format!("{}{}", "*".repeat(hidden), tail)
    }
}

/// Settings file for a given config path.
pub fn settings_path(config_path: &Path) -> PathBuf {
    crate::config::config_dir(config_path).join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("optimonkey-settings-{}", std::process::id()));
        let path = dir.join("nested").join("settings.json");
        let settings = Settings {
            openai_key: "sk-test-123456789".into(),
            other_variable: "eastus".into(),
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_empty() {
        let path = std::env::temp_dir().join("optimonkey-no-such-dir").join("settings.json");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn masks_key() {
        let s = Settings {
            openai_key: "sk-abcdefgh1234".into(),
            ..Default::default()
        };
        assert_eq!(s.masked_openai_key(), "***********1234");
        let short = Settings {
            openai_key: "abc".into(),
            ..Default::default()
        };
        assert_eq!(short.masked_openai_key(), "***");
    }

    #[test]
    fn settings_live_next_to_config() {
        assert_eq!(
            settings_path(Path::new("/home/user/.optimonkey/config.json")),
            PathBuf::from("/home/user/.optimonkey/settings.json")
        );
    }
}
