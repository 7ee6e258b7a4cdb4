//! Editor preferences persisted between sessions (ink color/width, default
//! font size). Compositions themselves are never persisted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::Color4;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditorSettings {
    pub ink_color: Color4,
    pub ink_width: f32,
    pub default_font_size: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            ink_color: Color4::default(),
            ink_width: 4.0,
            default_font_size: 32.0,
        }
    }
}

fn settings_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("meme-edit").join("settings.json"))
}

impl EditorSettings {
    /// Loads the settings file, falling back to defaults on any failure
    /// (missing file, unreadable, stale schema).
    pub fn load() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        if let Ok(data) = std::fs::read_to_string(&path) {
            match serde_json::from_str(&data) {
                Ok(settings) => return settings,
                Err(err) => log::warn!("ignoring malformed settings file: {err}"),
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        let Some(path) = settings_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                log::warn!("could not create settings dir: {err}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(data) => {
                if let Err(err) = std::fs::write(&path, data) {
                    log::warn!("could not write settings: {err}");
                }
            }
            Err(err) => log::warn!("could not serialize settings: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_json() {
        let settings = EditorSettings {
            ink_color: Color4 {
                r: 0.1,
                g: 0.2,
                b: 0.3,
                a: 1.0,
            },
            ink_width: 7.5,
            default_font_size: 24.0,
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: EditorSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ink_width, 7.5);
        assert_eq!(back.default_font_size, 24.0);
        assert_eq!(back.ink_color, settings.ink_color);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(serde_json::from_str::<EditorSettings>("{\"nope\":true}").is_err());
    }
}
