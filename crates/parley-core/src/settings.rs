use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Tunables for the call controller, persisted as `settings.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Pause after the permission probe so its tracks are fully released
    /// before the call acquires the devices again.
    #[serde(default = "default_settle_ms")]
    pub permission_settle_ms: u64,
    #[serde(default = "default_true")]
    pub mirror_local_video: bool,
    #[serde(default)]
    pub start_muted: bool,
}

fn default_settle_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            permission_settle_ms: default_settle_ms(),
            mirror_local_video: true,
            start_muted: false,
        }
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_permission_settle_ms(&self, ms: u64) {
        self.update(|s| s.permission_settle_ms = ms);
    }

    pub fn set_mirror_local_video(&self, mirror: bool) {
        self.update(|s| s.mirror_local_video = mirror);
    }

    pub fn set_start_muted(&self, muted: bool) {
        self.update(|s| s.start_muted = muted);
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) {
        {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut *settings);
        }
        self.save();
    }

    fn save(&self) {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("cannot create settings dir {}: {e}", parent.display());
                return;
            }
        }
        match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("cannot write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("cannot serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring corrupt {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
