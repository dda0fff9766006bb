use legato_ports::storage::{SettingsDto, StorageError, StoragePort};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SETTINGS_FILE: &str = "settings.json";
const PERFORMANCES_DIR: &str = "performances";

/// Practice settings kept as JSON under the user's config directory.
/// Loading always yields an export directory, and a remembered reference
/// file that has since disappeared is forgotten.
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("Legato"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn default_export_dir(&self) -> PathBuf {
        self.base_dir.join(PERFORMANCES_DIR)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    fn resolve(&self, mut settings: SettingsDto) -> SettingsDto {
        if settings.export_dir.is_none() {
            settings.export_dir = Some(self.default_export_dir().display().to_string());
        }
        let stale = settings
            .reference_path
            .as_deref()
            .is_some_and(|path| !Path::new(path).is_file());
        if stale {
            debug!(path = ?settings.reference_path, "remembered reference is gone, forgetting it");
            settings.reference_path = None;
        }
        settings
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            debug!(path = %path.display(), "no stored settings, using defaults");
            return Ok(self.resolve(SettingsDto::default()));
        }
        let data = fs::read(&path).map_err(|e| StorageError::Io(e.to_string()))?;
        let settings: SettingsDto =
            serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))?;
        Ok(self.resolve(settings))
    }

    /// Writes a sibling temp file and renames it over the old one, so a
    /// crash mid-save leaves the previous settings intact.
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_dir).map_err(|e| StorageError::Io(e.to_string()))?;
        let data = serde_json::to_vec_pretty(s).map_err(|e| StorageError::Serde(e.to_string()))?;

        let path = self.settings_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::Io(e.to_string()))?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }
}
