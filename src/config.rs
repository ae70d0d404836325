// Settings for one run: the destination folder, the quota project and the
// local directory to upload. Values come from the environment first, then
// from the settings remembered by a previous run in the user's home
// directory. Only identifiers are remembered, never credentials.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SETTINGS_FILE: &str = ".gdrive_upload_helper.json";

/// Values remembered between runs.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Remembered {
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Resolved settings. `folder_id` and `project_id` may still be missing;
/// the UI prompts for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub folder_id: Option<String>,
    pub project_id: Option<String>,
    pub upload_root: PathBuf,
}

impl Settings {
    /// Build settings from `DRIVE_FOLDER_ID`, `GOOGLE_CLOUD_PROJECT` and
    /// `UPLOAD_ROOT`, falling back to remembered values and to the current
    /// working directory.
    pub fn from_env() -> Result<Self> {
        let remembered = Remembered::load(&settings_path()).unwrap_or_default();
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(Self::resolve(
            env_value("DRIVE_FOLDER_ID"),
            env_value("GOOGLE_CLOUD_PROJECT"),
            env_value("UPLOAD_ROOT"),
            remembered,
            &cwd,
        ))
    }

    fn resolve(
        folder_id: Option<String>,
        project_id: Option<String>,
        upload_root: Option<String>,
        remembered: Remembered,
        cwd: &Path,
    ) -> Self {
        let upload_root = match upload_root {
            Some(root) => cwd.join(root),
            None => cwd.to_path_buf(),
        };
        Settings {
            folder_id: folder_id.or(remembered.folder_id),
            project_id: project_id.or(remembered.project_id),
            upload_root,
        }
    }

    /// Remember the folder and project at `path` (normally
    /// [`settings_path`]) for the next run.
    pub fn remember_at(&self, path: &Path) -> Result<()> {
        let remembered = Remembered {
            folder_id: self.folder_id.clone(),
            project_id: self.project_id.clone(),
        };
        remembered.save(path)
    }
}

impl Remembered {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let remembered = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "loaded remembered settings");
        Ok(remembered)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Failed to encode settings")?;
        std::fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "saved remembered settings");
        Ok(())
    }
}

/// Settings file in the user's home directory.
pub fn settings_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(SETTINGS_FILE)
}

/// Non-empty, trimmed environment variable.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_wins_over_remembered() {
        let remembered = Remembered {
            folder_id: Some("old-folder".into()),
            project_id: Some("old-project".into()),
        };
        let settings = Settings::resolve(
            Some("new-folder".into()),
            None,
            None,
            remembered,
            Path::new("/work"),
        );
        assert_eq!(settings.folder_id.as_deref(), Some("new-folder"));
        assert_eq!(settings.project_id.as_deref(), Some("old-project"));
        assert_eq!(settings.upload_root, PathBuf::from("/work"));
    }

    #[test]
    fn relative_upload_root_is_made_absolute() {
        let settings = Settings::resolve(None, None, Some("photos".into()), Remembered::default(), Path::new("/work"));
        assert_eq!(settings.upload_root, PathBuf::from("/work/photos"));

        let settings = Settings::resolve(None, None, Some("/data".into()), Remembered::default(), Path::new("/work"));
        assert_eq!(settings.upload_root, PathBuf::from("/data"));
    }

    #[test]
    fn remembered_settings_survive_a_save() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        let remembered = Remembered {
            folder_id: Some("abc".into()),
            project_id: None,
        };
        remembered.save(&path).unwrap();
        assert_eq!(Remembered::load(&path).unwrap(), remembered);
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Remembered::load(&tmp.path().join("missing.json")).is_err());
    }
}
