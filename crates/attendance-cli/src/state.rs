//! Local client state persisted between invocations.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Buddhist-era offset used for displayed years.
const BUDDHIST_ERA_OFFSET: i32 = 543;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("state file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Summary of the last successful action, shown by `attendance last`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastResult {
    pub time: String,
    pub title: String,
    pub detail: String,
}

impl LastResult {
    pub fn now(title: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            time: display_time(&Local::now()),
            title: title.into(),
            detail: if detail.trim().is_empty() {
                "—".to_string()
            } else {
                detail
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalState {
    pub api_url: Option<String>,
    pub admin_token: Option<String>,
    pub last_result: Option<LastResult>,
}

impl LocalState {
    /// Load state; a missing file is the empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write state through a temporary file so a crash never leaves a
    /// truncated state file behind.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn set_api_url(&mut self, url: &str) {
        let url = url.trim();
        self.api_url = (!url.is_empty()).then(|| url.to_string());
    }

    pub fn is_logged_in(&self) -> bool {
        self.admin_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Forget the admin token and last result. The API URL is kept.
    pub fn clear_local(&mut self) {
        self.admin_token = None;
        self.last_result = None;
    }
}

/// `dd/mm/yyyy HH:MM` with the year in the Buddhist era.
pub fn display_time<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    format!(
        "{:02}/{:02}/{} {:02}:{:02}",
        dt.day(),
        dt.month(),
        dt.year() + BUDDHIST_ERA_OFFSET,
        dt.hour(),
        dt.minute()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_display_time_buddhist_year() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 7, 8, 5, 59).unwrap();
        assert_eq!(display_time(&dt), "07/03/2569 08:05");
    }

    #[test]
    fn test_load_missing_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = LocalState::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, LocalState::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let mut state = LocalState::default();
        state.set_api_url(" https://script.example/exec ");
        state.admin_token = Some("tok".into());
        state.last_result = Some(LastResult::now("Logged IN • code E1", ""));
        state.save(&path).unwrap();

        let loaded = LocalState::load(&path).unwrap();
        assert_eq!(loaded.api_url.as_deref(), Some("https://script.example/exec"));
        assert!(loaded.is_logged_in());
        assert_eq!(loaded.last_result.as_ref().map(|r| r.detail.as_str()), Some("—"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_clear_local_keeps_url() {
        let mut state = LocalState {
            api_url: Some("https://x.example".into()),
            admin_token: Some("tok".into()),
            last_result: Some(LastResult::now("t", "d")),
        };
        state.clear_local();
        assert_eq!(state.api_url.as_deref(), Some("https://x.example"));
        assert!(!state.is_logged_in());
        assert!(state.last_result.is_none());
    }

    #[test]
    fn test_set_empty_url_clears() {
        let mut state = LocalState::default();
        state.set_api_url("https://x.example");
        state.set_api_url("   ");
        assert!(state.api_url.is_none());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(LocalState::load(&path), Err(StateError::Json(_))));
    }
}
