use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Three-valued alert classification shown everywhere in the UI.
///
/// Constructed from raw backend signals via [`crate::alert::classify`];
/// no other code should derive one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Normal,
    Warning,
    Critical,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Normal => "normal",
            AlertState::Warning => "warning",
            AlertState::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<AlertState> {
        match s {
            "normal" => Some(AlertState::Normal),
            "warning" => Some(AlertState::Warning),
            "critical" => Some(AlertState::Critical),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertState::Normal => "NORMAL",
            AlertState::Warning => "WARNING",
            AlertState::Critical => "CRITICAL",
        }
    }
}

/// Snapshot of the remote system, recomputed on every poll.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SystemStatus {
    pub camera_active: bool,
    pub telegram_connected: bool,
    pub current_ear: f64,
    pub alert_state: AlertState,
    pub last_update: DateTime<Utc>,
}

/// One entry of the backend's event log.
///
/// The id is regenerated on every fetch; it is only stable within a single
/// poll's result list. The archive keys on (timestamp, ear_value) instead.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AlertEvent {
    pub id: Uuid,
    pub ear_value: f64,
    pub alert_type: AlertState,
    pub timestamp: String,
    pub duration: u32,
}

/// Locally owned detection settings, persisted as a single JSON record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SystemSettings {
    pub ear_threshold: f64,
    pub alert_duration_threshold: u32,
    pub telegram_enabled: bool,
    pub notification_cooldown: u32,
}

impl Default for SystemSettings {
    fn default() -> Self {
        SystemSettings {
            ear_threshold: 0.20,
            alert_duration_threshold: 3,
            telegram_enabled: true,
            notification_cooldown: 60,
        }
    }
}

impl SystemSettings {
    pub fn merged(&self, patch: &SettingsPatch) -> SystemSettings {
        SystemSettings {
            ear_threshold: patch.ear_threshold.unwrap_or(self.ear_threshold),
            alert_duration_threshold: patch
                .alert_duration_threshold
                .unwrap_or(self.alert_duration_threshold),
            telegram_enabled: patch.telegram_enabled.unwrap_or(self.telegram_enabled),
            notification_cooldown: patch
                .notification_cooldown
                .unwrap_or(self.notification_cooldown),
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SettingsPatch {
    pub ear_threshold: Option<f64>,
    pub alert_duration_threshold: Option<u32>,
    pub telegram_enabled: Option<bool>,
    pub notification_cooldown: Option<u32>,
}

impl From<&SystemSettings> for SettingsPatch {
    fn from(s: &SystemSettings) -> Self {
        SettingsPatch {
            ear_threshold: Some(s.ear_threshold),
            alert_duration_threshold: Some(s.alert_duration_threshold),
            telegram_enabled: Some(s.telegram_enabled),
            notification_cooldown: Some(s.notification_cooldown),
        }
    }
}

/// Result of pushing a settings update to the backend. The merged record is
/// always persisted locally; `backend_acked` tells the caller whether the
/// backend actually accepted the write.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub settings: SystemSettings,
    pub backend_acked: bool,
}

/// Backend verdict for an uploaded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub drowsy: bool,
    pub confidence: f64,
}

// Wire shapes of the backend API.

#[derive(Deserialize, Debug)]
pub struct StatusResponse {
    pub camera: String,
    pub telegram: String,
}

#[derive(Deserialize, Debug)]
pub struct EarResponse {
    pub ear: f64,
}

#[derive(Deserialize, Debug)]
pub struct AlertResponse {
    pub drowsy: bool,
    #[serde(default)]
    pub consecutive_frames: u32,
}

#[derive(Deserialize, Debug)]
pub struct EventsResponse {
    pub events: Vec<RawEvent>,
}

#[derive(Deserialize, Debug)]
pub struct RawEvent {
    pub ear: f64,
    #[serde(rename = "type")]
    pub event_type: Option<AlertState>,
    #[serde(default)]
    pub alert_sent: bool,
    pub timestamp: String,
}

#[derive(Deserialize, Debug)]
pub struct DetectResponse {
    pub drowsy: bool,
    pub confidence: f64,
}

// For the POST /settings body; the backend uses its own field names.
#[derive(Serialize, Debug)]
pub struct SettingsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear_threshold: Option<f64>,
    #[serde(rename = "drowsy_time", skip_serializing_if = "Option::is_none")]
    pub alert_duration_threshold: Option<u32>,
    #[serde(rename = "telegram_cooldown", skip_serializing_if = "Option::is_none")]
    pub notification_cooldown: Option<u32>,
}

impl From<&SettingsPatch> for SettingsRequest {
    fn from(patch: &SettingsPatch) -> Self {
        SettingsRequest {
            ear_threshold: patch.ear_threshold,
            alert_duration_threshold: patch.alert_duration_threshold,
            notification_cooldown: patch.notification_cooldown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_applies_only_present_fields() {
        let base = SystemSettings::default();
        let patch = SettingsPatch {
            ear_threshold: Some(0.18),
            ..Default::default()
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.ear_threshold, 0.18);
        assert_eq!(merged.alert_duration_threshold, 3);
        assert!(merged.telegram_enabled);
        assert_eq!(merged.notification_cooldown, 60);
    }

    #[test]
    fn settings_request_omits_absent_fields() {
        let patch = SettingsPatch {
            notification_cooldown: Some(120),
            ..Default::default()
        };
        let body = serde_json::to_value(SettingsRequest::from(&patch)).unwrap();
        assert_eq!(body, serde_json::json!({ "telegram_cooldown": 120 }));
    }

    #[test]
    fn alert_state_wire_names_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&AlertState::Critical).unwrap(),
            "\"critical\""
        );
        let parsed: AlertState = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, AlertState::Warning);
    }
}
