use std::sync::Arc;

use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::alert;
use crate::settings::SettingsStore;
use crate::types::{
    AlertEvent, AlertResponse, AlertState, DetectResponse, Detection, EarResponse, EventsResponse,
    SettingsPatch, SettingsRequest, SettingsUpdate, StatusResponse, SystemSettings, SystemStatus,
};

const CAMERA_CONNECTED: &str = "connected";
const TELEGRAM_CONFIGURED: &str = "configured";

/// Internal failure taxonomy. Callers of the public methods never see these;
/// every failure collapses to the operation's fallback value, but the logs
/// keep the distinction.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for the drowsiness backend. Wraps the handful of status reads, the
/// settings write, and the frame upload behind a stable local contract.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    warn_frames: u32,
    settings: Arc<SettingsStore>,
}

impl ApiClient {
    pub fn new(
        http: Client,
        base_url: String,
        warn_frames: u32,
        settings: Arc<SettingsStore>,
    ) -> Self {
        ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            warn_frames,
            settings,
        }
    }

    /// Polls `/status`, `/ear` and `/alert` concurrently. All three must
    /// succeed or none contribute: any failure reports the fixed quiet-state
    /// fallback instead of a partial merge.
    pub async fn get_status(&self) -> SystemStatus {
        let polled = tokio::try_join!(
            self.get_json::<StatusResponse>("/status"),
            self.get_json::<EarResponse>("/ear"),
            self.get_json::<AlertResponse>("/alert"),
        );

        match polled {
            Ok((status, ear, signal)) => SystemStatus {
                camera_active: status.camera == CAMERA_CONNECTED,
                telegram_connected: status.telegram == TELEGRAM_CONFIGURED,
                current_ear: ear.ear,
                alert_state: alert::classify(
                    signal.drowsy,
                    signal.consecutive_frames,
                    self.warn_frames,
                ),
                last_update: Utc::now(),
            },
            Err(e) => {
                warn!(error = %e, "Status poll failed, reporting fallback status");
                Self::fallback_status()
            }
        }
    }

    /// Single `/alert` read; `Normal` on any failure.
    pub async fn get_alert_state(&self) -> AlertState {
        match self.get_json::<AlertResponse>("/alert").await {
            Ok(signal) => alert::classify(signal.drowsy, signal.consecutive_frames, self.warn_frames),
            Err(e) => {
                warn!(error = %e, "Alert poll failed, reporting normal");
                AlertState::Normal
            }
        }
    }

    /// Fetches the backend's event log. Each entry gets a fresh id, so
    /// identity is not stable across polls; the archive keys on the backend
    /// timestamp instead. Failures yield an empty list.
    pub async fn get_events(&self) -> Vec<AlertEvent> {
        match self.get_json::<EventsResponse>("/events").await {
            Ok(body) => body
                .events
                .into_iter()
                .map(|raw| {
                    let alert_type = raw.event_type.unwrap_or(if raw.alert_sent {
                        AlertState::Critical
                    } else {
                        AlertState::Warning
                    });
                    AlertEvent {
                        id: Uuid::new_v4(),
                        ear_value: raw.ear,
                        alert_type,
                        timestamp: raw.timestamp,
                        duration: 0,
                    }
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Events poll failed, reporting empty list");
                Vec::new()
            }
        }
    }

    /// Uploads a compressed frame for analysis. `None` means "no opinion"
    /// (network, non-2xx or malformed body), never "not drowsy".
    pub async fn detect_frame(&self, image_bytes: Vec<u8>) -> Option<Detection> {
        let url = format!("{}/detect", self.base_url);
        let sent = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(image_bytes)
            .send()
            .await;

        let verdict: Result<DetectResponse, ApiError> = async {
            let response = sent?;
            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::Status(status));
            }
            let text = response.text().await?;
            Ok(serde_json::from_str(&text)?)
        }
        .await;

        match verdict {
            Ok(body) => {
                debug!(drowsy = body.drowsy, confidence = body.confidence, "Frame analyzed");
                Some(Detection {
                    drowsy: body.drowsy,
                    confidence: body.confidence,
                })
            }
            Err(e) => {
                warn!(error = %e, "Frame detection failed");
                None
            }
        }
    }

    /// Pushes a settings update to the backend. The merged record is
    /// persisted locally whether or not the backend accepted the write;
    /// `backend_acked` carries the distinction to the caller.
    pub async fn update_settings(&self, patch: &SettingsPatch) -> SettingsUpdate {
        let url = format!("{}/settings", self.base_url);
        let body = SettingsRequest::from(patch);

        let backend_acked = match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Backend rejected settings update");
                false
            }
            Err(e) => {
                warn!(error = %e, "Settings update failed to reach backend");
                false
            }
        };

        let settings = self.settings.merge_and_store(patch);
        SettingsUpdate {
            settings,
            backend_acked,
        }
    }

    pub fn get_settings(&self) -> SystemSettings {
        self.settings.get()
    }

    fn fallback_status() -> SystemStatus {
        SystemStatus {
            camera_active: true,
            telegram_connected: false,
            current_ear: 0.0,
            alert_state: AlertState::Normal,
            last_update: Utc::now(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
