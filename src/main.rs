use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod alert;
mod api;
mod archive;
mod camera;
mod config;
mod dashboard;
mod panel;
mod settings;
mod types;

use api::ApiClient;
use camera::{FrameSource, InFlight, SyntheticCamera};
use config::Config;
use dashboard::{Screen, ViewState};
use panel::SettingsPanel;
use settings::{JsonFileStorage, SettingsStore};
use types::{AlertState, SettingsUpdate, SystemStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    info!("Console starting with config: {:?}", config);

    let store = Arc::new(SettingsStore::new(Box::new(JsonFileStorage::new(
        &config.settings_dir,
    ))));
    let http = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let client = ApiClient::new(
        http,
        config.backend_url.clone(),
        config.warn_frames,
        store,
    );

    // The archive is best-effort; the console still runs without it.
    let archive_conn = match archive::init(&config.event_archive_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!(error = %e, "Event archive unavailable, continuing without history");
            None
        }
    };

    let mut frame_source: Box<dyn FrameSource> = Box::new(SyntheticCamera::default());
    let in_flight = InFlight::new();

    let mut view = ViewState {
        status: SystemStatus {
            camera_active: false,
            telegram_connected: false,
            current_ear: 0.0,
            alert_state: AlertState::Normal,
            last_update: Utc::now(),
        },
        events: Vec::new(),
        archived_total: archive_conn
            .as_ref()
            .and_then(|conn| archive::count(conn).ok())
            .unwrap_or(0),
        settings: client.get_settings(),
        detecting: config.detecting,
        camera_error: None,
        show_settings: false,
    };
    let mut panel = SettingsPanel::new(view.settings.clone(), false);

    let mut screen = if config.dashboard {
        Some(Screen::enter()?)
    } else {
        None
    };

    let (save_tx, mut save_rx) = mpsc::unbounded_channel::<SettingsUpdate>();

    let mut poll_interval = time::interval(Duration::from_millis(config.poll_interval_ms));
    let mut capture_interval = time::interval(Duration::from_millis(config.capture_interval_ms));
    let mut input_interval = time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                // Latest write wins: each poll replaces the prior snapshot.
                view.status = client.get_status().await;
                view.events = client.get_events().await;
                if let Some(conn) = archive_conn.as_ref() {
                    match archive::record_events(conn, &view.events) {
                        Ok(_) => {
                            view.archived_total =
                                archive::count(conn).unwrap_or(view.archived_total);
                        }
                        Err(e) => warn!(error = %e, "Failed to archive events"),
                    }
                }
                if let Some(s) = screen.as_mut() {
                    s.draw(&view, &panel)?;
                }
            }
            _ = capture_interval.tick() => {
                if view.detecting {
                    capture_and_upload(&mut frame_source, &in_flight, &client, &mut view);
                }
            }
            _ = input_interval.tick() => {
                if screen.is_some() {
                    if handle_input(&mut view, &mut panel, &client, &save_tx)? {
                        break;
                    }
                    if let Some(s) = screen.as_mut() {
                        s.draw(&view, &panel)?;
                    }
                }
            }
            Some(update) = save_rx.recv() => {
                panel.complete_save(&update);
                view.settings = update.settings;
                if let Some(s) = screen.as_mut() {
                    s.draw(&view, &panel)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    // Dropping the screen restores the terminal; a still-running upload task
    // only logs its outcome and never touches view state after this point.
    drop(screen);
    Ok(())
}

/// One capture tick: skip when an upload is still in flight, otherwise grab
/// and encode synchronously and hand the upload to a background task. The
/// upload's verdict is logged, not merged into displayed state; the alert
/// shown on screen comes from the polling loop alone.
fn capture_and_upload(
    frame_source: &mut Box<dyn FrameSource>,
    in_flight: &InFlight,
    client: &ApiClient,
    view: &mut ViewState,
) {
    let Some(token) = in_flight.try_begin() else {
        debug!("Capture still in flight, skipping tick");
        return;
    };

    let encoded = frame_source
        .grab()
        .and_then(|frame| camera::encode_jpeg(&frame, camera::JPEG_QUALITY));

    match encoded {
        Ok(bytes) => {
            view.camera_error = None;
            let client = client.clone();
            tokio::spawn(async move {
                match client.detect_frame(bytes).await {
                    Some(verdict) => debug!(
                        drowsy = verdict.drowsy,
                        confidence = verdict.confidence,
                        "Frame verdict received"
                    ),
                    None => debug!("Frame upload produced no verdict"),
                }
                drop(token);
            });
        }
        Err(e) => {
            // The one error surfaced to the UI: a broken frame source.
            warn!(error = %e, "Frame capture failed");
            view.camera_error = Some(e.to_string());
        }
    }
}

/// Drains pending key events. Returns true when the user asked to quit.
fn handle_input(
    view: &mut ViewState,
    panel: &mut SettingsPanel,
    client: &ApiClient,
    save_tx: &mpsc::UnboundedSender<SettingsUpdate>,
) -> Result<bool> {
    while event::poll(Duration::ZERO)? {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true)
            }
            KeyCode::Char('d') => {
                view.detecting = !view.detecting;
                view.camera_error = None;
                info!(detecting = view.detecting, "Toggled frame detection");
            }
            KeyCode::Char('s') => view.show_settings = !view.show_settings,
            KeyCode::Up if view.show_settings => panel.select_prev(),
            KeyCode::Down if view.show_settings => panel.select_next(),
            KeyCode::Left if view.show_settings => panel.adjust(false),
            KeyCode::Right if view.show_settings => panel.adjust(true),
            KeyCode::Enter if view.show_settings => {
                if let Some(patch) = panel.begin_save() {
                    let client = client.clone();
                    let tx = save_tx.clone();
                    tokio::spawn(async move {
                        let update = client.update_settings(&patch).await;
                        // A closed receiver means the loop already exited.
                        let _ = tx.send(update);
                    });
                }
            }
            _ => {}
        }
    }
    Ok(false)
}
