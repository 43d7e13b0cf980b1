use crate::types::{SettingsPatch, SettingsUpdate, SystemSettings};

pub const EAR_MIN: f64 = 0.15;
pub const EAR_MAX: f64 = 0.35;
pub const EAR_STEP: f64 = 0.01;
pub const DURATION_MIN: u32 = 1;
pub const DURATION_MAX: u32 = 10;
pub const COOLDOWN_MIN: u32 = 10;
pub const COOLDOWN_MAX: u32 = 300;
pub const COOLDOWN_STEP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelField {
    EarThreshold,
    AlertDuration,
    NotificationCooldown,
    TelegramEnabled,
}

impl PanelField {
    const ORDER: [PanelField; 4] = [
        PanelField::EarThreshold,
        PanelField::AlertDuration,
        PanelField::NotificationCooldown,
        PanelField::TelegramEnabled,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Clean,
    Dirty,
    Saving,
}

/// What the last completed save amounted to. Absent in optimistic mode,
/// where the panel deliberately does not distinguish outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFeedback {
    Acked,
    LocalOnly,
}

/// Edit state for the settings controls: clean until a control moves, dirty
/// until a save is requested, saving until the update completes.
pub struct SettingsPanel {
    persisted: SystemSettings,
    working: SystemSettings,
    selected: PanelField,
    state: PanelState,
    optimistic: bool,
    last_save: Option<SaveFeedback>,
}

impl SettingsPanel {
    pub fn new(settings: SystemSettings, optimistic: bool) -> Self {
        SettingsPanel {
            working: settings.clone(),
            persisted: settings,
            selected: PanelField::EarThreshold,
            state: PanelState::Clean,
            optimistic,
            last_save: None,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn selected(&self) -> PanelField {
        self.selected
    }

    pub fn working(&self) -> &SystemSettings {
        &self.working
    }

    pub fn last_save(&self) -> Option<SaveFeedback> {
        self.last_save
    }

    pub fn select_next(&mut self) {
        self.selected = Self::neighbor(self.selected, 1);
    }

    pub fn select_prev(&mut self) {
        self.selected = Self::neighbor(self.selected, PanelField::ORDER.len() - 1);
    }

    fn neighbor(field: PanelField, offset: usize) -> PanelField {
        let idx = PanelField::ORDER.iter().position(|f| *f == field).unwrap_or(0);
        PanelField::ORDER[(idx + offset) % PanelField::ORDER.len()]
    }

    /// Moves the selected control one step, clamped to its documented range.
    pub fn adjust(&mut self, up: bool) {
        if self.state == PanelState::Saving {
            return;
        }
        match self.selected {
            PanelField::EarThreshold => {
                let step = if up { EAR_STEP } else { -EAR_STEP };
                let next = (self.working.ear_threshold + step).clamp(EAR_MIN, EAR_MAX);
                // Quantize to the step so repeated edits do not drift.
                self.working.ear_threshold = (next * 100.0).round() / 100.0;
            }
            PanelField::AlertDuration => {
                self.working.alert_duration_threshold = step_u32(
                    self.working.alert_duration_threshold,
                    1,
                    up,
                    DURATION_MIN,
                    DURATION_MAX,
                );
            }
            PanelField::NotificationCooldown => {
                self.working.notification_cooldown = step_u32(
                    self.working.notification_cooldown,
                    COOLDOWN_STEP,
                    up,
                    COOLDOWN_MIN,
                    COOLDOWN_MAX,
                );
            }
            PanelField::TelegramEnabled => {
                self.working.telegram_enabled = !self.working.telegram_enabled;
            }
        }
        self.state = if self.working == self.persisted {
            PanelState::Clean
        } else {
            PanelState::Dirty
        };
        self.last_save = None;
    }

    /// Requests a save of the working copy. Returns the patch to push, or
    /// `None` if there is nothing dirty to save.
    pub fn begin_save(&mut self) -> Option<SettingsPatch> {
        if self.state != PanelState::Dirty {
            return None;
        }
        self.state = PanelState::Saving;
        Some(SettingsPatch::from(&self.working))
    }

    /// Folds the update result back in. The merged record becomes the new
    /// persisted baseline either way; in optimistic mode the outcome is
    /// discarded, otherwise it is kept for display.
    pub fn complete_save(&mut self, update: &SettingsUpdate) {
        self.persisted = update.settings.clone();
        self.working = update.settings.clone();
        self.state = PanelState::Clean;
        self.last_save = if self.optimistic {
            None
        } else if update.backend_acked {
            Some(SaveFeedback::Acked)
        } else {
            Some(SaveFeedback::LocalOnly)
        };
    }
}

fn step_u32(value: u32, step: u32, up: bool, min: u32, max: u32) -> u32 {
    let next = if up {
        value.saturating_add(step)
    } else {
        value.saturating_sub(step)
    };
    next.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> SettingsPanel {
        SettingsPanel::new(SystemSettings::default(), false)
    }

    #[test]
    fn starts_clean_and_dirties_on_edit() {
        let mut p = panel();
        assert_eq!(p.state(), PanelState::Clean);
        p.adjust(false);
        assert_eq!(p.state(), PanelState::Dirty);
        assert_eq!(p.working().ear_threshold, 0.19);
    }

    #[test]
    fn undoing_the_edit_returns_to_clean() {
        let mut p = panel();
        p.adjust(true);
        assert_eq!(p.state(), PanelState::Dirty);
        p.adjust(false);
        assert_eq!(p.state(), PanelState::Clean);
    }

    #[test]
    fn save_lifecycle_clean_dirty_saving_clean() {
        let mut p = panel();
        assert!(p.begin_save().is_none());

        p.adjust(true);
        let patch = p.begin_save().expect("dirty panel should produce a patch");
        assert_eq!(p.state(), PanelState::Saving);
        assert_eq!(patch.ear_threshold, Some(0.21));

        let update = SettingsUpdate {
            settings: SystemSettings {
                ear_threshold: 0.21,
                ..SystemSettings::default()
            },
            backend_acked: true,
        };
        p.complete_save(&update);
        assert_eq!(p.state(), PanelState::Clean);
        assert_eq!(p.last_save(), Some(SaveFeedback::Acked));
    }

    #[test]
    fn unacked_save_is_reported_as_local_only() {
        let mut p = panel();
        p.adjust(true);
        p.begin_save().unwrap();
        p.complete_save(&SettingsUpdate {
            settings: p.working().clone(),
            backend_acked: false,
        });
        assert_eq!(p.last_save(), Some(SaveFeedback::LocalOnly));
    }

    #[test]
    fn optimistic_mode_discards_the_outcome() {
        let mut p = SettingsPanel::new(SystemSettings::default(), true);
        p.adjust(true);
        p.begin_save().unwrap();
        p.complete_save(&SettingsUpdate {
            settings: p.working().clone(),
            backend_acked: false,
        });
        assert_eq!(p.state(), PanelState::Clean);
        assert_eq!(p.last_save(), None);
    }

    #[test]
    fn edits_clamp_to_documented_ranges() {
        let mut p = panel();
        for _ in 0..40 {
            p.adjust(true);
        }
        assert_eq!(p.working().ear_threshold, EAR_MAX);
        for _ in 0..40 {
            p.adjust(false);
        }
        assert_eq!(p.working().ear_threshold, EAR_MIN);

        p.select_next();
        for _ in 0..20 {
            p.adjust(false);
        }
        assert_eq!(p.working().alert_duration_threshold, DURATION_MIN);

        p.select_next();
        for _ in 0..40 {
            p.adjust(true);
        }
        assert_eq!(p.working().notification_cooldown, COOLDOWN_MAX);
    }

    #[test]
    fn telegram_toggle_flips() {
        let mut p = panel();
        p.select_prev();
        assert_eq!(p.selected(), PanelField::TelegramEnabled);
        p.adjust(true);
        assert!(!p.working().telegram_enabled);
        p.adjust(true);
        assert!(p.working().telegram_enabled);
    }

    #[test]
    fn edits_are_ignored_while_saving() {
        let mut p = panel();
        p.adjust(true);
        p.begin_save().unwrap();
        let before = p.working().clone();
        p.adjust(true);
        assert_eq!(p.working(), &before);
    }
}
