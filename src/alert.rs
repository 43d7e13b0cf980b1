use crate::types::AlertState;

/// Consecutive below-threshold frames before the backend signal is shown as a
/// warning. Roughly two seconds at the backend's sampling rate. Overridable
/// through `WARN_CONSECUTIVE_FRAMES` in the environment.
pub const DEFAULT_WARN_FRAMES: u32 = 4;

/// Sole constructor of a derived [`AlertState`].
///
/// A drowsy verdict from the backend is always critical, regardless of the
/// frame count. Otherwise the consecutive-frame count against `warn_frames`
/// decides between warning and normal.
pub fn classify(drowsy: bool, consecutive_frames: u32, warn_frames: u32) -> AlertState {
    if drowsy {
        AlertState::Critical
    } else if consecutive_frames >= warn_frames {
        AlertState::Warning
    } else {
        AlertState::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drowsy_is_critical_regardless_of_frames() {
        assert_eq!(classify(true, 0, DEFAULT_WARN_FRAMES), AlertState::Critical);
        assert_eq!(classify(true, 3, DEFAULT_WARN_FRAMES), AlertState::Critical);
        assert_eq!(
            classify(true, 100, DEFAULT_WARN_FRAMES),
            AlertState::Critical
        );
    }

    #[test]
    fn frame_count_boundary() {
        // Exactly at the threshold is a warning, one below is normal.
        assert_eq!(classify(false, 4, DEFAULT_WARN_FRAMES), AlertState::Warning);
        assert_eq!(classify(false, 3, DEFAULT_WARN_FRAMES), AlertState::Normal);
    }

    #[test]
    fn counts_beyond_threshold_stay_warning() {
        assert_eq!(
            classify(false, 50, DEFAULT_WARN_FRAMES),
            AlertState::Warning
        );
    }

    #[test]
    fn zero_frames_is_normal() {
        assert_eq!(classify(false, 0, DEFAULT_WARN_FRAMES), AlertState::Normal);
    }

    #[test]
    fn threshold_is_configuration() {
        assert_eq!(classify(false, 4, 8), AlertState::Normal);
        assert_eq!(classify(false, 8, 8), AlertState::Warning);
    }
}
