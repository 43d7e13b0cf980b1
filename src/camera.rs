use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rand::Rng;

pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;
pub const JPEG_QUALITY: u8 = 80;

/// Source of still frames for the capture loop. The console ships a
/// synthetic implementation; a real video device slots in behind the same
/// seam.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<RgbImage>;
}

/// Generates plausible-looking frames: a slowly drifting gradient with some
/// per-pixel noise, so consecutive uploads differ the way real captures do.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_counter: u32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        SyntheticCamera {
            width,
            height,
            frame_counter: 0,
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        SyntheticCamera::new(FRAME_WIDTH, FRAME_HEIGHT)
    }
}

impl FrameSource for SyntheticCamera {
    fn grab(&mut self) -> Result<RgbImage> {
        self.frame_counter = self.frame_counter.wrapping_add(1);
        let drift = (self.frame_counter % 255) as u8;
        let mut rng = rand::thread_rng();

        let frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = ((x + y) % 255) as u8;
            let noise: u8 = rng.gen_range(0..16);
            image::Rgb([
                base.wrapping_add(drift),
                base.wrapping_add(noise),
                drift.wrapping_add(noise),
            ])
        });
        Ok(frame)
    }
}

/// Encodes a frame to JPEG for the octet-stream upload.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.encode_image(frame)?;
    Ok(bytes)
}

/// Single-flight guard for the capture loop: at most one encode-and-upload
/// outstanding at a time. A tick that cannot obtain a token skips; the token
/// releases the guard when the upload task drops it.
#[derive(Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        InFlight::default()
    }

    pub fn try_begin(&self) -> Option<InFlightToken> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(InFlightToken {
                busy: self.busy.clone(),
            })
        } else {
            None
        }
    }
}

pub struct InFlightToken {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_capture_is_skipped_while_one_is_in_flight() {
        let guard = InFlight::new();
        let token = guard.try_begin().expect("first capture should start");
        assert!(guard.try_begin().is_none());
        drop(token);
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn guard_is_shared_across_clones() {
        let guard = InFlight::new();
        let other = guard.clone();
        let _token = guard.try_begin().unwrap();
        assert!(other.try_begin().is_none());
    }

    #[test]
    fn synthetic_frames_encode_to_jpeg() {
        let mut camera = SyntheticCamera::new(64, 48);
        let frame = camera.grab().unwrap();
        assert_eq!(frame.dimensions(), (64, 48));

        let bytes = encode_jpeg(&frame, JPEG_QUALITY).unwrap();
        // JPEG start-of-image marker.
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut camera = SyntheticCamera::new(32, 32);
        let a = camera.grab().unwrap();
        let b = camera.grab().unwrap();
        assert_ne!(a.as_raw(), b.as_raw());
    }
}
