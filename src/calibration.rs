// src/calibration.rs
//
// One-time warm-up pass over the head of a stream to derive a
// session-specific cattle confidence threshold. Runs before any frame is
// scored; afterwards the stream is rewound so the main loop sees the full
// video.

use crate::detection::YoloDetector;
use crate::types::CalibrationConfig;
use crate::video::{mat_to_rgb_bytes, VideoReader};
use anyhow::Result;
use opencv::{core::Size, imgproc};
use tracing::{info, warn};

/// Warm-up frames are sampled at the day resolution regardless of mode.
const CALIBRATION_WIDTH: i32 = 480;
const CALIBRATION_HEIGHT: i32 = 270;

pub fn calibrate(
    reader: &mut VideoReader,
    detector: &mut YoloDetector,
    night: bool,
    cfg: &CalibrationConfig,
) -> Result<f32> {
    let mut cow_confs: Vec<f32> = Vec::new();

    for _ in 0..cfg.warmup_frames {
        let Some(frame) = reader.read_frame()? else {
            break;
        };

        let mut resized = opencv::core::Mat::default();
        imgproc::resize(
            &frame,
            &mut resized,
            Size::new(CALIBRATION_WIDTH, CALIBRATION_HEIGHT),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let (rgb, w, h) = mat_to_rgb_bytes(&resized)?;
        // A failed warm-up inference is just a frame with no evidence
        let detections = match detector.detect(&rgb, w, h, cfg.detection_floor) {
            Ok(d) => d,
            Err(e) => {
                warn!("Calibration inference failed, skipping frame: {}", e);
                continue;
            }
        };

        cow_confs.extend(
            detections
                .iter()
                .filter(|d| d.is_cattle())
                .map(|d| d.confidence),
        );
    }

    reader.reset()?;

    let mean_conf = if cow_confs.is_empty() {
        None
    } else {
        Some(cow_confs.iter().sum::<f32>() / cow_confs.len() as f32)
    };

    let threshold = derive_threshold(mean_conf, night, cfg);

    match mean_conf {
        Some(mean) => info!(
            "✓ Calibrated cattle threshold {:.3} (mean warm-up confidence {:.3}, {} samples)",
            threshold,
            mean,
            cow_confs.len()
        ),
        None => info!(
            "✓ No cattle seen during warm-up, falling back to threshold {:.3}",
            threshold
        ),
    }

    Ok(threshold)
}

/// Derive the operating threshold from the mean warm-up confidence.
///
/// Night frames are noisier after enhancement, so the floor is lower to
/// avoid starving detections; day mode demands a higher floor to suppress
/// false positives. Calibration starvation degrades to the permissive
/// detection floor instead of failing the session.
pub fn derive_threshold(mean_conf: Option<f32>, night: bool, cfg: &CalibrationConfig) -> f32 {
    let mean = mean_conf.unwrap_or(cfg.detection_floor);
    if night {
        (mean * cfg.night_multiplier).max(cfg.night_floor)
    } else {
        (mean * cfg.day_multiplier).max(cfg.day_floor)
    }
}
