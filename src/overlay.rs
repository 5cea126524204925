// src/overlay.rs

use crate::detection::Detection;
use crate::types::{RiskAssessment, RiskLevel};
use anyhow::Result;
use opencv::{core, imgproc, prelude::*};

/// Green boxes on cattle that cleared the calibrated threshold.
pub fn draw_cattle_boxes(
    frame: &mut core::Mat,
    detections: &[Detection],
    cattle_threshold: f32,
) -> Result<()> {
    let green = core::Scalar::new(0.0, 255.0, 0.0, 0.0);

    for det in detections
        .iter()
        .filter(|d| d.is_cattle() && d.confidence >= cattle_threshold)
    {
        let rect = core::Rect::new(
            det.bbox[0] as i32,
            det.bbox[1] as i32,
            (det.bbox[2] - det.bbox[0]).max(2.0) as i32,
            (det.bbox[3] - det.bbox[1]).max(2.0) as i32,
        );
        imgproc::rectangle(frame, rect, green, 2, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            frame,
            "COW",
            core::Point::new(rect.x, (rect.y - 5).max(0)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            green,
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

/// Red escalation banner plus the mode/score status line.
pub fn draw_status(
    frame: &mut core::Mat,
    label: &str,
    assessment: &RiskAssessment,
) -> Result<()> {
    if assessment.level == RiskLevel::High {
        imgproc::put_text(
            frame,
            "CATTLE AHEAD - SLOW DOWN",
            core::Point::new(20, 35),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.8,
            core::Scalar::new(0.0, 0.0, 255.0, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    let status = format!(
        "{} | Risk: {} ({})",
        label,
        assessment.score,
        assessment.level.as_str()
    );
    imgproc::put_text(
        frame,
        &status,
        core::Point::new(20, 65),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        core::Scalar::new(255.0, 255.0, 255.0, 0.0),
        1,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
