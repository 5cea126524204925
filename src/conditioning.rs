// src/conditioning.rs
//
// Prepares a raw frame for inference. Night frames that are actually dark
// get grayscale + blur + CLAHE before the mode-specific resize; everything
// else passes through with only the resize.

use anyhow::Result;
use opencv::{
    core::{self, Mat, Size},
    imgproc,
    prelude::*,
};
use tracing::debug;

pub struct FrameConditioner {
    night: bool,
    target: Size,
    luma_threshold: f64,
}

impl FrameConditioner {
    pub fn new(night: bool, target_width: i32, target_height: i32, luma_threshold: f64) -> Self {
        Self {
            night,
            target: Size::new(target_width, target_height),
            luma_threshold,
        }
    }

    /// Mean grayscale luminance below the threshold (90 on 0-255 by default).
    pub fn is_dark(&self, frame: &Mat) -> Result<bool> {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        let mean = core::mean(&gray, &core::no_array())?;
        Ok(mean[0] < self.luma_threshold)
    }

    /// Grayscale -> 5x5 Gaussian blur -> CLAHE -> back to 3-channel BGR.
    pub fn enhance_night_frame(&self, frame: &Mat) -> Result<Mat> {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut blurred = Mat::default();
        imgproc::gaussian_blur(
            &gray,
            &mut blurred,
            Size::new(5, 5),
            0.0,
            0.0,
            core::BORDER_DEFAULT,
        )?;

        let mut clahe = imgproc::create_clahe(3.0, Size::new(8, 8))?;
        let mut equalized = Mat::default();
        clahe.apply(&blurred, &mut equalized)?;

        let mut bgr = Mat::default();
        imgproc::cvt_color(&equalized, &mut bgr, imgproc::COLOR_GRAY2BGR, 0)?;
        Ok(bgr)
    }

    /// Produce the inference frame: optional night enhancement, then the
    /// mode resize. The input frame is never mutated.
    pub fn condition(&self, frame: &Mat) -> Result<Mat> {
        let enhanced = if self.night && self.is_dark(frame)? {
            debug!("Dark frame, applying night enhancement");
            self.enhance_night_frame(frame)?
        } else {
            frame.clone()
        };

        let mut resized = Mat::default();
        imgproc::resize(
            &enhanced,
            &mut resized,
            self.target,
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        Ok(resized)
    }
}
