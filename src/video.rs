// src/video.rs

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, TrySendError};
use opencv::{
    core::{self, Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst, VideoWriter},
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::info;

pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub width: i32,
    pub height: i32,
}

impl VideoReader {
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening video: {}", path);

        let cap = VideoCapture::from_file(path, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video source: {}", path);
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(Self {
            cap,
            fps,
            total_frames,
            width,
            height,
        })
    }

    /// Blocking read of the next frame; `None` when the stream is exhausted.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        Ok(Some(mat))
    }

    /// Rewind to the first frame. Used once, after the calibration pass, so
    /// warm-up sampling does not consume frames needed by the main loop.
    pub fn reset(&mut self) -> Result<()> {
        self.cap.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
        Ok(())
    }
}

pub struct CapturedFrame {
    pub frame: Mat,
    pub idx: usize,
}

pub struct CaptureWorker {
    pub rx: Receiver<CapturedFrame>,
    stop: Arc<AtomicBool>,
    join: JoinHandle<Result<()>>,
}

impl CaptureWorker {
    pub fn stop(self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        match self.join.join() {
            Ok(res) => res,
            Err(_) => Err(anyhow!("Capture thread panicked")),
        }
    }
}

/// Decouple frame acquisition from inference with a bounded queue. The
/// frame-skip stride is applied here, and the newest frame is dropped when
/// the buffer is full so a slow detector never stalls capture.
pub fn start_capture_thread(mut reader: VideoReader, stride: usize, buffer: usize) -> CaptureWorker {
    let (tx, rx) = bounded::<CapturedFrame>(buffer.max(1));
    let stop = Arc::new(AtomicBool::new(false));
    let stop_thread = Arc::clone(&stop);
    let stride = stride.max(1);

    let join = thread::spawn(move || -> Result<()> {
        let mut idx = 0usize;
        loop {
            if stop_thread.load(Ordering::Relaxed) {
                break;
            }
            let Some(frame) = reader.read_frame()? else {
                break;
            };
            idx += 1;
            if idx % stride != 0 {
                continue;
            }
            match tx.try_send(CapturedFrame { frame, idx }) {
                Ok(()) => {}
                // Buffer full: drop this frame rather than block acquisition
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        Ok(())
    });

    CaptureWorker { rx, stop, join }
}

/// Flatten a BGR Mat into contiguous RGB bytes for the detector.
pub fn mat_to_rgb_bytes(mat: &Mat) -> Result<(Vec<u8>, usize, usize)> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let width = rgb.cols() as usize;
    let height = rgb.rows() as usize;
    Ok((rgb.data_bytes()?.to_vec(), width, height))
}

/// Writer for the annotated output video, when enabled.
pub fn create_annotated_writer(
    output_dir: &str,
    source_path: &str,
    width: i32,
    height: i32,
    fps: f64,
) -> Result<(VideoWriter, PathBuf)> {
    std::fs::create_dir_all(output_dir)?;

    let stem = Path::new(source_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("source");
    let output_path = PathBuf::from(output_dir).join(format!("{}_annotated.mp4", stem));

    info!("Output video: {}", output_path.display());

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(
        output_path
            .to_str()
            .ok_or_else(|| anyhow!("Non-UTF8 output path"))?,
        fourcc,
        fps,
        core::Size::new(width, height),
        true,
    )?;

    Ok((writer, output_path))
}

/// Mode resize applied to the display copy so overlays line up with the
/// inference frame.
pub fn resize_to(frame: &Mat, width: i32, height: i32) -> Result<Mat> {
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}
