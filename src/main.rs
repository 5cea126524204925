// src/main.rs

mod calibration;
mod conditioning;
mod config;
mod detection;
mod event_gate;
mod event_log;
mod motion;
mod overlay;
mod risk;
mod types;
mod video;

use anyhow::Result;
use conditioning::FrameConditioner;
use detection::YoloDetector;
use event_gate::EventGate;
use event_log::spawn_sink_worker;
use motion::MotionEstimator;
use opencv::{highgui, prelude::*};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use types::{Config, LogEvent, RiskLevel, SourceConfig};
use video::{start_capture_thread, VideoReader};

const WINDOW_NAME: &str = "Cattle Collision Prevention";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "cattle_risk={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🐄 Cattle Collision Risk System Starting");
    info!("✓ Configuration loaded");
    info!(
        "Road segment: {} | cooldown: {:.0}s | {} source(s)",
        config.events.road_segment,
        config.events.cooldown_seconds,
        config.video.sources.len()
    );

    let mut detector = YoloDetector::new(
        &config.model.path,
        config.model.num_threads,
        config.detection.nms_iou_threshold,
    )?;
    info!("✓ Detector ready");

    let (event_tx, sink_handle) = spawn_sink_worker(&config.events);

    if config.video.show_preview {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
    }

    for (idx, source) in config.video.sources.iter().enumerate() {
        info!("\n========================================");
        info!(
            "Processing source {}/{}: {} ({})",
            idx + 1,
            config.video.sources.len(),
            source.path,
            source.label
        );
        info!("========================================\n");

        match process_source(source, &mut detector, &config, &event_tx).await {
            Ok(stats) => {
                info!("\n✓ Source processed successfully!");
                info!("  Frames scored: {}", stats.frames_scored);
                info!("  Cattle sightings: {}", stats.cattle_sightings);
                info!(
                    "  High-risk frames: {} ({:.1}%)",
                    stats.high_risk_frames,
                    100.0 * stats.high_risk_frames as f64 / stats.frames_scored.max(1) as f64
                );
                info!("  Events emitted: {}", stats.events_emitted);
                info!("  Events dropped at queue: {}", stats.events_dropped);
            }
            Err(e) => {
                // One bad source never aborts the run
                error!("Failed to process source {}: {}", source.path, e);
            }
        }
    }

    if config.video.show_preview {
        highgui::destroy_all_windows()?;
    }

    drop(event_tx);
    sink_handle.await?;

    Ok(())
}

#[derive(Default)]
struct SessionStats {
    frames_scored: u64,
    cattle_sightings: u64,
    high_risk_frames: u64,
    events_emitted: u64,
    events_dropped: u64,
}

async fn process_source(
    source: &SourceConfig,
    detector: &mut YoloDetector,
    config: &Config,
    event_tx: &mpsc::Sender<LogEvent>,
) -> Result<SessionStats> {
    let night = source.night;
    let mut stats = SessionStats::default();

    let mut reader = VideoReader::open(&source.path)?;

    let cattle_threshold =
        calibration::calibrate(&mut reader, detector, night, &config.calibration)?;

    let (target_w, target_h) = config.video.target_resolution(night);
    let conditioner = FrameConditioner::new(
        night,
        target_w,
        target_h,
        config.risk.darkness_luma_threshold,
    );

    let mut motion = MotionEstimator::new(
        night,
        config.detection.vehicle_confidence,
        config.risk.night_speed_damping,
    );
    let mut gate = EventGate::new(
        config.events.cooldown_seconds,
        config.events.road_segment.clone(),
        source.label.clone(),
    );

    let base_confidence = if night {
        config.detection.night_base_confidence
    } else {
        config.detection.day_base_confidence
    };
    let delay_ms = config.video.display_delay_ms(night);

    let mut writer = if config.video.save_annotated {
        let (writer, _) = video::create_annotated_writer(
            &config.video.output_dir,
            &source.path,
            target_w,
            target_h,
            reader.fps,
        )?;
        Some(writer)
    } else {
        None
    };

    let worker = start_capture_thread(
        reader,
        config.video.frame_skip(night),
        config.video.capture_buffer,
    );
    let rx = worker.rx.clone();

    let mut stopped = false;

    while let Ok(packet) = rx.recv() {
        let frame = packet.frame;

        let infer_frame = conditioner.condition(&frame)?;
        let (rgb, w, h) = video::mat_to_rgb_bytes(&infer_frame)?;

        // A failed inference scores the frame as "no objects" (recoverable)
        let detections = match detector.detect(&rgb, w, h, base_confidence) {
            Ok(d) => d,
            Err(e) => {
                warn!("Detection failed on frame {}: {}", packet.idx, e);
                Vec::new()
            }
        };

        let cattle_count = detections
            .iter()
            .filter(|d| d.is_cattle() && d.confidence >= cattle_threshold)
            .count();
        let distance = risk::proximity_proxy(&detections, cattle_threshold);
        let speed = motion.update(&detections);

        let assessment = risk::assess(speed, distance, cattle_count, night, &config.risk);

        stats.frames_scored += 1;
        stats.cattle_sightings += cattle_count as u64;
        if assessment.level == RiskLevel::High {
            stats.high_risk_frames += 1;
        }

        if let Some(event) = gate.evaluate(&assessment, cattle_count, epoch_seconds()) {
            // Never block the scoring loop on the event store
            match event_tx.try_send(event) {
                Ok(()) => stats.events_emitted += 1,
                Err(_) => {
                    stats.events_dropped += 1;
                    warn!("Event queue full, dropping record");
                }
            }
        }

        // Draw on the unenhanced copy so the preview stays natural
        let mut display = video::resize_to(&frame, target_w, target_h)?;
        overlay::draw_cattle_boxes(&mut display, &detections, cattle_threshold)?;
        overlay::draw_status(&mut display, &source.label, &assessment)?;

        if let Some(writer) = writer.as_mut() {
            writer.write(&display)?;
        }

        if config.video.show_preview {
            highgui::imshow(WINDOW_NAME, &display)?;
            let key = highgui::wait_key(delay_ms)?;
            if key == 'q' as i32 {
                info!("Stop requested, leaving source");
                stopped = true;
                break;
            }
        }
    }

    if stopped {
        info!("Source stopped early by user");
    }
    worker.stop()?;

    if let Some(mut writer) = writer {
        writer.release()?;
    }

    Ok(stats)
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
