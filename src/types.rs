// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub calibration: CalibrationConfig,
    pub risk: RiskConfig,
    pub events: EventConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Detector floor for daytime frames, before cattle filtering.
    pub day_base_confidence: f32,
    /// Lower floor at night so enhanced frames are not starved.
    pub night_base_confidence: f32,
    /// Minimum confidence for a vehicle box to feed the motion estimator.
    pub vehicle_confidence: f32,
    pub nms_iou_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub warmup_frames: usize,
    pub detection_floor: f32,
    pub night_floor: f32,
    pub night_multiplier: f32,
    pub day_floor: f32,
    pub day_multiplier: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub speed_weight: f32,
    pub distance_weight: f32,
    pub count_weight: f32,
    pub time_weight: f32,
    pub night_factor: f32,
    pub night_speed_damping: f32,
    pub darkness_luma_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            speed_weight: 0.4,
            distance_weight: 0.3,
            count_weight: 0.2,
            time_weight: 0.1,
            night_factor: 1.5,
            night_speed_damping: 0.7,
            darkness_luma_threshold: 90.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub url: String,
    pub road_segment: String,
    pub cooldown_seconds: f64,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub day_frame_skip: usize,
    pub night_frame_skip: usize,
    pub day_width: i32,
    pub day_height: i32,
    pub night_width: i32,
    pub night_height: i32,
    pub day_delay_ms: i32,
    pub night_delay_ms: i32,
    pub capture_buffer: usize,
    pub show_preview: bool,
    pub save_annotated: bool,
    pub output_dir: String,
    pub sources: Vec<SourceConfig>,
}

impl VideoConfig {
    pub fn frame_skip(&self, night: bool) -> usize {
        if night {
            self.night_frame_skip
        } else {
            self.day_frame_skip
        }
    }

    /// Inference/display resolution for the mode. Day runs smaller because
    /// it also runs at a higher frame-skip rate.
    pub fn target_resolution(&self, night: bool) -> (i32, i32) {
        if night {
            (self.night_width, self.night_height)
        } else {
            (self.day_width, self.day_height)
        }
    }

    pub fn display_delay_ms(&self, night: bool) -> i32 {
        if night {
            self.night_delay_ms
        } else {
            self.day_delay_ms
        }
    }
}

/// One video source: a day or night camera feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: String,
    pub night: bool,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Order-preserving mapping from score to level.
    pub fn from_score(score: u32) -> Self {
        if score > 60 {
            RiskLevel::High
        } else if score > 30 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
}

/// Record forwarded to the event store. Timestamp and event id are
/// assigned server-side on receipt.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub road_segment: String,
    pub mode: String,
    pub risk_score: u32,
    pub risk_level: String,
    pub cattle_count: usize,
    pub warning_issued: bool,
}
