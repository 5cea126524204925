// src/risk.rs
//
// Deterministic risk scoring. Speed and distance are pixel-space proxies,
// not physical measurements.

use crate::detection::Detection;
use crate::types::{RiskAssessment, RiskConfig, RiskLevel};

/// Guard against division by a near-zero proximity value; caps the distance
/// term's contribution at distance_weight * 100.
const MIN_DISTANCE: f32 = 0.01;

/// Inverse-area proximity proxy over cattle boxes at or above the calibrated
/// threshold. The closest (largest) box dominates. 1.0 means "far".
pub fn proximity_proxy(detections: &[Detection], cattle_threshold: f32) -> f32 {
    detections
        .iter()
        .filter(|d| d.is_cattle() && d.confidence >= cattle_threshold)
        .map(|d| 1.0 / d.area())
        .fold(1.0f32, f32::min)
}

/// Weighted combination of speed, proximity, cattle count and lighting,
/// scaled to an integer score in [0, 100].
pub fn calculate_risk(
    speed: i32,
    distance: f32,
    cattle_count: usize,
    night: bool,
    weights: &RiskConfig,
) -> u32 {
    let night_factor = if night { weights.night_factor } else { 1.0 };

    let raw = weights.speed_weight * speed as f32
        + weights.distance_weight * (1.0 / distance.max(MIN_DISTANCE))
        + weights.count_weight * cattle_count as f32
        + weights.time_weight * night_factor;

    ((raw * 10.0) as u32).min(100)
}

pub fn assess(
    speed: i32,
    distance: f32,
    cattle_count: usize,
    night: bool,
    weights: &RiskConfig,
) -> RiskAssessment {
    let score = calculate_risk(speed, distance, cattle_count, night, weights);
    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> RiskConfig {
        RiskConfig::default()
    }

    fn cow(bbox: [f32; 4], confidence: f32) -> Detection {
        Detection {
            bbox,
            confidence,
            class_id: 19,
            class_name: "cow".to_string(),
        }
    }

    #[test]
    fn test_fast_close_approach_saturates_high() {
        // raw = 0.4*50 + 0.3*(1/0.02) + 0.2*3 + 0.1*1.0 = 35.7 -> 357 capped at 100
        let score = calculate_risk(50, 0.02, 3, false, &weights());
        assert_eq!(score, 100);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::High);
    }

    #[test]
    fn test_idle_empty_road_is_low() {
        // raw = 0 + 0.3*1.0 + 0 + 0.1 = 0.4 -> 4
        let score = calculate_risk(0, 1.0, 0, false, &weights());
        assert_eq!(score, 4);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::Low);
    }

    #[test]
    fn test_division_guard() {
        let w = weights();
        assert_eq!(
            calculate_risk(10, 0.0, 1, true, &w),
            calculate_risk(10, 0.01, 1, true, &w)
        );
    }

    #[test]
    fn test_score_bounds() {
        let w = weights();
        for speed in [0, 1, 25, 500] {
            for distance in [0.0, 0.005, 0.5, 1.0] {
                for count in [0, 2, 50] {
                    for night in [false, true] {
                        let score = calculate_risk(speed, distance, count, night, &w);
                        assert!(score <= 100);
                    }
                }
            }
        }
    }

    #[test]
    fn test_night_factor_raises_score() {
        let w = weights();
        let day = calculate_risk(10, 1.0, 1, false, &w);
        let night = calculate_risk(10, 1.0, 1, true, &w);
        assert!(night >= day);
    }

    #[test]
    fn test_proximity_largest_box_dominates() {
        let dets = vec![
            cow([0.0, 0.0, 10.0, 10.0], 0.9),   // area 100
            cow([0.0, 0.0, 100.0, 100.0], 0.8), // area 10000, closer
        ];
        let d = proximity_proxy(&dets, 0.5);
        assert!((d - 1.0 / 10000.0).abs() < 1e-9);
    }

    #[test]
    fn test_proximity_defaults_to_far() {
        assert_eq!(proximity_proxy(&[], 0.5), 1.0);
    }

    #[test]
    fn test_proximity_ignores_subthreshold_cattle() {
        let dets = vec![cow([0.0, 0.0, 100.0, 100.0], 0.3)];
        assert_eq!(proximity_proxy(&dets, 0.5), 1.0);
    }

    #[test]
    fn test_proximity_ignores_vehicles() {
        let truck = Detection {
            bbox: [0.0, 0.0, 200.0, 200.0],
            confidence: 0.95,
            class_id: 7,
            class_name: "truck".to_string(),
        };
        assert_eq!(proximity_proxy(&[truck], 0.5), 1.0);
    }
}
