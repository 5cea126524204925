// src/motion.rs

use crate::detection::Detection;
use tracing::debug;

/// Tracks one vehicle centroid across frames and derives a displacement-based
/// speed proxy in pixels per sampled frame. No smoothing: the previous
/// centroid is simply replaced each time a vehicle is seen.
pub struct MotionEstimator {
    prev_center: Option<(f32, f32)>,
    speed: i32,
    night: bool,
    vehicle_confidence: f32,
    night_damping: f32,
}

impl MotionEstimator {
    pub fn new(night: bool, vehicle_confidence: f32, night_damping: f32) -> Self {
        Self {
            prev_center: None,
            speed: 0,
            night,
            vehicle_confidence,
            night_damping,
        }
    }

    /// Update from the current frame's detections and return the speed proxy.
    ///
    /// A frame with no qualifying vehicle keeps both the previous centroid and
    /// the previous speed; motion state never regresses to zero on a single
    /// missed detection. Night displacement is damped to compensate for
    /// enhancement-induced jitter.
    pub fn update(&mut self, detections: &[Detection]) -> i32 {
        let vehicle = detections
            .iter()
            .find(|d| d.is_vehicle() && d.confidence > self.vehicle_confidence);

        let Some(vehicle) = vehicle else {
            return self.speed;
        };

        let center = vehicle.centroid();

        if let Some((px, py)) = self.prev_center {
            let raw = ((center.0 - px).powi(2) + (center.1 - py).powi(2)).sqrt();
            let damped = if self.night {
                raw * self.night_damping
            } else {
                raw
            };
            self.speed = damped as i32;
            debug!("Vehicle displacement {:.1}px -> speed {}", raw, self.speed);
        }

        self.prev_center = Some(center);
        self.speed
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
        Detection {
            bbox: [x1, y1, x2, y2],
            confidence,
            class_id: 2,
            class_name: "car".to_string(),
        }
    }

    fn cow(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            bbox: [x1, y1, x2, y2],
            confidence: 0.9,
            class_id: 19,
            class_name: "cow".to_string(),
        }
    }

    #[test]
    fn test_first_observation_is_zero() {
        let mut est = MotionEstimator::new(false, 0.3, 0.7);
        assert_eq!(est.update(&[car(0.0, 0.0, 10.0, 10.0, 0.8)]), 0);
    }

    #[test]
    fn test_displacement_is_euclidean_pixels() {
        let mut est = MotionEstimator::new(false, 0.3, 0.7);
        est.update(&[car(0.0, 0.0, 10.0, 10.0, 0.8)]); // centroid (5, 5)
        let speed = est.update(&[car(30.0, 40.0, 40.0, 50.0, 0.8)]); // centroid (35, 45)
        assert_eq!(speed, 50); // hypot(30, 40)
    }

    #[test]
    fn test_missed_detection_keeps_speed() {
        let mut est = MotionEstimator::new(false, 0.3, 0.7);
        est.update(&[car(0.0, 0.0, 10.0, 10.0, 0.8)]);
        est.update(&[car(30.0, 40.0, 40.0, 50.0, 0.8)]);
        assert_eq!(est.update(&[]), 50);
        assert_eq!(est.update(&[cow(0.0, 0.0, 5.0, 5.0)]), 50);
    }

    #[test]
    fn test_centroid_retained_across_gap() {
        let mut est = MotionEstimator::new(false, 0.3, 0.7);
        est.update(&[car(0.0, 0.0, 10.0, 10.0, 0.8)]); // centroid (5, 5)
        est.update(&[]); // gap does not reset the anchor
        let speed = est.update(&[car(0.0, 35.0, 10.0, 45.0, 0.8)]); // centroid (5, 40)
        assert_eq!(speed, 35);
    }

    #[test]
    fn test_night_damping_applies_to_fresh_displacement() {
        let mut est = MotionEstimator::new(true, 0.3, 0.7);
        est.update(&[car(0.0, 0.0, 10.0, 10.0, 0.8)]);
        let speed = est.update(&[car(100.0, 0.0, 110.0, 10.0, 0.8)]); // 100px
        assert_eq!(speed, 70);
        // A persisted speed is not re-damped on later frames
        assert_eq!(est.update(&[]), 70);
    }

    #[test]
    fn test_low_confidence_vehicle_ignored() {
        let mut est = MotionEstimator::new(false, 0.3, 0.7);
        est.update(&[car(0.0, 0.0, 10.0, 10.0, 0.8)]);
        est.update(&[car(100.0, 0.0, 110.0, 10.0, 0.2)]);
        assert_eq!(est.speed(), 0);
    }
}
