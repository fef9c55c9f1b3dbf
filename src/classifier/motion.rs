use std::collections::VecDeque;

use crate::models::{PositionSample, RawKind, RawSignal};

/// Turns marker positions into per-tick RUNNING/IDLE candidates and keeps a
/// short rolling record of which recent ticks moved.
#[derive(Debug, Clone)]
pub struct MotionClassifier {
    movement_threshold: f64,
    history_size: usize,
    confidence_count: usize,
    history: VecDeque<bool>,
    last_position: Option<(f64, f64)>,
}

impl MotionClassifier {
    pub fn new(movement_threshold: f64, history_size: usize, confidence_count: usize) -> Self {
        Self {
            movement_threshold,
            history_size,
            confidence_count,
            history: VecDeque::with_capacity(history_size),
            last_position: None,
        }
    }

    pub fn movement_threshold(&self) -> f64 {
        self.movement_threshold
    }

    pub fn observe(&mut self, sample: &PositionSample) -> RawSignal {
        let Some(position) = sample.marker() else {
            return RawSignal::none();
        };

        let distance = match self.last_position {
            Some((x, y)) => ((position.0 - x).powi(2) + (position.1 - y).powi(2)).sqrt(),
            None => 0.0,
        };
        self.last_position = Some(position);

        let moved = distance > self.movement_threshold;
        self.history.push_back(moved);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }

        RawSignal {
            kind: if moved { RawKind::Running } else { RawKind::Idle },
            distance,
        }
    }

    /// True once the window is full and at least `confidence_count` of its ticks moved.
    pub fn consistent_movement(&self) -> bool {
        if self.history.len() < self.history_size {
            return false;
        }
        self.history.iter().filter(|moved| **moved).count() >= self.confidence_count
    }

    /// Drop the reference position so the next detection measures zero movement.
    pub fn forget_position(&mut self) {
        self.last_position = None;
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(x: f64, y: f64) -> PositionSample {
        PositionSample::detected(x, y, Some(7), Utc::now())
    }

    #[test]
    fn first_detection_has_zero_distance() {
        let mut classifier = MotionClassifier::new(0.5, 6, 4);
        let signal = classifier.observe(&at(10.0, 10.0));
        assert_eq!(signal.kind, RawKind::Idle);
        assert_eq!(signal.distance, 0.0);
    }

    #[test]
    fn movement_above_threshold_is_running() {
        let mut classifier = MotionClassifier::new(0.5, 6, 4);
        classifier.observe(&at(0.0, 0.0));
        let signal = classifier.observe(&at(3.0, 4.0));
        assert_eq!(signal.kind, RawKind::Running);
        assert!((signal.distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn missing_marker_yields_none_without_touching_history() {
        let mut classifier = MotionClassifier::new(0.5, 2, 1);
        classifier.observe(&at(0.0, 0.0));
        let signal = classifier.observe(&PositionSample::missing(Utc::now()));
        assert_eq!(signal.kind, RawKind::None);
        assert!(!classifier.consistent_movement());
    }

    #[test]
    fn consistency_needs_a_full_window() {
        let mut classifier = MotionClassifier::new(0.5, 6, 4);
        let mut x = 0.0;
        for _ in 0..5 {
            classifier.observe(&at(x, 0.0));
            x += 2.0;
        }
        // Five samples, four of them moved: window not full yet.
        assert!(!classifier.consistent_movement());
        classifier.observe(&at(x, 0.0));
        assert!(classifier.consistent_movement());
    }

    #[test]
    fn old_movement_is_evicted() {
        let mut classifier = MotionClassifier::new(0.5, 6, 4);
        let mut x = 0.0;
        for _ in 0..6 {
            classifier.observe(&at(x, 0.0));
            x += 2.0;
        }
        assert!(classifier.consistent_movement());
        let resting = x - 2.0;
        for _ in 0..3 {
            classifier.observe(&at(resting, 0.0));
        }
        // Three moving ticks remain in the window, one short of the quorum.
        assert!(!classifier.consistent_movement());
    }
}
