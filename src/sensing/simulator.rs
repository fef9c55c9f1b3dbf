use std::f64::consts::TAU;

use anyhow::Result;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::models::PositionSample;

use super::source::PositionSource;

const CENTER: (f64, f64) = (320.0, 240.0);
const ORBIT_RADIUS: f64 = 40.0;
/// Radians per tick while moving; about 3.2 px of travel.
const ORBIT_STEP: f64 = 0.08;
/// Stationary jitter per axis, well under the default movement threshold.
const JITTER: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stationary,
    Moving,
    Absent,
}

impl Phase {
    /// Seconds a randomly chosen phase lasts.
    fn duration_range(&self) -> (f64, f64) {
        match self {
            Phase::Moving => (5.0, 60.0),
            Phase::Stationary => (2.0, 15.0),
            Phase::Absent => (1.0, 8.0),
        }
    }

    fn next(&self, roll: f64) -> Phase {
        match self {
            Phase::Stationary if roll < 0.8 => Phase::Moving,
            Phase::Stationary => Phase::Absent,
            Phase::Moving if roll < 0.7 => Phase::Stationary,
            Phase::Moving => Phase::Absent,
            Phase::Absent => Phase::Stationary,
        }
    }
}

enum Schedule {
    Random { fps: u32 },
    Script { steps: Vec<(Phase, u32)>, index: usize },
}

/// Camera-free stand-in: a marker that sits still, orbits, or vanishes.
pub struct SimulatedSource {
    rng: StdRng,
    tag_id: i64,
    schedule: Schedule,
    phase: Phase,
    remaining: u32,
    angle: f64,
}

impl SimulatedSource {
    /// Random walk through the phases, timed for a loop running at `fps`.
    pub fn random(seed: u64, tag_id: i64, fps: u32) -> Self {
        let mut source = Self {
            rng: StdRng::seed_from_u64(seed),
            tag_id,
            schedule: Schedule::Random { fps: fps.max(1) },
            phase: Phase::Stationary,
            remaining: 0,
            angle: 0.0,
        };
        source.remaining = source.random_ticks(Phase::Stationary);
        source
    }

    /// Plays `steps` (phase, tick count) in order and then starts over.
    /// Zero-length steps are dropped; an empty script never sees the marker.
    pub fn scripted(tag_id: i64, steps: Vec<(Phase, u32)>) -> Self {
        let steps: Vec<(Phase, u32)> = steps.into_iter().filter(|(_, ticks)| *ticks > 0).collect();
        let (phase, remaining) = steps.first().copied().unwrap_or((Phase::Absent, u32::MAX));
        Self {
            rng: StdRng::seed_from_u64(u64::try_from(tag_id).unwrap_or_default()),
            tag_id,
            schedule: Schedule::Script { steps, index: 0 },
            phase,
            remaining,
            angle: 0.0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn random_ticks(&mut self, phase: Phase) -> u32 {
        let Schedule::Random { fps } = self.schedule else {
            return 1;
        };
        let (min, max) = phase.duration_range();
        let secs = self.rng.gen_range(min..max);
        ((secs * f64::from(fps)).round() as u32).max(1)
    }

    fn advance_phase(&mut self) {
        let next = match &mut self.schedule {
            Schedule::Script { steps, index } => {
                if steps.is_empty() {
                    Some((Phase::Absent, u32::MAX))
                } else {
                    *index = (*index + 1) % steps.len();
                    Some(steps[*index])
                }
            }
            Schedule::Random { .. } => None,
        };

        match next {
            Some((phase, ticks)) => {
                self.phase = phase;
                self.remaining = ticks;
            }
            None => {
                let roll = self.rng.gen::<f64>();
                let phase = self.phase.next(roll);
                self.phase = phase;
                self.remaining = self.random_ticks(phase);
            }
        }
    }

    fn position(&mut self) -> (f64, f64) {
        match self.phase {
            Phase::Moving => self.angle = (self.angle + ORBIT_STEP) % TAU,
            Phase::Stationary | Phase::Absent => {}
        }
        let x = CENTER.0 + ORBIT_RADIUS * self.angle.cos();
        let y = CENTER.1 + ORBIT_RADIUS * self.angle.sin();
        if self.phase == Phase::Stationary {
            (
                x + self.rng.gen_range(-JITTER..JITTER),
                y + self.rng.gen_range(-JITTER..JITTER),
            )
        } else {
            (x, y)
        }
    }
}

impl PositionSource for SimulatedSource {
    fn next_sample(&mut self) -> Result<PositionSample> {
        while self.remaining == 0 {
            self.advance_phase();
        }
        self.remaining = self.remaining.saturating_sub(1);

        let at = Utc::now();
        let sample = match self.phase {
            Phase::Absent => PositionSample::missing(at),
            Phase::Stationary | Phase::Moving => {
                let (x, y) = self.position();
                PositionSample::detected(x, y, Some(self.tag_id), at)
            }
        };
        Ok(sample)
    }
}
