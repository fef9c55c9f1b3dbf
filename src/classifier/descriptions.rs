use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::models::MachineState;

const RUNNING_DESCRIPTIONS: [&str; 3] = [
    "Machine operating - marker movement detected",
    "Production in progress - active motion",
    "Machine running - marker tracking active",
];

const IDLE_DESCRIPTIONS: [&str; 3] = [
    "Machine idle - marker stationary",
    "Production paused - no movement detected",
    "Machine idle - marker position stable",
];

const ERROR_DESCRIPTIONS: [&str; 3] = [
    "Error - no marker detected",
    "Machine error - lost marker tracking",
    "Machine error - marker detection failed",
];

pub fn descriptions_for(state: MachineState) -> &'static [&'static str] {
    match state {
        MachineState::Running => &RUNNING_DESCRIPTIONS,
        MachineState::Idle => &IDLE_DESCRIPTIONS,
        MachineState::Error => &ERROR_DESCRIPTIONS,
    }
}

/// Chooses the informational text stored alongside a committed state.
pub trait DescriptionPicker: Send + Sync {
    fn pick(&mut self, state: MachineState) -> String;
}

/// Cycles through each state's descriptions in order.
#[derive(Debug, Default)]
pub struct RoundRobinDescriptions {
    cursors: [usize; 3],
}

impl DescriptionPicker for RoundRobinDescriptions {
    fn pick(&mut self, state: MachineState) -> String {
        let slot = match state {
            MachineState::Running => 0,
            MachineState::Idle => 1,
            MachineState::Error => 2,
        };
        let options = descriptions_for(state);
        let text = options[self.cursors[slot] % options.len()];
        self.cursors[slot] = self.cursors[slot].wrapping_add(1);
        text.to_string()
    }
}

/// Random choice from a seeded generator, reproducible for a given seed.
pub struct SeededDescriptions {
    rng: StdRng,
}

impl SeededDescriptions {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DescriptionPicker for SeededDescriptions {
    fn pick(&mut self, state: MachineState) -> String {
        descriptions_for(state)
            .choose(&mut self.rng)
            .map(|text| text.to_string())
            .unwrap_or_else(|| state.as_str().to_string())
    }
}
