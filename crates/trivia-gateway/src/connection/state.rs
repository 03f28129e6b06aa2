use std::convert::TryFrom;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicU8, Ordering};

/// The connection state machine owned by the shard (spec.md §4.2).
///
/// `Unregistered -> Registering -> Active` is the normal path;
/// `Registering -> Replaced` happens when a prior connection for the same
/// user was superseded; `Active -> Draining -> Closed` is the terminal
/// path from any live state.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Stage {
    Unregistered,
    Registering,
    Active,
    Replaced,
    Draining,
    Closed,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Unregistered
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Stage::Unregistered => "Unregistered",
            Stage::Registering => "Registering",
            Stage::Active => "Active",
            Stage::Replaced => "Replaced",
            Stage::Draining => "Draining",
            Stage::Closed => "Closed",
        })
    }
}

impl TryFrom<u8> for Stage {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Stage::Unregistered,
            1 => Stage::Registering,
            2 => Stage::Active,
            3 => Stage::Replaced,
            4 => Stage::Draining,
            5 => Stage::Closed,
            _ => return Err(()),
        })
    }
}

/// An atomically-updated [`Stage`] shared between a connection's owning
/// shard and its read/write loops.
#[derive(Debug, Default)]
pub struct AtomicStage(AtomicU8);

impl AtomicStage {
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        AtomicStage(AtomicU8::new(stage as u8))
    }

    #[must_use]
    pub fn get(&self) -> Stage {
        Stage::try_from(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for stage in [
            Stage::Unregistered,
            Stage::Registering,
            Stage::Active,
            Stage::Replaced,
            Stage::Draining,
            Stage::Closed,
        ] {
            assert_eq!(Stage::try_from(stage as u8), Ok(stage));
        }
    }

    #[test]
    fn atomic_stage_reads_back_last_write() {
        let stage = AtomicStage::new(Stage::Unregistered);
        assert_eq!(stage.get(), Stage::Unregistered);
        stage.set(Stage::Active);
        assert_eq!(stage.get(), Stage::Active);
    }
}
