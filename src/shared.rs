// types shared between the sequencer, the players and the tui

use serde::{Deserialize, Serialize};

/// Index of a sample slot. Doubles as the index of the sample file in the
/// track's sample directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u16);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// what happened on one tick, sent to the tui
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub step: u32,
    pub fired: Vec<SlotId>,
}

// messages from the front end to the scheduler loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    Stop,
}

// semantic key presses, resolved by tui/input.rs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    TogglePause,
    Quit,
}
