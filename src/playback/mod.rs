//! What happens when a slot fires.

use std::path::Path;

use crate::pattern::preset::SamplePreset;
use crate::pattern::track::SampleSource;
use crate::shared::SlotId;

pub mod audio_player;
pub mod log_player;
pub mod scheduler;

pub use audio_player::AudioPlayer;
pub use log_player::LogPlayer;
pub use scheduler::Scheduler;

/// One slot firing on one step.
#[derive(Clone, Copy, Debug)]
pub struct Trigger<'a> {
    pub step: u32,
    pub slot: SlotId,
    pub source: &'a SampleSource,
    pub samples_dir: &'a Path,
    pub preset: &'a SamplePreset,
}

pub trait Player {
    fn play(&mut self, trigger: &Trigger<'_>) -> anyhow::Result<()>;
}
