use super::{Player, Trigger};
use crate::pattern::track::SampleSource;

// dry run: says what would play
#[derive(Debug, Default)]
pub struct LogPlayer {
    played: u64,
}

impl LogPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> u64 {
        self.played
    }
}

impl Player for LogPlayer {
    fn play(&mut self, trigger: &Trigger<'_>) -> anyhow::Result<()> {
        let p = trigger.preset;
        let what = match trigger.source {
            SampleSource::Folder => format!("sample {} from {}", trigger.slot, trigger.samples_dir.display()),
            SampleSource::Builtin(name) => format!("bundled :{name} (slot {})", trigger.slot),
        };
        log::info!(
            target: "downbeat::play",
            "step {:>3}  {what}  start={} attack={}@{} decay={}@{} sustain={}@{} release={}",
            trigger.step,
            p.start,
            p.attack,
            p.attack_level,
            p.decay,
            p.decay_level,
            p.sustain,
            p.sustain_level,
            p.release,
        );
        self.played += 1;
        Ok(())
    }
}
