// Everything a loop needs, fixed at authoring time.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::pattern::predicate::Predicate;
use crate::pattern::preset::SamplePreset;
use crate::shared::SlotId;

/// Where a slot's audio comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// The slot-th `.wav` in the track's sample folder.
    #[default]
    Folder,
    /// One of the host's bundled samples, by name (`bd_haus`).
    Builtin(String),
}

/// One `sample dir, slot, ... if predicate(idx)` line, or a
/// `sample name, ... if predicate(idx)` line for a bundled sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotDef {
    pub slot: SlotId,
    #[serde(default)]
    pub source: SampleSource,
    #[serde(default)]
    pub label: String, // name of the predicate function in the script
    pub predicate: Predicate,
    #[serde(default)]
    pub preset: SamplePreset,
}

impl SlotDef {
    pub fn new(slot: SlotId, predicate: Predicate, preset: SamplePreset) -> Self {
        Self {
            slot,
            source: SampleSource::Folder,
            label: default_label(slot),
            predicate,
            preset,
        }
    }

    pub fn builtin(slot: SlotId, name: &str, predicate: Predicate, preset: SamplePreset) -> Self {
        Self {
            slot,
            source: SampleSource::Builtin(name.to_string()),
            label: builtin_label(name),
            predicate,
            preset,
        }
    }

    pub fn builtin_name(&self) -> Option<&str> {
        match &self.source {
            SampleSource::Builtin(name) => Some(name),
            SampleSource::Folder => None,
        }
    }
}

pub fn default_label(slot: SlotId) -> String {
    format!("sleep_sample_{}", slot.0)
}

pub fn builtin_label(name: &str) -> String {
    format!("sleep_{name}")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub samples_dir: PathBuf,
    pub bpm: f32,
    pub downbeat_count: u32, // steps in the loop
    pub downbeat_time: f32,  // beats per step
    pub slots: Vec<SlotDef>,
}

impl Track {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            bail!("bpm must be positive, got {}", self.bpm);
        }
        if self.downbeat_count == 0 {
            bail!("downbeat range is empty");
        }
        if !self.downbeat_time.is_finite() || self.downbeat_time <= 0.0 {
            bail!("downbeat time must be positive, got {}", self.downbeat_time);
        }
        self.tick_interval()?;
        for def in &self.slots {
            def.predicate
                .validate()
                .with_context(|| format!("predicate {} (slot {})", def.label, def.slot))?;
            def.preset
                .validate()
                .with_context(|| format!("preset for slot {}", def.slot))?;
        }
        Ok(())
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    pub fn tick_interval(&self) -> anyhow::Result<Duration> {
        let secs = self.downbeat_time as f64 * self.seconds_per_beat();
        let interval = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("{} beats at {} bpm is not a usable tick", self.downbeat_time, self.bpm))?;
        if interval.is_zero() {
            bail!("{} beats at {} bpm rounds to a zero-length tick", self.downbeat_time, self.bpm);
        }
        Ok(interval)
    }
}
