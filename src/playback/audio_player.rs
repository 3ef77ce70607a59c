use std::collections::HashMap;

use anyhow::{Context, anyhow};
use crossbeam_channel::Sender;

use super::{Player, Trigger};
use crate::audio::{Envelope, SampleId};
use crate::audio_api::{AudioCommand, TriggerParams};
use crate::loader::sample_loader;
use crate::pattern::track::{SampleSource, Track};
use crate::shared::SlotId;

// Plays through the engine. Only holds the command sender, so it can run on
// the scheduler thread while the stream stays with main.
pub struct AudioPlayer {
    tx: Sender<AudioCommand>,
    sample_rate: u32,
    seconds_per_beat: f64,
    loaded: HashMap<SlotId, SampleId>,
}

impl AudioPlayer {
    /// Loads every folder sample the track uses and registers it with the
    /// engine. Bundled samples have no audio here and stay silent.
    pub fn new(tx: Sender<AudioCommand>, sample_rate: u32, track: &Track) -> anyhow::Result<Self> {
        for name in track.slots.iter().filter_map(|def| def.builtin_name()) {
            log::warn!(target: "downbeat::audio", "no audio for bundled sample :{name}, it will stay silent");
        }
        let folder_slots: Vec<_> = track.slots.iter().filter(|def| def.source == SampleSource::Folder).collect();
        let paths = if folder_slots.is_empty() {
            Vec::new()
        } else {
            sample_loader::index_wav_in_dir(&track.samples_dir)?
        };
        let mut loaded = HashMap::new();
        for def in folder_slots {
            if loaded.contains_key(&def.slot) {
                continue;
            }
            let path = sample_loader::path_for_slot(&paths, def.slot.0 as usize)?;
            let (id, buffer) = sample_loader::load(path, sample_rate)
                .with_context(|| format!("could not load sample for slot {}", def.slot))?;
            log::debug!(
                target: "downbeat::audio",
                "slot {} -> {} ({} frames)",
                def.slot,
                path.display(),
                buffer.len()
            );
            tx.send(AudioCommand::RegisterSample { id, buffer })
                .map_err(|_| anyhow!("audio engine is gone"))?;
            loaded.insert(def.slot, id);
        }
        log::info!(
            target: "downbeat::audio",
            "loaded {} samples from {}",
            loaded.len(),
            track.samples_dir.display()
        );
        Ok(Self {
            tx,
            sample_rate,
            seconds_per_beat: track.seconds_per_beat(),
            loaded,
        })
    }
}

impl Player for AudioPlayer {
    fn play(&mut self, trigger: &Trigger<'_>) -> anyhow::Result<()> {
        if let SampleSource::Builtin(name) = trigger.source {
            log::debug!(target: "downbeat::audio", "step {}: skipping bundled :{name}", trigger.step);
            return Ok(());
        }
        let sample_id = *self
            .loaded
            .get(&trigger.slot)
            .ok_or_else(|| anyhow!("slot {} has no sample loaded", trigger.slot))?;
        let params = TriggerParams {
            sample_id,
            start: trigger.preset.start,
            envelope: Envelope::from_preset(trigger.preset, self.seconds_per_beat, self.sample_rate),
        };
        // never block the scheduler on a busy engine
        self.tx
            .try_send(AudioCommand::Trigger(params))
            .map_err(|e| anyhow!("could not queue trigger: {e}"))
    }
}
