use std::collections::HashMap;

use crate::audio_api::{AudioCommand, TriggerParams};

use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;
use super::sample_id::SampleId;
use super::voice::Voice;

pub const MAX_VOICES: usize = 32; // hard cap so we don't allocate in the audio callback

pub struct Engine {
    buffers: HashMap<SampleId, SampleBuffer>,
    voices: Vec<Voice>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::RegisterSample { id, buffer } => {
                self.buffers.insert(id, buffer);
            }
            AudioCommand::Trigger(t) => self.trigger_voice(t),
        }
    }

    fn trigger_voice(&mut self, t: TriggerParams) {
        // unknown ids are dropped, the sample may have failed to load
        let Some(buffer) = self.buffers.get(&t.sample_id) else {
            return;
        };
        let start = (t.start.clamp(0.0, 1.0) * buffer.len() as f32) as usize;

        // steal the oldest voice when the pool is full
        if self.voices.len() == MAX_VOICES {
            self.voices.remove(0);
        }
        self.voices.push(Voice::new(t.sample_id, start, t.envelope));
    }

    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        out.fill(StereoFrame::zero());
        for voice in &mut self.voices {
            match self.buffers.get(&voice.sample_id) {
                Some(buffer) => voice.render_into(buffer, out),
                None => voice.active = false,
            }
        }
        self.voices.retain(|v| v.active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::envelope::Envelope;

    fn ramp_buffer(len: usize) -> SampleBuffer {
        SampleBuffer {
            data: (0..len).map(|i| StereoFrame { left: i as f32, right: i as f32 }).collect(),
        }
    }

    fn trigger(id: u64, start: f32) -> AudioCommand {
        AudioCommand::Trigger(TriggerParams {
            sample_id: SampleId(id),
            start,
            envelope: Envelope::default(),
        })
    }

    #[test]
    fn registered_sample_plays_from_its_start_fraction() {
        let mut engine = Engine::new();
        engine.handle_cmd(AudioCommand::RegisterSample { id: SampleId(1), buffer: ramp_buffer(10) });
        engine.handle_cmd(trigger(1, 0.5));
        let mut out = vec![StereoFrame::zero(); 4];
        engine.render_block(&mut out);
        let left: Vec<f32> = out.iter().map(|f| f.left).collect();
        assert_eq!(left, vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(engine.active_voices(), 1);

        engine.render_block(&mut out);
        assert_eq!(out[0].left, 9.0);
        assert_eq!(out[1].left, 0.0);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn unknown_sample_is_ignored() {
        let mut engine = Engine::new();
        engine.handle_cmd(trigger(99, 0.0));
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn voices_sum_and_the_pool_is_capped() {
        let mut engine = Engine::new();
        engine.handle_cmd(AudioCommand::RegisterSample { id: SampleId(1), buffer: ramp_buffer(100) });
        for _ in 0..MAX_VOICES + 5 {
            engine.handle_cmd(trigger(1, 0.0));
        }
        assert_eq!(engine.active_voices(), MAX_VOICES);

        let mut out = vec![StereoFrame::zero(); 2];
        engine.render_block(&mut out);
        assert_eq!(out[1].left, MAX_VOICES as f32);
    }
}
