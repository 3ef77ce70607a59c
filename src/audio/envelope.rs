use crate::pattern::preset::SamplePreset;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvPhase {
    Attack,
    Decay,
    Sustain,
    Release,
    Done,
}

// Gain shape of one triggered sample, with every duration in frames.
// 0 -> attack_level -> decay_level -> sustain_level -> 0, each a linear ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub attack: usize,
    pub decay: usize,
    pub sustain: Option<usize>, // None holds until the sample runs out
    pub release: usize,
    pub attack_level: f32,
    pub decay_level: f32,
    pub sustain_level: f32,
}

impl Default for Envelope {
    // full level for the whole sample
    fn default() -> Self {
        Self::from_preset(&SamplePreset::default(), 1.0, 1)
    }
}

impl Envelope {
    pub fn from_preset(preset: &SamplePreset, seconds_per_beat: f64, sample_rate: u32) -> Self {
        let frames = |beats: f32| (beats.max(0.0) as f64 * seconds_per_beat * sample_rate as f64).round() as usize;
        Self {
            attack: frames(preset.attack),
            decay: frames(preset.decay),
            sustain: (preset.sustain >= 0.0).then(|| frames(preset.sustain)),
            release: frames(preset.release),
            attack_level: preset.attack_level,
            decay_level: preset.decay_level,
            sustain_level: preset.sustain_level,
        }
    }

    // which segment frame `n` falls in, and how far into it
    pub fn phase_at(&self, n: usize) -> (EnvPhase, usize) {
        let mut n = n;
        if n < self.attack {
            return (EnvPhase::Attack, n);
        }
        n -= self.attack;
        if n < self.decay {
            return (EnvPhase::Decay, n);
        }
        n -= self.decay;
        let Some(sustain) = self.sustain else {
            return (EnvPhase::Sustain, n);
        };
        if n < sustain {
            return (EnvPhase::Sustain, n);
        }
        n -= sustain;
        if n < self.release {
            return (EnvPhase::Release, n);
        }
        (EnvPhase::Done, 0)
    }

    /// Gain at frame `n` after the trigger, or None once the envelope is over.
    pub fn level_at(&self, n: usize) -> Option<f32> {
        let (phase, at) = self.phase_at(n);
        let level = match phase {
            EnvPhase::Attack => ramp(0.0, self.attack_level, at, self.attack),
            EnvPhase::Decay => ramp(self.attack_level, self.decay_level, at, self.decay),
            EnvPhase::Sustain => match self.sustain {
                Some(len) => ramp(self.decay_level, self.sustain_level, at, len),
                None => self.sustain_level,
            },
            EnvPhase::Release => ramp(self.sustain_level, 0.0, at, self.release),
            EnvPhase::Done => return None,
        };
        Some(level)
    }
}

#[inline]
fn ramp(from: f32, to: f32, at: usize, len: usize) -> f32 {
    if len == 0 {
        return to;
    }
    from + (to - from) * (at as f32 / len as f32)
}
