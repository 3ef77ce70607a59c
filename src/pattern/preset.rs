use anyhow::bail;
use serde::{Deserialize, Serialize};

// Envelope settings a slot plays with; fixed once the track is loaded.
// Durations are in beats, `start` is a fraction of the sample length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplePreset {
    pub start: f32,
    pub attack: f32,
    pub attack_level: f32,
    pub decay: f32,
    pub decay_level: f32,
    pub sustain: f32, // negative = hold until the sample runs out
    pub sustain_level: f32,
    pub release: f32,
}

impl Default for SamplePreset {
    fn default() -> Self {
        Self {
            start: 0.0,
            attack: 0.0,
            attack_level: 1.0,
            decay: 0.0,
            decay_level: 1.0,
            sustain: -1.0,
            sustain_level: 1.0,
            release: 0.0,
        }
    }
}

impl SamplePreset {
    // option names as they appear after `sample dir, n,` in a script
    pub const KEYS: [&'static str; 8] = [
        "start",
        "attack",
        "attack_level",
        "decay",
        "decay_level",
        "sustain",
        "sustain_level",
        "release",
    ];

    pub fn get(&self, key: &str) -> Option<f32> {
        let v = match key {
            "start" => self.start,
            "attack" => self.attack,
            "attack_level" => self.attack_level,
            "decay" => self.decay,
            "decay_level" => self.decay_level,
            "sustain" => self.sustain,
            "sustain_level" => self.sustain_level,
            "release" => self.release,
            _ => return None,
        };
        Some(v)
    }

    // returns false for keys we don't know
    pub fn set(&mut self, key: &str, value: f32) -> bool {
        let field = match key {
            "start" => &mut self.start,
            "attack" => &mut self.attack,
            "attack_level" => &mut self.attack_level,
            "decay" => &mut self.decay,
            "decay_level" => &mut self.decay_level,
            "sustain" => &mut self.sustain,
            "sustain_level" => &mut self.sustain_level,
            "release" => &mut self.release,
            _ => return false,
        };
        *field = value;
        true
    }

    /// Builds a preset from a sample line's `key: value` options and returns
    /// the keys it didn't know. Without an explicit `decay_level` the decay
    /// ends at `sustain_level`, which is what the host does.
    pub fn from_options<'a>(opts: impl IntoIterator<Item = (&'a str, f32)>) -> (Self, Vec<&'a str>) {
        let mut preset = Self::default();
        let mut unknown = Vec::new();
        let mut decay_level = None;
        for (key, value) in opts {
            if key == "decay_level" {
                decay_level = Some(value);
            } else if !preset.set(key, value) {
                unknown.push(key);
            }
        }
        preset.decay_level = decay_level.unwrap_or(preset.sustain_level);
        (preset, unknown)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.start) {
            bail!("start must be within 0..1, got {}", self.start);
        }
        for (name, v) in [
            ("attack", self.attack),
            ("decay", self.decay),
            ("release", self.release),
            ("attack_level", self.attack_level),
            ("decay_level", self.decay_level),
            ("sustain_level", self.sustain_level),
        ] {
            if !v.is_finite() || v < 0.0 {
                bail!("{name} must be a non-negative number, got {v}");
            }
        }
        if !self.sustain.is_finite() {
            bail!("sustain must be finite");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_through_get_and_set() {
        let mut p = SamplePreset::default();
        for (i, key) in SamplePreset::KEYS.iter().enumerate() {
            assert!(p.set(key, i as f32 * 0.1));
        }
        assert_eq!(p.get("decay_level"), Some(4 as f32 * 0.1));
        assert_eq!(p.get("release"), Some(7 as f32 * 0.1));
        assert!(!p.set("amp", 1.0));
        assert_eq!(p.get("amp"), None);
    }

    #[test]
    fn missing_json_fields_take_defaults() {
        let p: SamplePreset = serde_json::from_str(r#"{"attack_level": 0.5}"#).unwrap();
        assert_eq!(p.attack_level, 0.5);
        assert_eq!(p.sustain, -1.0);
        assert_eq!(p.decay_level, 1.0);
    }

    #[test]
    fn decay_level_follows_sustain_level() {
        let (p, unknown) = SamplePreset::from_options([("sustain_level", 0.4), ("amp", 2.0)]);
        assert_eq!(p.decay_level, 0.4);
        assert_eq!(unknown, vec!["amp"]);

        let (p, _) = SamplePreset::from_options([("decay_level", 0.9), ("sustain_level", 0.4)]);
        assert_eq!(p.decay_level, 0.9);

        let (p, _) = SamplePreset::from_options([("start", 0.0)]);
        assert_eq!(p, SamplePreset::default());
    }

    #[test]
    fn validation() {
        assert!(SamplePreset::default().validate().is_ok());
        let bad_start = SamplePreset { start: 1.5, ..Default::default() };
        assert!(bad_start.validate().is_err());
        let bad_release = SamplePreset { release: -0.1, ..Default::default() };
        assert!(bad_release.validate().is_err());
    }
}
