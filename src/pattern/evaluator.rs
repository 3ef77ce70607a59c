// Decides, per slot and step, whether a sample fires.

use crate::pattern::track::{SlotDef, Track};
use crate::shared::SlotId;

#[derive(Clone, Debug, Default)]
pub struct PatternEvaluator {
    slots: Vec<SlotDef>,
}

impl PatternEvaluator {
    pub fn new(slots: Vec<SlotDef>) -> Self {
        Self { slots }
    }

    pub fn from_track(track: &Track) -> Self {
        Self::new(track.slots.clone())
    }

    /// False for slots the track doesn't define.
    pub fn should_trigger(&self, slot: SlotId, step: i64) -> bool {
        self.slots
            .iter()
            .filter(|def| def.slot == slot)
            .any(|def| def.predicate.evaluate(step))
    }

    // slots firing on `step`, in authoring order
    pub fn triggered(&self, step: i64) -> impl Iterator<Item = &SlotDef> + '_ {
        self.slots.iter().filter(move |def| def.predicate.evaluate(step))
    }

    pub fn slots(&self) -> &[SlotDef] {
        &self.slots
    }

    // one row per slot definition, one column per step
    pub fn grid(&self, len: u32) -> Vec<Vec<bool>> {
        self.slots
            .iter()
            .map(|def| (0..len).map(|s| def.predicate.evaluate(s as i64)).collect())
            .collect()
    }
}
