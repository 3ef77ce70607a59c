pub use crate::audio::{Envelope, SampleBuffer, SampleId};

#[derive(Clone, Debug)]
pub struct TriggerParams {
    pub sample_id: SampleId,
    pub start: f32, // fraction of the buffer to skip, 0..=1
    pub envelope: Envelope,
}

#[derive(Clone, Debug)]
pub enum AudioCommand {
    // The engine can't load files (it would stall the callback), so a buffer
    // is loaded up front (see sample_loader.rs) and registered here
    RegisterSample { id: SampleId, buffer: SampleBuffer },

    // The engine then uses the sample id to trigger the sound
    Trigger(TriggerParams),
}
