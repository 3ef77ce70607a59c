use super::envelope::Envelope;
use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;
use super::sample_id::SampleId;

// one playing sample; dies when the buffer or the envelope runs out
#[derive(Clone, Debug)]
pub struct Voice {
    pub sample_id: SampleId,
    pub active: bool,
    pos: usize, // frame in the buffer
    age: usize, // frames since the trigger, drives the envelope
    envelope: Envelope,
}

impl Voice {
    pub fn new(sample_id: SampleId, start: usize, envelope: Envelope) -> Self {
        Self {
            sample_id,
            active: true,
            pos: start,
            age: 0,
            envelope,
        }
    }

    pub fn render_into(&mut self, buffer: &SampleBuffer, out: &mut [StereoFrame]) {
        // we're at a certain playback position, it's our job to mix this voice into the output buffer
        for frame in out.iter_mut() {
            if !self.active {
                break;
            }
            let Some(sample) = buffer.data.get(self.pos) else {
                self.active = false;
                break;
            };
            let Some(gain) = self.envelope.level_at(self.age) else {
                self.active = false;
                break;
            };
            frame.left += sample.left * gain;
            frame.right += sample.right * gain;
            self.pos += 1;
            self.age += 1;
        }
    }
}
