use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::audio_api::AudioCommand;

pub mod envelope;
mod engine;
mod frame;
mod sample_buffer;
mod sample_id;
mod voice;

pub use envelope::Envelope;
pub use frame::StereoFrame;
pub use sample_buffer::SampleBuffer;
pub use sample_id::{SampleId, next_sample_id};

#[cfg(test)]
pub(crate) use sample_buffer::tests::write_wav;

use engine::Engine;

// scratch frames preallocated for the callback; bigger blocks grow it once
const SCRATCH_FRAMES: usize = 4096;

// Must stay on the thread that created it, cpal streams aren't Send.
// Hand `sender()` to whoever needs to talk to the engine.
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    sample_rate: u32,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn sender(&self) -> Sender<AudioCommand> {
        self.tx.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate: u32 = config.sample_rate();
    let channels = config.channels() as usize;
    log::info!(target: "downbeat::audio", "output at {sample_rate} Hz, {channels} channels");

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream = build_output_stream_f32(&device, &config.into(), rx, channels)?;
            output_stream.play().context("failed to play output stream")?;
            Ok(AudioHandle {
                tx,
                sample_rate,
                _output_stream: output_stream,
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut engine = Engine::new();
    let mut scratch = vec![StereoFrame::zero(); SCRATCH_FRAMES];

    let err_fn = |err: cpal::StreamError| log::error!(target: "downbeat::audio", "output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels.max(1);
            if scratch.len() < n_frames {
                scratch.resize(n_frames, StereoFrame::zero());
            }
            let frames = &mut scratch[..n_frames];
            engine.render_block(frames);
            interleave(frames, data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

// spread stereo frames over however many channels the device has
fn interleave(frames: &[StereoFrame], data: &mut [f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for (out, f) in data.iter_mut().zip(frames) {
                *out = f.mono();
            }
        }
        _ => {
            for (chunk, f) in data.chunks_exact_mut(channels).zip(frames) {
                chunk[0] = f.left;
                chunk[1] = f.right;
                for extra in &mut chunk[2..] {
                    *extra = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_fits_the_channel_count() {
        let frames = [StereoFrame { left: 1.0, right: 0.0 }, StereoFrame { left: 0.5, right: 0.5 }];

        let mut mono = [9.0; 2];
        interleave(&frames, &mut mono, 1);
        assert_eq!(mono, [0.5, 0.5]);

        let mut quad = [9.0; 8];
        interleave(&frames, &mut quad, 4);
        assert_eq!(quad, [1.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0]);
    }
}
