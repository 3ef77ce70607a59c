// Command line options. Everything else about a track lives in its file.

use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};

use crate::pattern::track::Track;

pub const USAGE: &str = "usage: downbeat <track.rb|track.json> [--dry-run] [--tui] [--ticks N] [--grid] [--samples DIR] [--bpm N] [--export PATH]";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    pub track: PathBuf,
    pub dry_run: bool, // log triggers instead of opening an audio device
    pub tui: bool,
    pub ticks: Option<u64>,
    pub grid: bool,
    pub samples: Option<PathBuf>,
    pub bpm: Option<f32>,
    pub export: Option<PathBuf>,
    pub help: bool,
}

impl Options {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        let mut track = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |name: &str| args.next().ok_or_else(|| anyhow!("{name} needs a value"));
            match arg.as_str() {
                "-h" | "--help" => opts.help = true,
                "--dry-run" => opts.dry_run = true,
                "--tui" => opts.tui = true,
                "--grid" => opts.grid = true,
                "--ticks" => {
                    let v = value("--ticks")?;
                    opts.ticks = Some(v.parse().with_context(|| format!("bad tick count {v}"))?);
                }
                "--samples" => opts.samples = Some(PathBuf::from(value("--samples")?)),
                "--bpm" => {
                    let v = value("--bpm")?;
                    let bpm: f32 = v.parse().with_context(|| format!("bad bpm {v}"))?;
                    opts.bpm = Some(bpm);
                }
                "--export" => opts.export = Some(PathBuf::from(value("--export")?)),
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                path => {
                    if track.is_some() {
                        bail!("only one track can be played at a time");
                    }
                    track = Some(PathBuf::from(path));
                }
            }
        }
        match track {
            Some(t) => opts.track = t,
            None if opts.help => {}
            None => bail!("no track given"),
        }
        Ok(opts)
    }

    // true when the run only prints or writes something and shouldn't play
    pub fn output_only(&self) -> bool {
        (self.grid || self.export.is_some()) && !self.dry_run && !self.tui && self.ticks.is_none()
    }

    pub fn apply(&self, track: &mut Track) {
        if let Some(dir) = &self.samples {
            track.samples_dir = dir.clone();
        }
        if let Some(bpm) = self.bpm {
            track.bpm = bpm;
        }
    }
}
