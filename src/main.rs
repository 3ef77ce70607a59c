mod audio;
mod audio_api;
mod config;
mod loader;
mod pattern;
mod playback;
mod script;
mod shared;
mod tui;

use std::time::Duration;

use anyhow::anyhow;
use crossbeam_channel::TryRecvError;
use crossterm::terminal;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::{Options, USAGE};
use pattern::evaluator::PatternEvaluator;
use pattern::persistence;
use pattern::track::Track;
use playback::{AudioPlayer, LogPlayer, Player, Scheduler};
use shared::{Control, InputEvent};

fn main() {
    let opts = match Options::parse(std::env::args().skip(1)) {
        Ok(opts) if opts.help => {
            println!("{USAGE}");
            return;
        }
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {e:#}\n{USAGE}");
            std::process::exit(2);
        }
    };

    // the tui owns the terminal, so stay quiet there unless RUST_LOG asks otherwise
    let default_filter = if opts.tui { "off" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(opts) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(opts: Options) -> anyhow::Result<()> {
    let mut track = persistence::load_track(&opts.track)?;
    opts.apply(&mut track);
    track.validate()?;
    log::info!(
        "{}: {} slots, {} steps of {} beats at {} bpm",
        track.name,
        track.slots.len(),
        track.downbeat_count,
        track.downbeat_time,
        track.bpm
    );

    if let Some(path) = &opts.export {
        persistence::save_track(path, &track)?;
        log::info!("wrote {}", path.display());
    }
    if opts.grid {
        let grid = PatternEvaluator::from_track(&track).grid(track.downbeat_count);
        print!("{}", tui::grid::text_grid(&track.slots, &grid));
    }
    if opts.output_only() {
        return Ok(());
    }

    if opts.dry_run {
        return play(&track, LogPlayer::new(), &opts);
    }
    // the stream has to outlive playback and stay on this thread
    let audio = audio::start_audio()?;
    let player = AudioPlayer::new(audio.sender(), audio.sample_rate(), &track)?;
    play(&track, player, &opts)?;
    drop(audio);
    Ok(())
}

fn play<P: Player + Send + 'static>(track: &Track, mut player: P, opts: &Options) -> anyhow::Result<()> {
    if opts.tui {
        return run_tui(track, player, opts.ticks);
    }
    // keep the sender alive so the loop waits on its deadlines
    let (_ctl_tx, ctl_rx) = crossbeam_channel::unbounded::<Control>();
    Scheduler::new(track)?.run(&mut player, &ctl_rx, None, opts.ticks);
    Ok(())
}

fn run_tui<P: Player + Send + 'static>(track: &Track, mut player: P, ticks: Option<u64>) -> anyhow::Result<()> {
    let (ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
    let (report_tx, report_rx) = crossbeam_channel::unbounded();
    let mut scheduler = Scheduler::new(track)?;
    let worker = std::thread::spawn(move || scheduler.run(&mut player, &ctl_rx, Some(&report_tx), ticks));

    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard; // auto drops when out of scope
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let grid = PatternEvaluator::from_track(track).grid(track.downbeat_count);
    let mut state = tui::mode::TuiState::default();
    let frame_time = Duration::from_millis(16); // ~60fps

    'ui: loop {
        loop {
            match report_rx.try_recv() {
                Ok(report) => state.apply(report),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    state.finished = true;
                    break;
                }
            }
        }

        term.draw(|frame| tui::view::render(frame, frame.area(), track, &grid, &state))?;

        for event in tui::input::poll_input(frame_time)? {
            match event {
                InputEvent::Quit => break 'ui,
                InputEvent::TogglePause if !state.finished => {
                    state.paused = !state.paused;
                    let _ = ctl_tx.send(if state.paused { Control::Pause } else { Control::Resume });
                }
                InputEvent::TogglePause => {}
            }
        }
    }

    let _ = ctl_tx.send(Control::Stop);
    drop(term);
    let played = worker.join().map_err(|_| anyhow!("scheduler thread panicked"))?;
    log::info!("played {played} ticks");
    Ok(())
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
