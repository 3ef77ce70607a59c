// The tick loop: take a step, fire whatever the predicates say, wait for the
// next boundary.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::{Player, Trigger};
use crate::pattern::evaluator::PatternEvaluator;
use crate::pattern::step_source::StepIndexSource;
use crate::pattern::track::Track;
use crate::shared::{Control, TickReport};

pub struct Scheduler {
    steps: StepIndexSource,
    evaluator: PatternEvaluator,
    samples_dir: PathBuf,
    interval: Duration,
}

impl Scheduler {
    pub fn new(track: &Track) -> anyhow::Result<Self> {
        Ok(Self {
            steps: StepIndexSource::new(track.downbeat_count),
            evaluator: PatternEvaluator::from_track(track),
            samples_dir: track.samples_dir.clone(),
            interval: track.tick_interval()?,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    // one step, no waiting
    pub fn tick(&mut self, player: &mut dyn Player) -> TickReport {
        let step = self.steps.next();
        let mut fired = Vec::new();
        for def in self.evaluator.triggered(step as i64) {
            let trigger = Trigger {
                step,
                slot: def.slot,
                source: &def.source,
                samples_dir: &self.samples_dir,
                preset: &def.preset,
            };
            if let Err(e) = player.play(&trigger) {
                log::warn!(target: "downbeat::sched", "step {step}: slot {} did not play: {e:#}", def.slot);
            }
            fired.push(def.slot);
        }
        log::debug!(target: "downbeat::sched", "step {step}: fired {fired:?}");
        TickReport { step, fired }
    }

    /// Ticks until `Stop`, a dropped controller while paused, or `limit`
    /// ticks. Returns how many ticks ran.
    pub fn run(
        &mut self,
        player: &mut dyn Player,
        control: &Receiver<Control>,
        reports: Option<&Sender<TickReport>>,
        limit: Option<u64>,
    ) -> u64 {
        let mut ticks = 0;
        let mut next = Instant::now();
        let mut paused = false;
        log::info!(
            target: "downbeat::sched",
            "playing {} steps every {:?}",
            self.steps.len(),
            self.interval
        );

        loop {
            if limit.is_some_and(|n| ticks >= n) {
                break;
            }
            if paused {
                match control.recv() {
                    Ok(Control::Resume) => {
                        log::info!(target: "downbeat::sched", "resumed at step {}", self.steps.position());
                        paused = false;
                        next = Instant::now();
                    }
                    Ok(Control::Pause) => {}
                    Ok(Control::Stop) | Err(_) => break,
                }
                continue;
            }

            // wait out the deadline, still listening for control
            match control.recv_deadline(next) {
                Ok(Control::Pause) => {
                    log::info!(target: "downbeat::sched", "paused at step {}", self.steps.position());
                    paused = true;
                    continue;
                }
                Ok(Control::Resume) => continue,
                Ok(Control::Stop) => break,
                Err(RecvTimeoutError::Timeout) => {}
                // nobody can stop us any more, plain sleep
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(next.saturating_duration_since(Instant::now()));
                }
            }

            let report = self.tick(player);
            ticks += 1;
            if let Some(tx) = reports {
                let _ = tx.send(report);
            }

            // absolute deadlines so jitter doesn't accumulate, but don't
            // burst through missed ticks after a long stall
            next += self.interval;
            let now = Instant::now();
            if next + self.interval < now {
                log::warn!(target: "downbeat::sched", "fell behind by {:?}, skipping ahead", now - next);
                next = now;
            }
        }

        log::info!(target: "downbeat::sched", "stopped after {ticks} ticks");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::predicate::{Condition, ConditionSet, Predicate, Rule, Outcome};
    use crate::pattern::preset::SamplePreset;
    use crate::pattern::track::SlotDef;
    use crate::shared::SlotId;

    #[derive(Default)]
    struct Recorder {
        played: Vec<(u32, SlotId)>,
        fail: bool,
    }

    impl Player for Recorder {
        fn play(&mut self, trigger: &Trigger<'_>) -> anyhow::Result<()> {
            self.played.push((trigger.step, trigger.slot));
            if self.fail {
                anyhow::bail!("no device");
            }
            Ok(())
        }
    }

    fn track(bpm: f32) -> Track {
        Track {
            name: "t".into(),
            samples_dir: "kit".into(),
            bpm,
            downbeat_count: 4,
            downbeat_time: 1.0,
            slots: vec![
                SlotDef::new(SlotId(0), Predicate::always(), SamplePreset::default()),
                SlotDef::new(
                    SlotId(1),
                    Predicate::new(Rule::test(Condition::congruent(1, 2), Rule::Return(Outcome::True), Rule::Return(Outcome::False))),
                    SamplePreset::default(),
                ),
                SlotDef::new(SlotId(2), Predicate::split(2, 4, ConditionSet::never(), ConditionSet::never()), SamplePreset::default()),
            ],
        }
    }

    #[test]
    fn ticks_fire_the_expected_slots_and_wrap() {
        let mut sched = Scheduler::new(&track(60.0)).unwrap();
        let mut player = Recorder::default();
        let reports: Vec<TickReport> = (0..6).map(|_| sched.tick(&mut player)).collect();

        let steps: Vec<u32> = reports.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 0, 1]);
        assert_eq!(reports[0].fired, vec![SlotId(0)]);
        assert_eq!(reports[1].fired, vec![SlotId(0), SlotId(1)]);
        assert_eq!(player.played.len(), 9);
        assert!(player.played.iter().all(|(_, slot)| *slot != SlotId(2)));
    }

    #[test]
    fn run_honors_the_tick_limit() {
        // 60000 bpm makes a tick one millisecond
        let mut sched = Scheduler::new(&track(60000.0)).unwrap();
        assert_eq!(sched.interval(), Duration::from_millis(1));
        let (_ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut player = Recorder::default();

        assert_eq!(sched.run(&mut player, &ctl_rx, Some(&tx), Some(10)), 10);
        let steps: Vec<u32> = rx.try_iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn stop_ends_the_loop() {
        let mut sched = Scheduler::new(&track(60.0)).unwrap();
        let (ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
        ctl_tx.send(Control::Stop).unwrap();
        assert_eq!(sched.run(&mut Recorder::default(), &ctl_rx, None, None), 0);
    }

    #[test]
    fn pause_then_resume_keeps_going() {
        let mut sched = Scheduler::new(&track(60000.0)).unwrap();
        let (ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
        ctl_tx.send(Control::Pause).unwrap();
        ctl_tx.send(Control::Resume).unwrap();
        assert_eq!(sched.run(&mut Recorder::default(), &ctl_rx, None, Some(3)), 3);
    }

    #[test]
    fn dropped_controller_while_paused_stops() {
        let mut sched = Scheduler::new(&track(60000.0)).unwrap();
        let (ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
        ctl_tx.send(Control::Pause).unwrap();
        drop(ctl_tx);
        assert_eq!(sched.run(&mut Recorder::default(), &ctl_rx, None, None), 0);
    }

    #[test]
    fn player_errors_do_not_stop_the_loop() {
        let mut sched = Scheduler::new(&track(60000.0)).unwrap();
        let (_ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
        let mut player = Recorder { fail: true, ..Default::default() };
        assert_eq!(sched.run(&mut player, &ctl_rx, None, Some(4)), 4);
        assert_eq!(player.played.len(), 6);
    }
}
