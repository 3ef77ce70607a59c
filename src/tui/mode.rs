use crate::shared::{SlotId, TickReport};

// state local to the tui, fed by the scheduler's tick reports
#[derive(Clone, Debug, Default)]
pub struct TuiState {
    pub paused: bool,
    pub finished: bool, // scheduler thread is done
    pub step: Option<u32>,
    pub ticks: u64,
    pub last_fired: Vec<SlotId>,
}

impl TuiState {
    pub fn apply(&mut self, report: TickReport) {
        self.step = Some(report.step);
        self.ticks += 1;
        self.last_fired = report.fired;
    }

    pub fn status(&self) -> &'static str {
        if self.finished {
            "stopped"
        } else if self.paused {
            "paused"
        } else {
            "playing"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_update_the_state() {
        let mut ts = TuiState::default();
        assert_eq!(ts.status(), "playing");
        ts.apply(TickReport { step: 5, fired: vec![SlotId(2)] });
        assert_eq!(ts.step, Some(5));
        assert_eq!(ts.ticks, 1);
        assert_eq!(ts.last_fired, vec![SlotId(2)]);
        ts.paused = true;
        assert_eq!(ts.status(), "paused");
    }
}
