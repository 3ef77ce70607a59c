use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;

use super::grid::draw_step_grid;
use super::mode::TuiState;
use crate::pattern::track::Track;

pub fn render(frame: &mut Frame, area: Rect, track: &Track, grid: &[Vec<bool>], state: &TuiState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(3),    // grid
            Constraint::Length(1), // key help
        ])
        .split(area);

    draw_header(frame, sections[0], track, state);
    draw_step_grid(frame, sections[1], &track.slots, grid, state.step);
    frame.render_widget(
        Paragraph::new("space pause/resume   q/esc quit").style(Style::default().fg(Color::DarkGray)),
        sections[2],
    );
}

fn header_text(track: &Track, state: &TuiState) -> String {
    let step = state.step.map_or("-".to_string(), |s| s.to_string());
    format!(
        "{}  {} bpm  step {}/{}  tick {}  fired {}  {}",
        track.name,
        track.bpm,
        step,
        track.downbeat_count,
        state.ticks,
        state.last_fired.len(),
        state.status()
    )
}

fn draw_header(frame: &mut Frame, area: Rect, track: &Track, state: &TuiState) {
    frame.render_widget(Paragraph::new(Line::from(header_text(track, state))), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::evaluator::PatternEvaluator;
    use crate::pattern::predicate::Predicate;
    use crate::pattern::preset::SamplePreset;
    use crate::pattern::track::SlotDef;
    use crate::shared::{SlotId, TickReport};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn track() -> Track {
        Track {
            name: "funk".into(),
            samples_dir: "kit".into(),
            bpm: 59.0,
            downbeat_count: 8,
            downbeat_time: 1.7,
            slots: vec![
                SlotDef::new(SlotId(0), Predicate::always(), SamplePreset::default()),
                SlotDef::new(SlotId(9), Predicate::never(), SamplePreset::default()),
            ],
        }
    }

    #[test]
    fn header_shows_position_and_state() {
        let mut state = TuiState::default();
        assert_eq!(header_text(&track(), &state), "funk  59 bpm  step -/8  tick 0  fired 0  playing");
        state.apply(TickReport { step: 3, fired: vec![SlotId(0)] });
        state.paused = true;
        assert_eq!(header_text(&track(), &state), "funk  59 bpm  step 3/8  tick 1  fired 1  paused");
    }

    #[test]
    fn draws_one_row_per_slot() {
        let t = track();
        let grid = PatternEvaluator::from_track(&t).grid(t.downbeat_count);
        let state = TuiState { step: Some(2), ..Default::default() };
        let mut term = Terminal::new(TestBackend::new(40, 8)).unwrap();
        term.draw(|f| render(f, f.area(), &t, &grid, &state)).unwrap();

        let text: String = term.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("funk  59 bpm"));
        assert!(text.contains("■■■■■■■■"));
        assert!(text.contains("········"));
        assert!(text.contains("space pause/resume"));
    }
}
