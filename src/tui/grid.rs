use std::ops::Range;

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::pattern::track::SlotDef;

const LABEL_WIDTH: usize = 6;

// rows are slots, columns are steps; the current column is highlighted
pub fn draw_step_grid(frame: &mut Frame, area: Rect, slots: &[SlotDef], grid: &[Vec<bool>], current: Option<u32>) {
    let block = Block::default().borders(Borders::ALL).title(" steps ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let steps = grid.first().map_or(0, |row| row.len() as u32);
    let width = (inner.width as usize).saturating_sub(LABEL_WIDTH);
    let cols = window(steps, width, current);

    let lines: Vec<Line> = slots
        .iter()
        .zip(grid)
        .map(|(def, row)| grid_line(def, row, cols.clone(), current))
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn grid_line(def: &SlotDef, row: &[bool], cols: Range<u32>, current: Option<u32>) -> Line<'static> {
    let mut spans = vec![Span::styled(
        format!("{:>4}  ", def.slot.0),
        Style::default().fg(Color::DarkGray),
    )];
    for step in cols {
        let on = row.get(step as usize).copied().unwrap_or(false);
        let mut style = if on {
            Style::default().fg(Color::LightMagenta)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        if current == Some(step) {
            style = style.bg(Color::Magenta).add_modifier(Modifier::BOLD);
        }
        spans.push(Span::styled(cell(on).to_string(), style));
    }
    Line::from(spans)
}

fn cell(on: bool) -> char {
    if on { '■' } else { '·' }
}

// the run of steps that fits in `width` columns, scrolled to keep `current` on screen
pub fn window(steps: u32, width: usize, current: Option<u32>) -> Range<u32> {
    let width = width as u32;
    if steps <= width {
        return 0..steps;
    }
    let cur = current.unwrap_or(0).min(steps.saturating_sub(1));
    let start = (cur / width.max(1)) * width;
    start..(start + width).min(steps)
}

// plain text version for `--grid`, one row per slot plus a ruler
pub fn text_grid(slots: &[SlotDef], grid: &[Vec<bool>]) -> String {
    let steps = grid.first().map_or(0, |row| row.len());
    let w = LABEL_WIDTH.max(label_width(slots));
    let mut out = format!("{:>w$}  ", "");
    out.extend((0..steps).map(|s| char::from_digit((s % 10) as u32, 10).unwrap_or('?')));
    out.push('\n');
    for (def, row) in slots.iter().zip(grid) {
        out.push_str(&format!("{:>w$}  ", def.label));
        out.extend(row.iter().map(|&on| cell(on)));
        out.push('\n');
    }
    out
}

fn label_width(slots: &[SlotDef]) -> usize {
    slots.iter().map(|d| d.label.chars().count()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::predicate::Predicate;
    use crate::pattern::preset::SamplePreset;
    use crate::shared::SlotId;

    #[test]
    fn text_grid_has_a_ruler_and_a_row_per_slot() {
        let slots = vec![
            SlotDef::new(SlotId(0), Predicate::always(), SamplePreset::default()),
            SlotDef::new(SlotId(1), Predicate::never(), SamplePreset::default()),
        ];
        let grid = vec![vec![true; 12], vec![false; 12]];
        let text = text_grid(&slots, &grid);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("012345678901"));
        assert_eq!(lines[1], "sleep_sample_0  ■■■■■■■■■■■■");
        assert_eq!(lines[2], "sleep_sample_1  ············");
    }

    #[test]
    fn everything_fits() {
        assert_eq!(window(16, 40, Some(3)), 0..16);
    }

    #[test]
    fn pages_follow_the_current_step() {
        assert_eq!(window(51, 20, None), 0..20);
        assert_eq!(window(51, 20, Some(19)), 0..20);
        assert_eq!(window(51, 20, Some(20)), 20..40);
        assert_eq!(window(51, 20, Some(45)), 40..51);
    }

    #[test]
    fn zero_width_is_empty() {
        assert!(window(51, 0, Some(10)).is_empty());
    }
}
