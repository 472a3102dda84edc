use crate::errors::ClickError;
use crate::routine::{ClickEvent, EventAction};
use ratatui::backend::TestBackend;
use ratatui::layout::Constraint;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Row, Table};
use ratatui::Terminal;

pub const TIMELINE_HEADERS: [&str; 9] = [
    "Index",
    "Type",
    "Button",
    "X",
    "Y",
    "End X",
    "End Y",
    "Delay (s)",
    "Duration (s)",
];

const COLUMN_WIDTHS: [u16; 9] = [5, 5, 6, 6, 6, 6, 6, 9, 12];

/// Cell text for one event; `index` is 0-based, the row shows it 1-based.
pub fn timeline_cells(event: &ClickEvent, index: usize) -> [String; 9] {
    let dash = || "-".to_string();
    let (end_x, end_y, duration) = match event.action {
        EventAction::Click => (dash(), dash(), dash()),
        EventAction::Drag {
            end_x,
            end_y,
            duration,
        } => (end_x.to_string(), end_y.to_string(), format!("{duration:.3}")),
    };
    [
        (index + 1).to_string(),
        event.kind().as_str().to_string(),
        event.button.as_str().to_string(),
        event.x.to_string(),
        event.y.to_string(),
        end_x,
        end_y,
        event.delay.map_or_else(dash, |delay| format!("{delay:.3}")),
        duration,
    ]
}

fn aligned(cells: &[String]) -> String {
    cells
        .iter()
        .zip(COLUMN_WIDTHS)
        .map(|(cell, width)| format!("{cell:<width$}", width = usize::from(width)))
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end()
        .to_string()
}

/// Header line for the live recording feed.
pub fn live_feed_header() -> String {
    aligned(&TIMELINE_HEADERS.map(str::to_string))
}

/// One line per captured event, column-aligned with `live_feed_header`.
pub fn live_feed_line(event: &ClickEvent, index: usize) -> String {
    aligned(&timeline_cells(event, index))
}

/// Draws the routine as a bordered table into an off-screen buffer and
/// returns the frame as text.
pub fn render_timeline(routine: &[ClickEvent], title: &str, width: u16) -> Result<String, ClickError> {
    let height = u16::try_from(routine.len() + 3).unwrap_or(u16::MAX).max(4);
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).map_err(|e| ClickError::Io(e.to_string()))?;

    terminal
        .draw(|frame| {
            let header = Row::new(TIMELINE_HEADERS.map(Cell::from)).style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            );
            let rows = routine
                .iter()
                .enumerate()
                .map(|(index, event)| Row::new(timeline_cells(event, index).map(Cell::from)));
            let table = Table::new(rows, COLUMN_WIDTHS.map(Constraint::Length))
                .header(header)
                .block(Block::default().borders(Borders::ALL).title(title));
            frame.render_widget(table, frame.area());
        })
        .map_err(|e| ClickError::Io(e.to_string()))?;

    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in 0..height {
        let mut line = String::new();
        for x in 0..width {
            line.push_str(buffer[(x, y)].symbol());
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    Ok(out)
}
