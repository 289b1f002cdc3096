use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use crate::models::{Racer, RunType};
use crate::results::{RankedRacer, SortKey};
use crate::util::format_clock;
use crate::view::ResultsView;

/// Display strings for one results line
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRowData {
    pub rank: Option<usize>,
    pub start_number: String,
    pub name: String,
    pub team: String,
    pub class: String,
    pub practice: String,
    pub heat1: String,
    pub heat2: String,
    pub best: String,
}

impl ResultRowData {
    pub fn from_ranked(row: &RankedRacer<'_>) -> Self {
        let racer = row.racer;
        Self {
            rank: row.rank,
            start_number: racer.start_number.clone().unwrap_or_default(),
            name: racer.display_name(),
            team: racer.team_name.clone().unwrap_or_else(|| "—".to_string()),
            class: racer.class_label(),
            practice: run_cell(racer, RunType::Practice),
            heat1: run_cell(racer, RunType::Heat1),
            heat2: run_cell(racer, RunType::Heat2),
            best: format_clock(row.best_time),
        }
    }

    pub fn rank_text(&self) -> String {
        self.rank.map(|r| format!("{r}.")).unwrap_or_else(|| "–".to_string())
    }

    pub fn cells(&self) -> [String; 9] {
        [
            self.rank_text(),
            self.start_number.clone(),
            self.name.clone(),
            self.team.clone(),
            self.class.clone(),
            self.practice.clone(),
            self.heat1.clone(),
            self.heat2.clone(),
            self.best.clone(),
        ]
    }
}

/// Time of the run type, `DQ` when every attempt of that type was
/// disqualified, blank when it was not run.
fn run_cell(racer: &Racer, run_type: RunType) -> String {
    let runs: Vec<_> = racer.race_runs.iter().filter(|r| r.run_type == run_type).collect();
    if let Some(t) = crate::results::run_time(racer, run_type) {
        format_clock(Some(t))
    } else if !runs.is_empty() && runs.iter().all(|r| r.disqualified) {
        "DQ".to_string()
    } else {
        String::new()
    }
}

pub const HEADERS: [&str; 9] = ["Rank", "No.", "Name", "Team", "Class", "PR", "H1", "H2", "Best"];

/// Header column for each sortable key; `No.` is not sortable.
fn header_index(key: SortKey) -> usize {
    match key {
        SortKey::Rank => 0,
        SortKey::Name => 2,
        SortKey::Team => 3,
        SortKey::Class => 4,
        SortKey::RunTime(RunType::Practice) => 5,
        SortKey::RunTime(RunType::Heat1) => 6,
        SortKey::RunTime(RunType::Heat2) => 7,
        SortKey::BestTime => 8,
    }
}

/// Header labels with the sort arrow on the active column
pub fn header_labels(key: SortKey, ascending: bool) -> Vec<String> {
    let arrow = if ascending { "↑" } else { "↓" };
    let active = header_index(key);
    HEADERS
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == active {
                format!("{h} {arrow}")
            } else {
                h.to_string()
            }
        })
        .collect()
}

/// Pure presenter for a single results row
pub fn present_row(data: &ResultRowData) -> Row<'static> {
    let rank_style = match data.rank {
        Some(1) => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        Some(2) => Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        Some(3) => Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD),
        Some(_) => Style::default(),
        None => Style::default().add_modifier(Modifier::DIM),
    };
    let run_style = |text: &str| {
        if text == "DQ" {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        }
    };

    Row::new(vec![
        Cell::from(data.rank_text()).style(rank_style),
        Cell::from(data.start_number.clone()),
        Cell::from(data.name.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(data.team.clone()),
        Cell::from(data.class.clone()),
        Cell::from(data.practice.clone()).style(run_style(&data.practice)),
        Cell::from(data.heat1.clone()).style(run_style(&data.heat1)),
        Cell::from(data.heat2.clone()).style(run_style(&data.heat2)),
        Cell::from(data.best.clone()).style(Style::default().fg(Color::Green)),
    ])
}

/// Render the results screen
pub fn render_results(view: &mut ResultsView, f: &mut Frame) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Table
            Constraint::Length(3), // Instructions
        ])
        .split(area);

    let sort_direction = if view.sort.ascending { "↑" } else { "↓" };
    let mut title_text = format!(
        "Results ({}) · Sort: {} {sort_direction}",
        view.filter_label(),
        view.sort.key
    );
    if let Some(status) = &view.status {
        title_text.push_str(&format!(" · {status}"));
    }
    let title = Paragraph::new(title_text)
        .block(Block::default().borders(Borders::ALL).title("Soapbox Derby"))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    let table_height = chunks[1].height.saturating_sub(3) as usize; // borders + header
    let rows = view.rows();
    let total_rows = rows.len();
    let max_scroll = total_rows.saturating_sub(table_height);
    let offset = view.scroll_offset.min(max_scroll);

    if rows.is_empty() {
        let message = if view.racers().is_empty() {
            "No results yet."
        } else {
            "No racers match the current filter."
        };
        let empty = Paragraph::new(message)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(empty, chunks[1]);
    } else {
        let visible_rows: Vec<Row> = rows
            .iter()
            .skip(offset)
            .take(table_height)
            .map(|row| present_row(&ResultRowData::from_ranked(row)))
            .collect();

        let header = Row::new(
            header_labels(view.sort.key, view.sort.ascending)
                .into_iter()
                .map(Cell::from)
                .collect::<Vec<_>>(),
        )
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

        let widths = [
            Constraint::Length(6),  // Rank
            Constraint::Length(5),  // No.
            Constraint::Min(16),    // Name
            Constraint::Min(12),    // Team
            Constraint::Length(18), // Class
            Constraint::Length(10), // PR
            Constraint::Length(10), // H1
            Constraint::Length(10), // H2
            Constraint::Length(11), // Best
        ];

        let table = Table::new(visible_rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{total_rows} racers")),
            )
            .column_spacing(1);
        f.render_widget(table, chunks[1]);
    }
    drop(rows);
    view.scroll_offset = offset;

    let instructions = Paragraph::new(
        "(1-8) sort  (c) class  (t) team  (x) clear filters  (↑/↓/PgUp/PgDn/Home) scroll  (r) reload  (q) quit",
    )
    .alignment(Alignment::Center)
    .wrap(ratatui::widgets::Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}
