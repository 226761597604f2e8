use chrono::{DateTime, Utc};
use ml_monitor_core::{format_duration, LiveMetricsSource, ProcessRow, ViewOptions};
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use crate::app::{truncate, App};

const COLUMNS: [&str; 8] = ["PID", "USER", "CPU%", "MEM%", "GPU", "GPU%", "RUNTIME", "COMMAND"];
const FIXED_WIDTH: u16 = 8 + 12 + 7 + 7 + 10 + 5 + 12;

pub fn draw<M: LiveMetricsSource>(f: &mut Frame, app: &App<M>) {
    let area = f.area();
    let options = app.model.options();

    let block = Block::default()
        .title(title(app.rows().len(), options))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).split(inner);
    let table_area = chunks[0];
    let footer_area = chunks[1];

    let command_width = table_area.width.saturating_sub(FIXED_WIDTH + COLUMNS.len() as u16) as usize;
    let now = Utc::now();
    let rows = app.rows().iter().map(|row| table_row(row, now, command_width));

    let header = Row::new(COLUMNS.iter().map(|c| Cell::from(*c))).style(
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );
    let widths = [
        Constraint::Length(8),
        Constraint::Length(12),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(5),
        Constraint::Length(12),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths).header(header).column_spacing(1);
    f.render_widget(table, table_area);

    if app.rows().is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            " No tracked processes",
            Style::default().fg(Color::DarkGray),
        )));
        let y = table_area.y.saturating_add(1).min(table_area.bottom().saturating_sub(1));
        f.render_widget(empty, ratatui::layout::Rect { y, height: 1, ..table_area });
    }

    f.render_widget(Paragraph::new(footer(app.model.last_error())), footer_area);
}

fn title(count: usize, options: &ViewOptions) -> Line<'static> {
    let arrow = if options.descending { "↓" } else { "↑" };
    let scope = if options.show_terminated { "all" } else { "running" };
    Line::from(vec![
        Span::styled(" ◆ ", Style::default().fg(Color::Cyan)),
        Span::styled(
            "ML Monitor ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("({count} {scope}, sort: {} {arrow}) ", options.sort_key.label()),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

fn footer(error: Option<&str>) -> Line<'static> {
    if let Some(error) = error {
        return Line::from(Span::styled(
            format!(" {error}"),
            Style::default().fg(Color::Red),
        ));
    }
    Line::from(vec![
        Span::styled(" [s]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Sort ", Style::default().fg(Color::Gray)),
        Span::styled(" [r]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Reverse ", Style::default().fg(Color::Gray)),
        Span::styled(" [a]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Show all ", Style::default().fg(Color::Gray)),
        Span::styled(" [F5]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Refresh ", Style::default().fg(Color::Gray)),
        Span::styled(" [q]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Quit ", Style::default().fg(Color::Gray)),
    ])
}

pub fn row_color(row: &ProcessRow) -> Color {
    if !row.metrics.running {
        Color::Red
    } else if row.metrics.sleeping {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// Runtime so far, or up to the last time the daemon saw it for ended processes.
pub fn runtime(row: &ProcessRow, now: DateTime<Utc>) -> String {
    let end = if row.metrics.running {
        now
    } else {
        row.entry.last_checked_at
    };
    format_duration(row.entry.elapsed(end))
}

pub fn cells(row: &ProcessRow, now: DateTime<Utc>, command_width: usize) -> [String; 8] {
    let (cpu, mem) = if row.metrics.running {
        (
            format!("{:.1}", row.metrics.cpu_percent),
            format!("{:.1}", row.metrics.memory_percent),
        )
    } else {
        ("-".to_string(), "-".to_string())
    };
    let gpu = row
        .gpu_memory_mib()
        .map(|mib| format!("{mib} MiB"))
        .unwrap_or_else(|| "-".to_string());
    let gpu_util = row
        .metrics
        .gpu_utilization_percent
        .map(|pct| format!("{pct}%"))
        .unwrap_or_else(|| "-".to_string());
    [
        row.pid.to_string(),
        truncate(&row.entry.owner, 12),
        cpu,
        mem,
        gpu,
        gpu_util,
        runtime(row, now),
        truncate(&row.entry.command_line, command_width.max(10)),
    ]
}

fn table_row(row: &ProcessRow, now: DateTime<Utc>, command_width: usize) -> Row<'static> {
    Row::new(cells(row, now, command_width).map(Cell::from))
        .style(Style::default().fg(row_color(row)))
}
