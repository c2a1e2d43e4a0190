use crate::backends::transport::TransportEvent;
use crate::connection::{ConnectionView, SortKey, sort_views};
use crate::gate::RefreshState;
use crate::keybindings::{KeyCategory, get_all_keybindings, get_status_bar_keybindings};
use crate::rate::per_second;
use crate::session::{ConnectionSession, TickOutcome};
use chrono::Utc;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
};
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionTab {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Default)]
pub struct FilterInput {
    pub keyword: String,
    pub editing: bool,
}

impl FilterInput {
    pub fn handle_char(&mut self, c: char) {
        self.keyword.push(c);
    }

    pub fn handle_backspace(&mut self) {
        self.keyword.pop();
    }
}

pub struct AppState {
    pub session: ConnectionSession,
    pub tab: ConnectionTab,
    pub filter: FilterInput,
    pub sort_key: SortKey,
    pub selected_index: Option<usize>,
    pub table_state: TableState,
    pub show_help: bool,
    pub show_close_all_dialog: bool,
    pub status_message: String,
    pub controller: String,
    pub transport_name: &'static str,
    /// Time between snapshots, used to turn per-tick deltas into rates
    pub tick_interval: Duration,
    pub link: LinkState,
}

impl AppState {
    pub fn new(
        controller: String,
        transport_name: &'static str,
        tick_interval: Duration,
        filter: Option<String>,
    ) -> Self {
        Self {
            session: ConnectionSession::new(),
            tab: ConnectionTab::Active,
            filter: FilterInput {
                keyword: filter.unwrap_or_default(),
                editing: false,
            },
            sort_key: SortKey::default(),
            selected_index: None, // Nothing selected initially
            table_state: TableState::default(),
            show_help: false,
            show_close_all_dialog: false,
            status_message: String::from("clashtop started. Press 'h' for help."),
            controller,
            transport_name,
            tick_interval,
            link: LinkState::Connecting,
        }
    }

    /// Apply one transport event. Returns false when nothing visible changed.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Connected => {
                self.link = LinkState::Connected;
                self.status_message = format!("Connected to {}", self.controller);
            }
            TransportEvent::Disconnected => {
                self.link = LinkState::Disconnected;
                self.status_message = "Controller connection lost, retrying...".to_string();
            }
            TransportEvent::Snapshot(snapshot) => {
                let outcome = self.session.ingest(snapshot);
                if let TickOutcome::Published { .. } = outcome {
                    self.clamp_selection();
                }
                return outcome.is_update();
            }
            TransportEvent::Error(message) => {
                self.status_message = format!("Error: {}", message);
            }
        }
        true
    }

    /// Rows of the current tab after filtering (and sorting for the active tab)
    pub fn visible_rows(&self) -> Vec<&ConnectionView> {
        match self.tab {
            ConnectionTab::Active => {
                let mut rows = self.session.active_view(&self.filter.keyword);
                sort_views(&mut rows, self.sort_key);
                rows
            }
            // Most recently closed first
            ConnectionTab::Closed => self.session.closed_view(&self.filter.keyword),
        }
    }

    pub fn get_selected_connection(&self) -> Option<&ConnectionView> {
        self.selected_index
            .and_then(|idx| self.visible_rows().get(idx).copied())
    }

    pub fn select_next(&mut self) {
        let len = self.visible_rows().len();
        if len == 0 {
            return;
        }

        let new_index = match self.selected_index {
            None => 0, // If nothing selected, select first item
            Some(idx) => (idx + 1) % len,
        };
        self.select(Some(new_index));
    }

    pub fn select_previous(&mut self) {
        let len = self.visible_rows().len();
        if len == 0 {
            return;
        }

        let new_index = match self.selected_index {
            None => 0,
            Some(0) => len - 1,
            Some(idx) => idx - 1,
        };
        self.select(Some(new_index));
    }

    fn select(&mut self, index: Option<usize>) {
        self.selected_index = index;
        self.table_state.select(index);
    }

    /// Keep the selection inside the visible rows after they change
    pub fn clamp_selection(&mut self) {
        let len = self.visible_rows().len();
        match self.selected_index {
            Some(_) if len == 0 => self.select(None),
            Some(index) if index >= len => self.select(Some(len - 1)),
            _ => {}
        }
    }

    pub fn switch_tab(&mut self) {
        self.tab = match self.tab {
            ConnectionTab::Active => ConnectionTab::Closed,
            ConnectionTab::Closed => ConnectionTab::Active,
        };
        self.select(None);
    }

    pub fn toggle_refresh(&mut self) {
        self.status_message = match self.session.toggle_refresh() {
            RefreshState::Paused => "Refresh paused, closed connections are still recorded",
            RefreshState::Live => "Refresh resumed",
        }
        .to_string();
        self.clamp_selection();
    }

    pub fn cycle_sort(&mut self) {
        self.sort_key = self.sort_key.next();
        self.status_message = format!("Sorting active connections by {}", self.sort_key.label());
    }

    pub fn describe_selected(&mut self) {
        let details = match self.get_selected_connection() {
            Some(conn) => format!(
                "{} | {} -> {} ({}:{}) | {} | process: {}",
                conn.id,
                conn.source,
                conn.host,
                conn.destination_ip,
                conn.destination_port,
                rule_text(conn),
                conn.process_path.as_deref().unwrap_or("-")
            ),
            None => "No connection selected".to_string(),
        };
        self.status_message = details;
    }

    pub fn filter_changed(&mut self) {
        self.clamp_selection();
    }
}

/// Tab badge count, capped like "99+"
pub fn format_qty(qty: usize) -> String {
    if qty < 100 {
        qty.to_string()
    } else {
        "99+".to_string()
    }
}

pub fn draw_ui(f: &mut Frame, app: &mut AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Tabs + filter
            Constraint::Min(8),    // Connection table
            Constraint::Length(3), // Status bar
        ])
        .split(f.area());

    draw_header(f, chunks[0], app);
    draw_tabs(f, chunks[1], app);
    draw_connection_table(f, chunks[2], app);
    draw_status_bar(f, chunks[3], app);

    if app.show_close_all_dialog {
        draw_close_all_dialog(f, f.area(), app);
    }

    if app.show_help {
        draw_help_overlay(f, f.area());
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &AppState) {
    let (link_text, link_color) = match app.link {
        LinkState::Connecting => ("connecting", Color::Yellow),
        LinkState::Connected => ("connected", Color::Green),
        LinkState::Disconnected => ("disconnected", Color::Red),
    };

    let refresh = app.session.refresh_state();
    let refresh_style = match refresh {
        RefreshState::Live => Style::default().fg(Color::Green),
        RefreshState::Paused => Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD),
    };

    let totals = app.session.totals();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "clashtop ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{} via {} ", app.controller, app.transport_name)),
        Span::styled(format!("({}) ", link_text), Style::default().fg(link_color)),
        Span::styled(
            format!("↓{} ", ConnectionView::format_bytes(totals.download)),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!("↑{} ", ConnectionView::format_bytes(totals.upload)),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(format!(" {} ", refresh.label()), refresh_style),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_tabs(f: &mut Frame, area: Rect, app: &AppState) {
    let tabs = [
        (
            ConnectionTab::Active,
            "Active",
            app.session.active_view(&app.filter.keyword).len(),
        ),
        (
            ConnectionTab::Closed,
            "Closed",
            app.session.closed_view(&app.filter.keyword).len(),
        ),
    ];

    let mut spans = vec![];
    for (i, (tab, name, qty)) in tabs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }

        let style = if *tab == app.tab {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Gray)
        };

        spans.push(Span::raw("["));
        spans.push(Span::styled(format!("{} {}", name, format_qty(*qty)), style));
        spans.push(Span::raw("]"));
    }

    spans.push(Span::raw("   Filter: "));
    let filter_style = if app.filter.editing {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    if app.filter.keyword.is_empty() && !app.filter.editing {
        spans.push(Span::styled("(none)", Style::default().fg(Color::DarkGray)));
    } else {
        spans.push(Span::styled(app.filter.keyword.clone(), filter_style));
    }
    if app.filter.editing {
        spans.push(Span::styled("▏", filter_style));
    }

    if app.tab == ConnectionTab::Active {
        spans.push(Span::styled(
            format!("   Sort: {}", app.sort_key.label()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let widget = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(widget, area);
}

fn rule_text(conn: &ConnectionView) -> String {
    if conn.rule_payload.is_empty() {
        conn.rule.clone()
    } else {
        format!("{}({})", conn.rule, conn.rule_payload)
    }
}

fn draw_connection_table(f: &mut Frame, area: Rect, app: &mut AppState) {
    let title = match app.tab {
        ConnectionTab::Active => "Active Connections",
        ConnectionTab::Closed => "Closed Connections",
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let now = Utc::now();
    let rows: Vec<Row> = app
        .visible_rows()
        .iter()
        .map(|conn| {
            let (upload_rate, download_rate) = per_second(conn.rates(), app.tick_interval);
            Row::new(vec![
                Cell::from(conn.host.clone()),
                Cell::from(conn.conn_type.clone()),
                Cell::from(conn.chains.clone()),
                Cell::from(rule_text(conn)),
                Cell::from(Span::styled(
                    ConnectionView::format_rate(download_rate.round() as i64),
                    Style::default().fg(Color::Green),
                )),
                Cell::from(Span::styled(
                    ConnectionView::format_rate(upload_rate.round() as i64),
                    Style::default().fg(Color::Yellow),
                )),
                Cell::from(Span::styled(
                    ConnectionView::format_bytes(conn.download),
                    Style::default().fg(Color::Cyan),
                )),
                Cell::from(Span::styled(
                    ConnectionView::format_bytes(conn.upload),
                    Style::default().fg(Color::Magenta),
                )),
                Cell::from(conn.source.clone()),
                Cell::from(conn.format_age(now)),
            ])
        })
        .collect();

    if rows.is_empty() {
        let placeholder = if app.filter.keyword.is_empty() {
            "No connections".to_string()
        } else {
            format!("No connections match \"{}\"", app.filter.keyword)
        };
        let widget = Paragraph::new(placeholder)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(widget, area);
        return;
    }

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        "Host", "Type", "Chains", "Rule", "DL Speed", "UL Speed", "DL", "UL", "Source", "Age",
    ])
    .style(bold);

    let widths = [
        Constraint::Min(24),
        Constraint::Length(16),
        Constraint::Min(14),
        Constraint::Min(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(21),
        Constraint::Length(5),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn wrap_spans_to_lines(spans: Vec<Span>, max_width: u16) -> Vec<Line> {
    let mut lines = vec![];
    let mut current_line = vec![];
    let mut current_width = 0;

    for span in spans {
        let span_width = span.content.width() as u16;

        if current_width + span_width > max_width && !current_line.is_empty() {
            lines.push(Line::from(std::mem::take(&mut current_line)));
            current_width = 0;
        }

        current_width += span_width;
        current_line.push(span);
    }

    if !current_line.is_empty() {
        lines.push(Line::from(current_line));
    }

    // Return at least one empty line if no content
    if lines.is_empty() {
        lines.push(Line::from(""));
    }

    lines
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &AppState) {
    // Auto-generate status bar from centralized keybindings
    let mut spans = vec![];

    for (i, (key, description)) in get_status_bar_keybindings().iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            format!("[{}]", key),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw(format!(" {} ", description)));
    }

    spans.push(Span::raw("| "));
    spans.push(Span::styled(
        app.status_message.clone(),
        Style::default().fg(Color::Gray),
    ));

    let available_width = area.width.saturating_sub(2); // minus left/right borders
    let status = Paragraph::new(wrap_spans_to_lines(spans, available_width))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn draw_help_overlay(f: &mut Frame, area: Rect) {
    let mut help_text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "clashtop - Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    let bindings = get_all_keybindings();
    for category in [KeyCategory::Navigation, KeyCategory::Actions, KeyCategory::System] {
        help_text.push(Line::from(""));
        help_text.push(Line::from(Span::styled(
            category.title(),
            Style::default().fg(Color::Yellow),
        )));
        for binding in bindings.iter().filter(|b| b.category == category) {
            help_text.push(Line::from(format!(
                "  {:14} - {}",
                binding.key, binding.description
            )));
        }
    }

    help_text.push(Line::from(""));
    help_text.push(Line::from("Press any key to close..."));

    let help = Paragraph::new(help_text)
        .style(Style::default().bg(Color::Black).fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .style(Style::default().fg(Color::Cyan)),
        );

    let help_area = centered_rect(60, 60, area);
    f.render_widget(Clear, help_area);
    f.render_widget(help, help_area);
}

fn draw_close_all_dialog(f: &mut Frame, area: Rect, app: &AppState) {
    let dialog_text = vec![
        Line::from(""),
        Line::from(format!(
            "Close all {} active connection(s) at the proxy?",
            app.session.active_count()
        )),
        Line::from(""),
        Line::from(Span::styled(
            "[y/Enter] Close all  [n/Esc] Cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let dialog = Paragraph::new(dialog_text)
        .alignment(Alignment::Center)
        .style(Style::default().bg(Color::Black).fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Close All Connections")
                .style(Style::default().fg(Color::Red)),
        );

    let dialog_area = centered_rect(50, 25, area);
    f.render_widget(Clear, dialog_area);
    f.render_widget(dialog, dialog_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::record;
    use crate::snapshot::Snapshot;
    use ratatui::{Terminal, backend::TestBackend};

    fn app() -> AppState {
        AppState::new(
            "http://127.0.0.1:9090".to_string(),
            "poll",
            Duration::from_secs(1),
            None,
        )
    }

    fn tick(app: &mut AppState, ids: &[&str]) {
        let connections = ids.iter().map(|id| record(id, 10, 10)).collect();
        app.handle_transport_event(TransportEvent::Snapshot(Snapshot {
            download_total: None,
            upload_total: None,
            connections,
        }));
    }

    #[test]
    fn test_empty_ticks_need_no_redraw() {
        let mut app = app();
        let empty = || {
            TransportEvent::Snapshot(Snapshot {
                download_total: None,
                upload_total: None,
                connections: vec![],
            })
        };

        assert!(!app.handle_transport_event(empty()));
        tick(&mut app, &["a"]);
        // Closing the last connection is visible
        assert!(app.handle_transport_event(empty()));
        assert!(!app.handle_transport_event(empty()));
        assert!(app.handle_transport_event(TransportEvent::Connected));
    }

    #[test]
    fn test_format_qty() {
        assert_eq!(format_qty(0), "0");
        assert_eq!(format_qty(99), "99");
        assert_eq!(format_qty(100), "99+");
        assert_eq!(format_qty(101), "99+");
    }

    #[test]
    fn test_selection_wraps_and_clamps() {
        let mut app = app();
        tick(&mut app, &["a", "b", "c"]);

        app.select_previous();
        assert_eq!(app.selected_index, Some(0));
        app.select_previous();
        assert_eq!(app.selected_index, Some(2));
        app.select_next();
        assert_eq!(app.selected_index, Some(0));

        app.select_previous();
        tick(&mut app, &["a"]);
        assert_eq!(app.selected_index, Some(0));

        tick(&mut app, &[]);
        assert_eq!(app.selected_index, None);
    }

    #[test]
    fn test_tabs_show_filtered_views() {
        let mut app = app();
        tick(&mut app, &["a", "b"]);
        tick(&mut app, &["b"]);

        assert_eq!(app.visible_rows().len(), 1);
        app.switch_tab();
        assert_eq!(app.tab, ConnectionTab::Closed);
        assert_eq!(app.visible_rows()[0].id, "a");

        app.filter.keyword = "b.example".to_string();
        app.filter_changed();
        assert!(app.visible_rows().is_empty());
    }

    #[test]
    fn test_pause_freezes_rows() {
        let mut app = app();
        tick(&mut app, &["a"]);
        app.toggle_refresh();
        tick(&mut app, &["b"]);

        assert_eq!(app.visible_rows()[0].id, "a");
        assert!(app.status_message.contains("paused"));

        app.toggle_refresh();
        assert_eq!(app.visible_rows()[0].id, "b");
    }

    #[test]
    fn test_describe_selected() {
        let mut app = app();
        app.describe_selected();
        assert_eq!(app.status_message, "No connection selected");

        tick(&mut app, &["a"]);
        app.select_next();
        app.describe_selected();
        assert!(
            app.status_message
                .starts_with("a | 192.168.1.20:50123 -> a.example.com:443 (93.184.216.34:443)")
        );
    }

    #[test]
    fn test_transport_events_update_link() {
        let mut app = app();
        app.handle_transport_event(TransportEvent::Connected);
        assert_eq!(app.link, LinkState::Connected);

        app.handle_transport_event(TransportEvent::Error("bad payload".to_string()));
        assert_eq!(app.status_message, "Error: bad payload");
        assert_eq!(app.link, LinkState::Connected);

        app.handle_transport_event(TransportEvent::Disconnected);
        assert_eq!(app.link, LinkState::Disconnected);
    }

    #[test]
    fn test_wrap_spans() {
        let spans = vec![Span::raw("aaaa"), Span::raw("bbbb"), Span::raw("cc")];
        let lines = wrap_spans_to_lines(spans, 8);
        assert_eq!(lines.len(), 2);
        assert!(wrap_spans_to_lines(vec![], 10).len() == 1);
    }

    #[test]
    fn test_draw_renders_rows() {
        let mut app = app();
        tick(&mut app, &["visible"]);
        app.show_help = true;

        let mut terminal = Terminal::new(TestBackend::new(160, 40)).unwrap();
        terminal.draw(|f| draw_ui(f, &mut app)).unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(text.contains("visible.example.com:443"));
        assert!(text.contains("Keyboard Shortcuts"));
    }
}
