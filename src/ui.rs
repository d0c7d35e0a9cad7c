use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use relief_desk::{
    AccountStatus, Beneficiary, BeneficiaryFilter, ConfirmOutcome, IdentityStatus, MemorySink,
    Severity, SortDirection, SortKey, VerificationController,
};
use std::io;
use tokio::runtime::Handle;

/// Identity-status quick filters bound to the number keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickFilter {
    All,
    Pending,
    Verified,
    Rejected,
}

impl QuickFilter {
    pub fn identity_status(&self) -> Option<IdentityStatus> {
        match self {
            QuickFilter::All => None,
            QuickFilter::Pending => Some(IdentityStatus::Pending),
            QuickFilter::Verified => Some(IdentityStatus::Verified),
            QuickFilter::Rejected => Some(IdentityStatus::Rejected),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            QuickFilter::All => "All",
            QuickFilter::Pending => "Pending",
            QuickFilter::Verified => "Verified",
            QuickFilter::Rejected => "Rejected",
        }
    }
}

pub struct App {
    pub controller: VerificationController,
    pub state: TableState,
    pub quick_filter: QuickFilter,
    pub notice: Option<(String, Color)>,
    runtime: Handle,
    activity: MemorySink,
}

impl App {
    pub fn new(controller: VerificationController, runtime: Handle, activity: MemorySink) -> Self {
        let mut state = TableState::default();
        if !controller.current_page().is_empty() {
            state.select(Some(0));
        }

        Self {
            controller,
            state,
            quick_filter: QuickFilter::All,
            notice: None,
            runtime,
            activity,
        }
    }

    pub fn selected_beneficiary(&self) -> Option<&Beneficiary> {
        self.state
            .selected()
            .and_then(|i| self.controller.current_page().get(i))
    }

    fn reset_cursor(&mut self) {
        if self.controller.current_page().is_empty() {
            self.state.select(None);
        } else {
            let last = self.controller.current_page().len() - 1;
            let i = self.state.selected().unwrap_or(0).min(last);
            self.state.select(Some(i));
        }
    }

    pub fn next(&mut self) {
        let len = self.controller.current_page().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.controller.current_page().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn next_page(&mut self) {
        let page = self.controller.page().number;
        self.controller.set_page(page + 1);
        self.state.select(Some(0));
        self.reset_cursor();
    }

    pub fn previous_page(&mut self) {
        let page = self.controller.page().number;
        self.controller.set_page(page.saturating_sub(1));
        self.state.select(Some(0));
        self.reset_cursor();
    }

    pub fn apply_quick_filter(&mut self, quick: QuickFilter) {
        self.quick_filter = quick;
        let mut filter = BeneficiaryFilter::new();
        if let Some(status) = quick.identity_status() {
            filter = filter.with_identity_status(status);
        }

        let result = self.runtime.block_on(self.controller.set_filter(filter));
        if let Err(e) = result {
            self.notice = Some((format!("Failed to load beneficiaries: {}", e), Color::Red));
        }
        self.state.select(Some(0));
        self.reset_cursor();
    }

    pub fn sort_by(&mut self, key: SortKey) {
        let sort = self.controller.sort().toggled(key);
        self.controller.set_sort(sort);
        self.reset_cursor();
    }

    pub fn toggle_current(&mut self) {
        if let Some(id) = self.selected_beneficiary().map(|b| b.id.clone()) {
            self.controller.toggle_selection(&id);
            self.next();
        }
    }

    pub fn stage_single(&mut self, approve: bool) {
        let Some((id, name)) = self
            .selected_beneficiary()
            .map(|b| (b.id.clone(), b.display_name().to_string()))
        else {
            return;
        };

        if approve {
            self.controller.approve(&id, &name);
        } else {
            self.controller.request_reupload(&id, &name);
        }
    }

    pub fn stage_batch(&mut self, approve: bool) {
        if self.controller.is_busy() {
            self.notice = Some(("A batch is still running".to_string(), Color::Yellow));
            return;
        }

        let staged = if approve {
            self.controller.batch_approve_selected().map(|_| ())
        } else {
            self.controller.batch_request_reupload_selected().map(|_| ())
        };
        if let Err(e) = staged {
            self.notice = Some((format!("{} (select rows with Space)", e), Color::Yellow));
        }
    }

    pub fn confirm(&mut self) {
        let outcome = self.runtime.block_on(self.controller.confirm());

        self.notice = Some(match outcome {
            Ok(ConfirmOutcome::Single { beneficiary }) => (
                format!(
                    "{} is now {}",
                    beneficiary.display_name(),
                    beneficiary.identity_status.label()
                ),
                Color::Green,
            ),
            Ok(ConfirmOutcome::Batch { report }) if report.is_complete_success() => (
                format!("Updated {} beneficiaries", report.succeeded_count()),
                Color::Green,
            ),
            Ok(ConfirmOutcome::Batch { report }) => (
                format!(
                    "Updated {} of {} beneficiaries; {} failed",
                    report.succeeded_count(),
                    report.requested,
                    report.failed_count()
                ),
                Color::Yellow,
            ),
            Ok(ConfirmOutcome::NothingPending) => ("Nothing to confirm".to_string(), Color::DarkGray),
            Err(e) => (format!("Update failed: {}", e), Color::Red),
        });

        self.reset_cursor();
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };

        // The confirmation dialog captures every key while open
        if app.controller.pending_action().is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => app.confirm(),
                KeyCode::Char('n') | KeyCode::Esc => {
                    app.controller.cancel();
                }
                _ => {}
            }
            continue;
        }

        app.notice = None;
        match key.code {
            KeyCode::Char('q') => {
                app.controller.reset_view();
                return Ok(());
            }
            KeyCode::Esc => app.controller.reset_view(),
            KeyCode::Down | KeyCode::Char('j') => app.next(),
            KeyCode::Up | KeyCode::Char('k') => app.previous(),
            KeyCode::Right | KeyCode::PageDown => app.next_page(),
            KeyCode::Left | KeyCode::PageUp => app.previous_page(),
            KeyCode::Char(' ') => app.toggle_current(),
            KeyCode::Char('a') => app.controller.select_current_page(),
            KeyCode::Char('c') => app.controller.clear_selection(),
            KeyCode::Char('v') => app.stage_single(true),
            KeyCode::Char('r') => app.stage_single(false),
            KeyCode::Char('V') => app.stage_batch(true),
            KeyCode::Char('R') => app.stage_batch(false),
            KeyCode::Char('1') => app.apply_quick_filter(QuickFilter::All),
            KeyCode::Char('2') => app.apply_quick_filter(QuickFilter::Pending),
            KeyCode::Char('3') => app.apply_quick_filter(QuickFilter::Verified),
            KeyCode::Char('4') => app.apply_quick_filter(QuickFilter::Rejected),
            KeyCode::Char('N') => app.sort_by(SortKey::Name),
            KeyCode::Char('I') => app.sort_by(SortKey::NationalId),
            KeyCode::Char('D') => app.sort_by(SortKey::CreatedAt),
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with statistics
            Constraint::Min(0),    // Beneficiary table + activity
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(chunks[1]);

    render_table(f, content_chunks[0], app);
    render_activity(f, content_chunks[1], app);
    render_status_bar(f, chunks[2], app);

    if app.controller.pending_action().is_some() {
        render_confirm_dialog(f, app);
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.controller.statistics();

    let filters = [
        QuickFilter::All,
        QuickFilter::Pending,
        QuickFilter::Verified,
        QuickFilter::Rejected,
    ];

    let mut spans = vec![];
    for (i, quick) in filters.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *quick == app.quick_filter {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!("{} {}", i + 1, quick.title()), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Total: {}", stats.total),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("✓ {}", stats.verified),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("… {}", stats.pending),
        Style::default().fg(Color::Yellow),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("✗ {}", stats.rejected),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Identity Verification "),
    );

    f.render_widget(header, area);
}

fn identity_color(status: IdentityStatus) -> Color {
    match status {
        IdentityStatus::Verified => Color::Green,
        IdentityStatus::Pending => Color::Yellow,
        IdentityStatus::Rejected => Color::Red,
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let sort = app.controller.sort();
    let arrow = match sort.direction {
        SortDirection::Asc => "▲",
        SortDirection::Desc => "▼",
    };
    let heading = |label: &str, key: Option<SortKey>| -> String {
        match key {
            Some(k) if k == sort.key => format!("{} {}", label, arrow),
            _ => label.to_string(),
        }
    };

    let header_cells = [
        " ".to_string(),
        heading("Name", Some(SortKey::Name)),
        heading("National ID", Some(SortKey::NationalId)),
        heading("Phone", None),
        heading("Governorate", None),
        heading("Identity", None),
        heading("Account", None),
        heading("Registered", Some(SortKey::CreatedAt)),
    ]
    .into_iter()
    .map(|h| Cell::from(h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let selection = app.controller.selection();
    let rows = app.controller.current_page().iter().map(|b| {
        let mark = if selection.contains(&b.id) { "[x]" } else { "[ ]" };
        let account_color = match b.status {
            AccountStatus::Active => Color::White,
            AccountStatus::Pending => Color::Yellow,
            AccountStatus::Suspended => Color::DarkGray,
        };

        Row::new(vec![
            Cell::from(mark),
            Cell::from(truncate(b.display_name(), 28)),
            Cell::from(b.national_id.clone()),
            Cell::from(b.phone.clone()),
            Cell::from(b.governorate.clone().unwrap_or_else(|| "-".to_string())),
            Cell::from(b.identity_status.label())
                .style(Style::default().fg(identity_color(b.identity_status))),
            Cell::from(b.status.as_str()).style(Style::default().fg(account_color)),
            Cell::from(b.created_at.format("%Y-%m-%d").to_string()),
        ])
        .height(1)
    });

    let page = app.controller.page();
    let title = format!(
        " Beneficiaries - page {}/{} - {} selected ",
        page.number,
        app.controller.total_pages().max(1),
        selection.len()
    );

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(30),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(11),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_activity(f: &mut Frame, area: Rect, app: &App) {
    let entries = app.activity.entries();
    let visible = area.height.saturating_sub(2) as usize;

    let lines: Vec<Line> = entries
        .iter()
        .rev()
        .take(visible.max(1))
        .map(|e| {
            let color = if e.event_type.contains("failed") {
                Color::Red
            } else {
                Color::Gray
            };
            Line::from(Span::styled(e.message.clone(), Style::default().fg(color)))
        })
        .collect();

    let activity = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Activity "),
        );

    f.render_widget(activity, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];

    if let Some((notice, color)) = &app.notice {
        spans.push(Span::styled(format!(" {} ", notice), Style::default().fg(*color)));
        spans.push(Span::raw("|"));
    }

    let keys: &[(&str, &str)] = &[
        ("Space", "Select"),
        ("a", "Page"),
        ("c", "Clear"),
        ("v/r", "Verify/Re-upload"),
        ("V/R", "Batch"),
        ("1-4", "Filter"),
        ("N/I/D", "Sort"),
        ("←/→", "Page"),
        ("q", "Quit"),
    ];
    for (key, label) in keys {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(format!(" {} ", label)));
    }

    let status = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(status, area);
}

fn render_confirm_dialog(f: &mut Frame, app: &App) {
    let Some(preview) = app.controller.preview() else {
        return;
    };

    let color = match preview.severity {
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
    };

    let area = centered_rect(60, 40, f.size());

    let mut lines: Vec<Line> = preview
        .message
        .lines()
        .map(|l| Line::from(l.to_string()))
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("y/Enter", Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {}    ", preview.confirm_label)),
        Span::styled("n/Esc", Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD)),
        Span::raw(" Cancel"),
    ]));

    let dialog = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .alignment(Alignment::Left)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {} ", preview.title)),
        );

    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
