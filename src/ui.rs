// 🖥️ Terminal review UI - drives a ReviewSession one transaction at a time
//
// Layout:
//   ┌ progress ───────────────────────────────┐
//   │ current transaction + rule context       │
//   ├ categories ──────┬ suggestions ──────────┤
//   └ status bar ─────────────────────────────┘

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, List, ListItem, ListState, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

use crate::entities::{Category, CategoryTree};
use crate::session::{ReviewSession, SessionState};
use crate::store::{RuleStore, TransactionSource};
use crate::suggestion::Suggestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Categories,
    Suggestions,
}

impl Focus {
    pub fn toggle(&self) -> Self {
        match self {
            Focus::Categories => Focus::Suggestions,
            Focus::Suggestions => Focus::Categories,
        }
    }
}

pub struct App<S> {
    pub session: ReviewSession<S>,
    pub categories: Vec<Category>,
    pub category_state: ListState,
    pub suggestion_state: TableState,
    pub focus: Focus,
    /// One-line feedback shown above the status bar
    pub message: Option<String>,
}

impl<S: TransactionSource + RuleStore> App<S> {
    pub fn new(session: ReviewSession<S>, categories: Vec<Category>) -> Self {
        let mut category_state = ListState::default();
        if !categories.is_empty() {
            category_state.select(Some(0));
        }

        App {
            session,
            categories,
            category_state,
            suggestion_state: TableState::default(),
            focus: Focus::Categories,
            message: None,
        }
    }

    pub fn start(&mut self) {
        match self.session.start() {
            Ok(stats) => {
                self.message = Some(format!("{} transactions to review", stats.total));
                self.preselect_suggested_category();
            }
            Err(e) => self.message = Some(format!("Error: {}", e)),
        }
    }

    pub fn selected_category(&self) -> Option<&Category> {
        self.category_state.selected().and_then(|i| self.categories.get(i))
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        self.session.last_suggestions()
    }

    /// Assign the highlighted category to the current transaction
    pub fn decide_selected(&mut self) {
        let Some(transaction_id) = self.session.current().map(|r| r.transaction.id) else {
            self.message = Some("Nothing under review".to_string());
            return;
        };
        let Some((category_id, category_name)) =
            self.selected_category().map(|c| (c.id, c.name.clone()))
        else {
            self.message = Some("No categories defined (use add-category)".to_string());
            return;
        };

        match self.session.decide(transaction_id, category_id) {
            Ok(suggestions) => {
                self.message = Some(format!(
                    "Assigned '{}' ({} rule suggestions)",
                    category_name,
                    suggestions.len()
                ));
                self.suggestion_state
                    .select(if suggestions.is_empty() { None } else { Some(0) });
                self.preselect_suggested_category();
            }
            Err(e) => self.message = Some(format!("Error: {}", e)),
        }
    }

    pub fn skip(&mut self) {
        match self.session.skip() {
            Ok(()) => {
                self.message = Some("Skipped".to_string());
                self.preselect_suggested_category();
            }
            Err(e) => self.message = Some(format!("Error: {}", e)),
        }
    }

    /// Turn suggestion `index` into a rule
    pub fn accept_suggestion(&mut self, index: usize) {
        let Some(suggestion) = self.suggestions().get(index).cloned() else {
            self.message = Some(format!("No suggestion #{}", index + 1));
            return;
        };

        match self.session.accept_suggestion(&suggestion) {
            Ok(rule) => {
                self.message = Some(format!("Added rule '{}'", rule.pattern));
                self.preselect_suggested_category();
            }
            Err(e) => self.message = Some(format!("Error: {}", e)),
        }
    }

    /// Move the category cursor to what the rules suggest, if anything
    fn preselect_suggested_category(&mut self) {
        let suggested = self.session.current().and_then(|r| r.suggested_category);
        if let Some(index) = suggested.and_then(|id| self.categories.iter().position(|c| c.id == id)) {
            self.category_state.select(Some(index));
        }
    }

    pub fn next(&mut self) {
        self.move_cursor(1);
    }

    pub fn previous(&mut self) {
        self.move_cursor(-1);
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.focus {
            Focus::Categories => {
                let i = step(self.category_state.selected(), self.categories.len(), delta);
                self.category_state.select(i);
            }
            Focus::Suggestions => {
                let len = self.suggestions().len();
                let i = step(self.suggestion_state.selected(), len, delta);
                self.suggestion_state.select(i);
            }
        }
    }

    fn category_label(&self, category: &Category) -> String {
        let tree = CategoryTree::new(&self.categories);
        tree.get_path_string(category.id)
    }
}

/// Wrapping cursor movement over `len` items
fn step(current: Option<usize>, len: usize, delta: isize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match current {
        Some(i) if delta > 0 => Some((i + 1) % len),
        Some(i) => Some((i + len - 1) % len),
        None => Some(0),
    }
}

pub fn run_ui<S: TransactionSource + RuleStore>(app: &mut App<S>) -> Result<()> {
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

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend, S: TransactionSource + RuleStore>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> io::Result<()> {
    app.start();

    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.focus = app.focus.toggle(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Enter => match app.focus {
                    Focus::Categories => app.decide_selected(),
                    Focus::Suggestions => {
                        if let Some(i) = app.suggestion_state.selected() {
                            app.accept_suggestion(i);
                        }
                    }
                },
                KeyCode::Char('s') => app.skip(),
                KeyCode::Char('a') => app.accept_suggestion(0),
                KeyCode::Char(c @ '1'..='5') => {
                    app.accept_suggestion(c as usize - '1' as usize);
                }
                KeyCode::Char('r') if !app.session.is_active() => app.start(),
                _ => {}
            }
        }
    }
}

fn ui<S: TransactionSource + RuleStore>(f: &mut Frame, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Progress
            Constraint::Length(7), // Current transaction
            Constraint::Min(0),    // Categories | Suggestions
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_progress(f, chunks[0], app);
    render_current(f, chunks[1], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[2]);

    render_categories(f, body[0], app);
    render_suggestions(f, body[1], app);
    render_status_bar(f, chunks[3], app);
}

fn focus_style(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    }
}

fn render_progress<S: TransactionSource + RuleStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let stats = app.session.stats();
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Review Progress "),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(stats.progress.clamp(0.0, 1.0))
        .label(format!(
            "{}/{} reviewed, {} remaining",
            stats.reviewed, stats.total, stats.remaining
        ));

    f.render_widget(gauge, area);
}

fn render_current<S: TransactionSource + RuleStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let label = Style::default().fg(Color::DarkGray);

    let lines = match app.session.state() {
        SessionState::Active(review) => {
            let tx = &review.transaction;
            let amount_color = if tx.amount < 0.0 { Color::Red } else { Color::Green };

            let mut lines = vec![
                Line::from(vec![
                    Span::styled("Date:        ", label),
                    Span::raw(tx.date.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Description: ", label),
                    Span::styled(
                        tx.description.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(vec![
                    Span::styled("Amount:      ", label),
                    Span::styled(format!("{:.2}", tx.amount), Style::default().fg(amount_color)),
                ]),
            ];

            if let Some(vendor) = &tx.vendor {
                lines.push(Line::from(vec![
                    Span::styled("Vendor:      ", label),
                    Span::raw(vendor.clone()),
                ]));
            }

            if let (Some(category_id), Some(rule)) = (review.suggested_category, &review.matching_rule) {
                let name = app
                    .categories
                    .iter()
                    .find(|c| c.id == category_id)
                    .map(|c| app.category_label(c))
                    .unwrap_or_else(|| format!("#{}", category_id));
                lines.push(Line::from(vec![
                    Span::styled("Rule says:   ", label),
                    Span::styled(name, Style::default().fg(Color::Green)),
                    Span::styled(
                        format!("  (pattern '{}', {:.0}%)", rule.pattern, review.confidence.unwrap_or(0.0) * 100.0),
                        label,
                    ),
                ]));
            }
            lines
        }
        SessionState::Completed => vec![Line::from(Span::styled(
            "✓ Review complete. Press r to start again, q to quit.",
            Style::default().fg(Color::Green),
        ))],
        SessionState::Idle => vec![Line::from("No session")],
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Transaction "),
    );

    f.render_widget(panel, area);
}

fn render_categories<S: TransactionSource + RuleStore>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let items: Vec<ListItem> = app
        .categories
        .iter()
        .map(|c| ListItem::new(truncate(&app.category_label(c), 40)))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(focus_style(app.focus == Focus::Categories))
                .title(" Categories "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(list, area, &mut app.category_state);
}

fn render_suggestions<S: TransactionSource + RuleStore>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let header_cells = ["#", "Pattern", "Kind", "Conf", "Samples"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .suggestions()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let color = if s.confidence >= 0.8 {
                Color::Green
            } else if s.confidence >= 0.5 {
                Color::Yellow
            } else {
                Color::White
            };

            Row::new(vec![
                Cell::from(format!("{}", i + 1)),
                Cell::from(truncate(&s.pattern, 28)),
                Cell::from(s.kind.as_str()),
                Cell::from(format!("{:.0}%", s.confidence * 100.0)).style(Style::default().fg(color)),
                Cell::from(truncate(&s.sample_matches.join(", "), 60)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(30),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(focus_style(app.focus == Focus::Suggestions))
            .title(" Rule Suggestions "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.suggestion_state);
}

fn render_status_bar<S: TransactionSource + RuleStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut status_spans = Vec::new();

    if let Some(message) = &app.message {
        status_spans.push(Span::styled(
            format!(" {} ", truncate(message, 50)),
            Style::default().fg(Color::Cyan),
        ));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Assign/Accept | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Focus | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("s", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Skip | "));
    status_spans.push(Span::styled("1-5", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Add rule | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
