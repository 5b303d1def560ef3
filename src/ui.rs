use anyhow::Result;
use behavior_points::{ActivityItem, Behavior, LeaderboardEntry, Polarity};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Leaderboard,
    Behaviors,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Leaderboard => Page::Behaviors,
            Page::Behaviors => Page::Leaderboard,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Leaderboard => "Ranking",
            Page::Behaviors => "Ações",
        }
    }
}

pub struct App {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub behaviors: Vec<Behavior>,
    /// Recent ledger entries keyed by student id
    pub activity: HashMap<String, Vec<ActivityItem>>,
    pub state: TableState,
    pub behavior_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(
        leaderboard: Vec<LeaderboardEntry>,
        mut behaviors: Vec<Behavior>,
        activity: HashMap<String, Vec<ActivityItem>>,
    ) -> Self {
        let mut state = TableState::default();
        if !leaderboard.is_empty() {
            state.select(Some(0));
        }

        let mut behavior_state = TableState::default();
        if !behaviors.is_empty() {
            behavior_state.select(Some(0));
        }

        // Positive first, then negative, catalog order within each group
        behaviors.sort_by_key(|b| b.polarity == Polarity::Negative);

        Self {
            leaderboard,
            behaviors,
            activity,
            state,
            behavior_state,
            current_page: Page::Leaderboard,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_entry(&self) -> Option<&LeaderboardEntry> {
        self.state.selected().and_then(|i| self.leaderboard.get(i))
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Leaderboard => (&mut self.state, self.leaderboard.len()),
            Page::Behaviors => (&mut self.behavior_state, self.behaviors.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn total_points(&self) -> i64 {
        self.leaderboard.iter().map(|e| e.student.points).sum()
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

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab | KeyCode::BackTab => app.next_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Leaderboard if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);

            render_leaderboard(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Leaderboard => render_leaderboard(f, chunks[1], app),
        Page::Behaviors => render_behaviors(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Leaderboard, Page::Behaviors].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Alunos: {}", app.leaderboard.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Pontos: {}", app.total_points()),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_leaderboard(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.leaderboard.iter().map(|entry| {
        let color = match entry.rank {
            1 => Color::Yellow,
            2 => Color::Gray,
            3 => Color::LightRed,
            _ => Color::White,
        };

        Row::new(vec![
            Cell::from(format!("#{}", entry.rank)).style(Style::default().fg(color)),
            Cell::from(truncate(&entry.student.name, 28)),
            Cell::from(entry.student.points.to_string()).style(Style::default().fg(Color::Green)),
            Cell::from(entry.student.class_id.clone().unwrap_or_else(|| "-".to_string())),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(30),
            Constraint::Length(10),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["Pos.", "Aluno", "Pontos", "Turma"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Ranking de Celebração "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_behaviors(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.behaviors.iter().map(|behavior| {
        let color = match behavior.polarity {
            Polarity::Positive => Color::Green,
            Polarity::Negative => Color::Red,
        };
        let points = if behavior.points > 0 {
            format!("+{}", behavior.points)
        } else {
            behavior.points.to_string()
        };
        let marker = if behavior.is_severe() { "⚠" } else { "" };

        Row::new(vec![
            Cell::from(behavior.id.clone()),
            Cell::from(truncate(&behavior.name, 22)),
            Cell::from(points).style(Style::default().fg(color)),
            Cell::from(marker).style(Style::default().fg(Color::Red)),
            Cell::from(truncate(&behavior.description, 60)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(24),
            Constraint::Length(7),
            Constraint::Length(2),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Id", "Ação", "Pontos", "", "Descrição"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Catálogo de Ações "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.behavior_state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = vec![];

    match app.selected_entry() {
        Some(entry) => {
            let student = &entry.student;
            lines.push(Line::from(Span::styled(
                student.name.clone(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!(
                "Posição #{} de {}  ·  {} pontos",
                entry.rank,
                app.leaderboard.len(),
                student.points
            )));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Atividade Recente",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));

            let activity = app.activity.get(&student.id).map(Vec::as_slice).unwrap_or(&[]);
            if activity.is_empty() {
                lines.push(Line::from(Span::styled(
                    "Nenhum registro ainda.",
                    Style::default().fg(Color::DarkGray),
                )));
            }

            for item in activity {
                let color = if item.entry.applied_delta >= 0 { Color::Green } else { Color::Red };
                let name = item
                    .behavior_name
                    .clone()
                    .unwrap_or_else(|| item.entry.behavior_id.clone());

                lines.push(Line::from(vec![
                    Span::styled(format!("{:+} ", item.entry.applied_delta), Style::default().fg(color)),
                    Span::raw(name),
                    Span::styled(
                        format!("  {}", item.entry.recorded_at.format("%d/%m/%Y %H:%M")),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]));
                lines.push(Line::from(Span::styled(
                    format!("  {}", item.entry.justification),
                    Style::default().fg(Color::Gray),
                )));
            }
        }
        None => lines.push(Line::from("Nenhum aluno selecionado.")),
    }

    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Detalhes "),
        );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Leaderboard => (app.state.selected(), app.leaderboard.len()),
        Page::Behaviors => (app.behavior_state.selected(), app.behaviors.len()),
    };

    let status_spans = vec![
        Span::styled(
            format!(" Linha: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Detalhes | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Página | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Navegar | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Sair"),
    ];

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
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use behavior_points::{BehaviorCatalog, StudentRegistry};

    fn app() -> App {
        let registry = StudentRegistry::with_demo_roster();
        App::new(
            behavior_points::rank(registry.all()),
            BehaviorCatalog::builtin().all().to_vec(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();

        app.previous();
        assert_eq!(app.state.selected(), Some(4));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_pages_have_separate_selection() {
        let mut app = app();

        app.next_page();
        app.next();
        app.next();
        assert_eq!(app.behavior_state.selected(), Some(2));
        assert_eq!(app.state.selected(), Some(0));
        assert_eq!(app.current_page, Page::Behaviors);
    }

    #[test]
    fn test_behaviors_grouped_by_polarity() {
        let app = app();
        let first_negative = app
            .behaviors
            .iter()
            .position(|b| b.polarity == Polarity::Negative)
            .unwrap();

        assert!(app.behaviors[first_negative..].iter().all(|b| b.polarity == Polarity::Negative));
        assert_eq!(app.total_points(), 5000);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Colaboração", 20), "Colaboração");
        assert_eq!(truncate("Infração Média Grave", 10), "Infraçã...");
    }
}
