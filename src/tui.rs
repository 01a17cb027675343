use std::io::{self, stdout};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    prelude::CrosstermBackend,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};

use crate::graph::BandGraph;
use crate::query::{self, Filters, Recommendation, SortKey};

const POPULARITY_STEP: u8 = 5;
/// Stops for the max-followers ceiling, from underground to mainstream.
const FOLLOWER_STEPS: &[u64] = &[
    100, 1_000, 10_000, 50_000, 100_000, 500_000, 1_000_000, 10_000_000,
];

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Normal,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Bands,
    Recommendations,
}

struct App {
    graph: BandGraph,
    names: Vec<String>,
    countries: Vec<String>,
    filtered: Vec<usize>,
    list_state: ListState,
    rec_state: ListState,
    mode: Mode,
    panel: Panel,
    search_query: String,
    filters: Filters,
    sort: SortKey,
    recommendations: Vec<Recommendation>,
    status_msg: String,
    show_stats: bool,
}

impl App {
    fn new(graph: BandGraph, filters: Filters) -> Self {
        let names = graph.names();
        let countries = graph.countries();
        let filtered: Vec<usize> = (0..names.len()).collect();
        let mut list_state = ListState::default();
        if !filtered.is_empty() {
            list_state.select(Some(0));
        }
        let mut app = App {
            graph,
            names,
            countries,
            filtered,
            list_state,
            rec_state: ListState::default(),
            mode: Mode::Normal,
            panel: Panel::Bands,
            search_query: String::new(),
            filters,
            sort: SortKey::default(),
            recommendations: Vec::new(),
            status_msg: String::new(),
            show_stats: false,
        };
        app.refresh();
        app
    }

    fn apply_filter(&mut self) {
        if self.search_query.is_empty() {
            self.filtered = (0..self.names.len()).collect();
        } else {
            let q = self.search_query.to_lowercase();
            self.filtered = self
                .names
                .iter()
                .enumerate()
                .filter(|(_, n)| n.to_lowercase().contains(&q))
                .map(|(i, _)| i)
                .collect();
        }
        if self.filtered.is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(0));
        }
        self.refresh();
    }

    fn selected_band(&self) -> Option<&str> {
        self.list_state
            .selected()
            .and_then(|i| self.filtered.get(i))
            .and_then(|&idx| self.names.get(idx))
            .map(String::as_str)
    }

    /// Recompute recommendations for the highlighted band.
    fn refresh(&mut self) {
        self.recommendations = match self.selected_band() {
            Some(band) => query::recommend(&self.graph, band, &self.filters, self.sort)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        self.rec_state.select(if self.recommendations.is_empty() {
            None
        } else {
            Some(0)
        });
    }

    fn move_selection(&mut self, delta: isize) {
        match self.panel {
            Panel::Bands => {
                if self.filtered.is_empty() {
                    return;
                }
                let cur = self.list_state.selected().unwrap_or(0) as isize;
                let next = (cur + delta).clamp(0, self.filtered.len() as isize - 1) as usize;
                self.list_state.select(Some(next));
                self.refresh();
            }
            Panel::Recommendations => {
                if self.recommendations.is_empty() {
                    return;
                }
                let cur = self.rec_state.selected().unwrap_or(0) as isize;
                let next =
                    (cur + delta).clamp(0, self.recommendations.len() as isize - 1) as usize;
                self.rec_state.select(Some(next));
            }
        }
    }

    fn jump_top(&mut self) {
        match self.panel {
            Panel::Bands => {
                if !self.filtered.is_empty() {
                    self.list_state.select(Some(0));
                    self.refresh();
                }
            }
            Panel::Recommendations => {
                if !self.recommendations.is_empty() {
                    self.rec_state.select(Some(0));
                }
            }
        }
    }

    fn jump_bottom(&mut self) {
        match self.panel {
            Panel::Bands => {
                if !self.filtered.is_empty() {
                    self.list_state.select(Some(self.filtered.len() - 1));
                    self.refresh();
                }
            }
            Panel::Recommendations => {
                if !self.recommendations.is_empty() {
                    self.rec_state.select(Some(self.recommendations.len() - 1));
                }
            }
        }
    }

    fn cycle_sort(&mut self) {
        self.sort = self.sort.next();
        self.status_msg = format!("sorted by {}", self.sort);
        self.refresh();
    }

    fn adjust_popularity(&mut self, raise: bool) {
        let p = self.filters.max_popularity;
        self.filters.max_popularity = if raise {
            p.saturating_add(POPULARITY_STEP).min(100)
        } else {
            p.saturating_sub(POPULARITY_STEP)
        };
        self.status_msg = format!("max popularity {}", self.filters.max_popularity);
        self.refresh();
    }

    fn adjust_connections(&mut self, raise: bool) {
        let c = self.filters.min_connections;
        self.filters.min_connections = if raise {
            c.saturating_add(1)
        } else {
            c.saturating_sub(1).max(1)
        };
        self.status_msg = format!("min connections {}", self.filters.min_connections);
        self.refresh();
    }

    /// Move the followers ceiling to the next stop. A ceiling past the last
    /// stop in that direction is left alone.
    fn adjust_followers(&mut self, raise: bool) {
        let f = self.filters.max_followers;
        let next = if raise {
            FOLLOWER_STEPS.iter().copied().find(|&s| s > f)
        } else {
            FOLLOWER_STEPS.iter().rev().copied().find(|&s| s < f)
        };
        self.filters.max_followers = next.unwrap_or(f);
        self.status_msg = format!("max followers {}", self.filters.max_followers);
        self.refresh();
    }

    /// All countries, then each known country on its own, then all again.
    fn cycle_country(&mut self) {
        let next = match self.filters.countries.len() {
            0 => self.countries.first(),
            1 => self
                .countries
                .iter()
                .position(|c| self.filters.countries.contains(c))
                .and_then(|i| self.countries.get(i + 1)),
            _ => None,
        };
        self.filters.countries = next.cloned().into_iter().collect();
        self.status_msg = format!("country {}", self.country_label());
        self.refresh();
    }

    fn country_label(&self) -> String {
        if self.filters.countries.is_empty() {
            "all".to_string()
        } else {
            self.filters
                .countries
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    /// Make the highlighted recommendation the selected band.
    fn drill_into(&mut self) {
        if self.panel != Panel::Recommendations {
            return;
        }
        let Some(target) = self
            .rec_state
            .selected()
            .and_then(|i| self.recommendations.get(i))
            .map(|r| r.band.clone())
        else {
            return;
        };
        if !self.select_name(&target) {
            self.search_query.clear();
            self.apply_filter();
            self.select_name(&target);
        }
        self.panel = Panel::Bands;
        self.refresh();
    }

    fn select_name(&mut self, name: &str) -> bool {
        let pos = self
            .filtered
            .iter()
            .position(|&idx| self.names.get(idx).is_some_and(|n| n == name));
        if pos.is_some() {
            self.list_state.select(pos);
        }
        pos.is_some()
    }
}

/// Green for hidden gems, red for the mainstream.
fn popularity_color(p: u8) -> Color {
    if p <= 30 {
        Color::Green
    } else if p <= 60 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn popularity_span(p: Option<u8>) -> Span<'static> {
    match p {
        Some(p) => Span::styled(format!("{p:>3}"), Style::default().fg(popularity_color(p))),
        None => Span::styled("  ?", Style::default().fg(Color::DarkGray)),
    }
}

fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(size);
    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(25),
            Constraint::Percentage(45),
        ])
        .split(main_chunks[0]);
    draw_band_list(f, app, panels[0]);
    draw_details(f, app, panels[1]);
    draw_recommendations(f, app, panels[2]);
    draw_status_bar(f, app, main_chunks[1]);
    if app.show_stats {
        draw_stats_overlay(f, app, size);
    }
    if app.mode == Mode::Search {
        draw_input_bar(f, app, size);
    }
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn draw_band_list(f: &mut Frame, app: &mut App, area: Rect) {
    let title = if app.search_query.is_empty() {
        format!(" Bands ({}) ", app.filtered.len())
    } else {
        format!(" Bands [/{}] ({}) ", app.search_query, app.filtered.len())
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(focus_style(app.panel == Panel::Bands));
    let items: Vec<ListItem> = app
        .filtered
        .iter()
        .filter_map(|&idx| app.names.get(idx))
        .map(|n| ListItem::new(n.clone()))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn draw_details(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().title(" Band ").borders(Borders::ALL);
    let Some(band) = app.selected_band().and_then(|n| app.graph.band(n)) else {
        f.render_widget(Paragraph::new("No band selected").block(block), area);
        return;
    };
    let degree = app
        .graph
        .index_of(&band.name)
        .map(|i| app.graph.weighted_degree(i))
        .unwrap_or(0);
    let lines = vec![
        Line::styled(band.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Line::raw(""),
        Line::from(vec![
            Span::raw("Country:    "),
            Span::styled(
                band.country_or_unknown().to_string(),
                Style::default().fg(Color::Magenta),
            ),
        ]),
        Line::from(vec![Span::raw("Popularity: "), popularity_span(band.popularity)]),
        Line::raw(format!(
            "Followers:  {}",
            band.followers.map_or("?".to_string(), |f| f.to_string())
        )),
        Line::raw(format!("Mentions:   {degree}")),
        Line::raw(""),
        Line::styled("Filters:", Style::default().add_modifier(Modifier::UNDERLINED)),
        Line::raw(format!("  max followers    {}", app.filters.max_followers)),
        Line::raw(format!("  max popularity   {}", app.filters.max_popularity)),
        Line::raw(format!("  min connections  {}", app.filters.min_connections)),
        Line::raw(format!("  country          {}", app.country_label())),
        Line::raw(format!("  sort             {}", app.sort)),
    ];
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_recommendations(f: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .title(format!(
            " For fans of… ({}) by {} ",
            app.recommendations.len(),
            app.sort
        ))
        .borders(Borders::ALL)
        .border_style(focus_style(app.panel == Panel::Recommendations));
    if app.recommendations.is_empty() {
        let msg = if app.selected_band().is_some() {
            "No bands match these filters"
        } else {
            ""
        };
        f.render_widget(Paragraph::new(msg).block(block), area);
        return;
    }
    let items: Vec<ListItem> = app
        .recommendations
        .iter()
        .map(|r| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>3}× ", r.connections), Style::default().fg(Color::Yellow)),
                popularity_span(r.popularity),
                Span::raw(" "),
                Span::raw(r.band.clone()),
                Span::styled(format!("  {}", r.country), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut app.rec_state);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let msg = if app.status_msg.is_empty() {
        String::new()
    } else {
        format!("  |  {}", app.status_msg)
    };
    let bar = Paragraph::new(Line::from(vec![
        Span::styled(" ffo ", Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw(format!(
            "  {} bands  {} connections  o:sort  +/-:popularity  </>:followers  ]/[:connections  c:country{}",
            app.graph.band_count(),
            app.graph.connection_count(),
            msg
        )),
    ]))
    .style(Style::default().bg(Color::DarkGray));
    f.render_widget(bar, area);
}

fn draw_stats_overlay(f: &mut Frame, app: &App, area: Rect) {
    let w = 50u16.min(area.width.saturating_sub(4));
    let h = 16u16.min(area.height.saturating_sub(4));
    let x = (area.width.saturating_sub(w)) / 2;
    let y = (area.height.saturating_sub(h)) / 2;
    let overlay = Rect::new(x, y, w, h);
    let mut text = vec![
        Line::styled("Graph Statistics", Style::default().add_modifier(Modifier::BOLD)),
        Line::raw(""),
        Line::raw(format!("  Bands:        {}", app.graph.band_count())),
        Line::raw(format!("  Connections:  {}", app.graph.connection_count())),
        Line::raw(format!("  Countries:    {}", app.countries.len())),
        Line::raw(""),
        Line::styled("  Most mentioned:", Style::default().add_modifier(Modifier::UNDERLINED)),
    ];
    for (band, degree) in app.graph.top_bands(5) {
        text.push(Line::raw(format!("    {degree:>4}  {}", band.name)));
    }
    text.push(Line::raw(""));
    text.push(Line::styled(
        "  Press 's' to close",
        Style::default().fg(Color::DarkGray),
    ));
    let block = Block::default()
        .title(" Stats ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Clear, overlay);
    f.render_widget(Paragraph::new(text).block(block), overlay);
}

fn draw_input_bar(f: &mut Frame, app: &App, area: Rect) {
    let h = 3u16;
    let y = area.height.saturating_sub(h + 1);
    let input_area = Rect::new(0, y, area.width, h);
    let block = Block::default().borders(Borders::ALL).title(" Search ");
    let text = format!("/{}_", app.search_query);
    f.render_widget(Clear, input_area);
    f.render_widget(Paragraph::new(text).block(block), input_area);
}

/// Browse `graph` interactively until the user quits.
pub fn run(graph: BandGraph, filters: Filters) -> anyhow::Result<()> {
    let mut app = App::new(graph, filters);
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let result = run_loop(&mut terminal, &mut app);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                return Ok(());
            }
            match app.mode {
                Mode::Search => match key.code {
                    KeyCode::Esc => {
                        app.mode = Mode::Normal;
                        app.search_query.clear();
                        app.apply_filter();
                    }
                    KeyCode::Enter => {
                        app.mode = Mode::Normal;
                    }
                    KeyCode::Backspace => {
                        app.search_query.pop();
                        app.apply_filter();
                    }
                    KeyCode::Char(c) => {
                        app.search_query.push(c);
                        app.apply_filter();
                    }
                    _ => {}
                },
                Mode::Normal => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
                    KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
                    KeyCode::Char('g') => app.jump_top(),
                    KeyCode::Char('G') => app.jump_bottom(),
                    KeyCode::Char('/') => {
                        app.mode = Mode::Search;
                        app.search_query.clear();
                    }
                    KeyCode::Char('o') => app.cycle_sort(),
                    KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_popularity(true),
                    KeyCode::Char('-') => app.adjust_popularity(false),
                    KeyCode::Char('>') => app.adjust_followers(true),
                    KeyCode::Char('<') => app.adjust_followers(false),
                    KeyCode::Char('c') => app.cycle_country(),
                    KeyCode::Char(']') => app.adjust_connections(true),
                    KeyCode::Char('[') => app.adjust_connections(false),
                    KeyCode::Char('s') => {
                        app.show_stats = !app.show_stats;
                    }
                    KeyCode::Tab => {
                        app.panel = match app.panel {
                            Panel::Bands => Panel::Recommendations,
                            Panel::Recommendations => Panel::Bands,
                        };
                    }
                    KeyCode::Enter => app.drill_into(),
                    _ => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BuildOptions, GraphBuilder};
    use crate::record::{BandMention, RelationRecord};

    fn mention(name: &str, popularity: u8) -> BandMention {
        BandMention::new(name).popularity(popularity).followers(500)
    }

    /// Agalloch–Wolves In The Throne Room twice, Agalloch–Panopticon,
    /// Panopticon–Falls Of Rauros.
    fn app() -> App {
        let records = vec![
            RelationRecord::new(mention("Agalloch", 50), mention("Wolves In The Throne Room", 45)),
            RelationRecord::new(mention("Agalloch", 50), mention("Wolves In The Throne Room", 45)),
            RelationRecord::new(mention("Agalloch", 50), mention("Panopticon", 20)),
            RelationRecord::new(mention("Panopticon", 20), mention("Falls Of Rauros", 10)),
        ];
        let graph = GraphBuilder::new(BuildOptions::default()).build(&records).graph;
        App::new(graph, Filters::default())
    }

    fn rec_names(app: &App) -> Vec<&str> {
        app.recommendations.iter().map(|r| r.band.as_str()).collect()
    }

    #[test]
    fn test_popularity_color() {
        assert_eq!(popularity_color(10), Color::Green);
        assert_eq!(popularity_color(45), Color::Yellow);
        assert_eq!(popularity_color(90), Color::Red);
    }

    #[test]
    fn test_app_empty_graph() {
        let app = App::new(BandGraph::new(), Filters::default());
        assert!(app.names.is_empty());
        assert!(app.recommendations.is_empty());
        assert_eq!(app.list_state.selected(), None);
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn test_app_selects_first_band() {
        let app = app();
        assert_eq!(app.selected_band(), Some("Agalloch"));
        assert_eq!(rec_names(&app), vec!["Wolves In The Throne Room", "Panopticon"]);
    }

    #[test]
    fn test_app_search_filter() {
        let mut app = app();
        app.search_query = "pan".to_string();
        app.apply_filter();
        assert_eq!(app.filtered.len(), 1);
        assert_eq!(app.selected_band(), Some("Panopticon"));
        assert_eq!(rec_names(&app), vec!["Agalloch", "Falls Of Rauros"]);
    }

    #[test]
    fn test_app_move_selection_clamps() {
        let mut app = app();
        app.move_selection(-1);
        assert_eq!(app.list_state.selected(), Some(0));
        app.move_selection(1);
        assert_eq!(app.selected_band(), Some("Falls Of Rauros"));
        app.jump_bottom();
        assert_eq!(app.selected_band(), Some("Wolves In The Throne Room"));
        app.jump_top();
        assert_eq!(app.selected_band(), Some("Agalloch"));
    }

    #[test]
    fn test_app_cycle_sort() {
        let mut app = app();
        app.cycle_sort();
        assert_eq!(app.sort, SortKey::Popularity);
        assert_eq!(rec_names(&app), vec!["Panopticon", "Wolves In The Throne Room"]);
    }

    #[test]
    fn test_app_adjust_filters() {
        let mut app = app();
        app.adjust_connections(true);
        assert_eq!(app.filters.min_connections, 2);
        assert_eq!(rec_names(&app), vec!["Wolves In The Throne Room"]);
        app.adjust_connections(false);
        app.adjust_connections(false);
        assert_eq!(app.filters.min_connections, 1);

        for _ in 0..10 {
            app.adjust_popularity(false);
        }
        assert_eq!(app.filters.max_popularity, 20);
        assert_eq!(rec_names(&app), vec!["Panopticon"]);
        for _ in 0..30 {
            app.adjust_popularity(true);
        }
        assert_eq!(app.filters.max_popularity, 100);
    }

    #[test]
    fn test_app_adjust_followers() {
        let mut app = app();
        app.adjust_followers(false);
        assert_eq!(app.filters.max_followers, 50_000);
        for _ in 0..3 {
            app.adjust_followers(false);
        }
        assert_eq!(app.filters.max_followers, 100);
        assert!(app.recommendations.is_empty());
        app.adjust_followers(false);
        assert_eq!(app.filters.max_followers, 100);

        app.adjust_followers(true);
        assert_eq!(app.filters.max_followers, 1_000);
        assert_eq!(rec_names(&app), vec!["Wolves In The Throne Room", "Panopticon"]);
        for _ in 0..10 {
            app.adjust_followers(true);
        }
        assert_eq!(app.filters.max_followers, 10_000_000);
    }

    #[test]
    fn test_app_adjust_followers_off_the_ladder() {
        let mut filters = Filters::default();
        filters.max_followers = 20_000_000;
        let mut app = App::new(BandGraph::new(), filters);
        app.adjust_followers(true);
        assert_eq!(app.filters.max_followers, 20_000_000);
        app.adjust_followers(false);
        assert_eq!(app.filters.max_followers, 10_000_000);

        app.filters.max_followers = 7_500;
        app.adjust_followers(true);
        assert_eq!(app.filters.max_followers, 10_000);
    }

    #[test]
    fn test_app_cycle_country() {
        let records = vec![
            RelationRecord::new(
                mention("Agalloch", 50).country("USA"),
                mention("Wolves In The Throne Room", 45).country("USA"),
            ),
            RelationRecord::new(
                mention("Agalloch", 50).country("USA"),
                mention("Panopticon", 20).country("Sweden"),
            ),
        ];
        let graph = GraphBuilder::new(BuildOptions::default()).build(&records).graph;
        let mut app = App::new(graph, Filters::default());
        assert_eq!(app.countries, vec!["Sweden", "USA"]);
        assert_eq!(rec_names(&app), vec!["Panopticon", "Wolves In The Throne Room"]);

        app.cycle_country();
        assert_eq!(app.country_label(), "Sweden");
        assert_eq!(rec_names(&app), vec!["Panopticon"]);
        app.cycle_country();
        assert_eq!(app.country_label(), "USA");
        assert_eq!(rec_names(&app), vec!["Wolves In The Throne Room"]);
        app.cycle_country();
        assert_eq!(app.country_label(), "all");
        assert_eq!(rec_names(&app).len(), 2);
    }

    #[test]
    fn test_app_cycle_country_from_configured_set() {
        let mut filters = Filters::default();
        filters.countries = ["Norway".to_string(), "Sweden".to_string()].into();
        let mut app = App::new(BandGraph::new(), filters);
        assert_eq!(app.country_label(), "Norway, Sweden");
        app.cycle_country();
        assert!(app.filters.countries.is_empty());
        // No known countries: stays on all.
        app.cycle_country();
        assert!(app.filters.countries.is_empty());
    }

    #[test]
    fn test_app_drill_into_recommendation() {
        let mut app = app();
        app.search_query = "agal".to_string();
        app.apply_filter();
        app.panel = Panel::Recommendations;
        app.move_selection(1);
        app.drill_into();
        assert_eq!(app.panel, Panel::Bands);
        assert_eq!(app.selected_band(), Some("Panopticon"));
        assert!(app.search_query.is_empty());
        assert_eq!(rec_names(&app), vec!["Agalloch", "Falls Of Rauros"]);
    }
}
