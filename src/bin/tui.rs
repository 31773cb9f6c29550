//! RFID TUI - operator dashboard for the reader simulation engine
//!
//! Displays:
//! - Run state, stream connection and last payload age
//! - Pending source selection and simulation parameters
//! - The last 50 tag reads, newest first
//! - The latest payload as pretty-printed JSON
//! - The last control error
//!
//! `u` edits the webhook URL in place: type, Backspace, Enter to save, Esc to
//! cancel. Start/stop keys are ignored while a command is outstanding.
//!
//! Logs go to the configured log file so the terminal stays clean.

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use rfid_dashboard::domain::{RunState, SimulationParams, SourceConfig};
use rfid_dashboard::infra::{logging, Config, Metrics};
use rfid_dashboard::services::{Console, ControlError, Snapshot, DISPLAY_CAPACITY};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::info;

const INTERVAL_STEP: f64 = 0.1;

#[derive(Parser, Debug)]
#[command(name = "rfid-tui", version, about = "Operator dashboard for the RFID reader simulation")]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// Operator-facing feedback not held by the dashboard itself
#[derive(Debug, Default, Clone)]
struct UiState {
    last_error: Option<String>,
    in_flight: Option<&'static str>,
    /// Webhook URL being typed, while in edit mode
    editing_url: Option<String>,
}

type SharedUi = Arc<Mutex<UiState>>;

/// Everything one frame needs, gathered before drawing
struct View {
    snapshot: Arc<Snapshot>,
    source: SourceConfig,
    params: SimulationParams,
    ui: UiState,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    logging::init_file(config.log_file())?;
    info!(git_hash = env!("GIT_HASH"), config_file = %config.config_file(), "rfid-tui starting");

    let console = Arc::new(Console::new(&config, Arc::new(Metrics::new()))?);
    if config.stream_auto_enable() {
        console.sync_stream();
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let ui = Arc::new(Mutex::new(UiState::default()));
    let result = run_ui(&mut terminal, console.clone(), ui).await;

    console.stream().disable();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    info!("rfid-tui exiting");
    result
}

fn record_outcome(ui: &mut UiState, result: Result<(), ControlError>) {
    match result {
        Ok(()) => ui.last_error = None,
        Err(e) => ui.last_error = Some(e.to_string()),
    }
}

/// Mark a start/stop as outstanding, unless one already is or a start would be a no-op
fn claim_command(ui: &mut UiState, run_state: RunState, start: bool) -> Option<&'static str> {
    if ui.in_flight.is_some() || (start && run_state.is_running()) {
        return None;
    }
    let label = if start { "starting" } else { "stopping" };
    ui.in_flight = Some(label);
    Some(label)
}

/// Run a claimed start/stop off the UI loop; the outcome lands in the shared UI state
fn spawn_command(console: Arc<Console>, ui: SharedUi, start: bool) {
    tokio::spawn(async move {
        let result = if start { console.start().await.map(|_| ()) } else { console.stop().await };
        let mut s = ui.lock().await;
        s.in_flight = None;
        record_outcome(&mut s, result);
    });
}

#[derive(Debug, PartialEq)]
enum UrlEdit {
    Typing,
    Save(String),
    Cancel,
}

fn edit_url(buffer: &mut String, code: KeyCode) -> UrlEdit {
    match code {
        KeyCode::Char(c) => buffer.push(c),
        KeyCode::Backspace => {
            buffer.pop();
        }
        KeyCode::Enter => return UrlEdit::Save(std::mem::take(buffer)),
        KeyCode::Esc => return UrlEdit::Cancel,
        _ => {}
    }
    UrlEdit::Typing
}

fn adjust_params(console: &Console, tag_delta: i64, interval_delta: f64) -> Result<(), ControlError> {
    let mut params = console.params();
    params.tag_count = (params.tag_count as i64 + tag_delta).max(1) as u32;
    let interval = ((params.interval_seconds + interval_delta) * 10.0).round() / 10.0;
    params.interval_seconds = interval.max(INTERVAL_STEP);
    console.set_params(params)
}

async fn handle_key(code: KeyCode, console: &Arc<Console>, ui: &SharedUi) -> bool {
    let mut state = ui.lock().await;

    if let Some(buffer) = state.editing_url.as_mut() {
        match edit_url(buffer, code) {
            UrlEdit::Typing => {}
            UrlEdit::Cancel => state.editing_url = None,
            UrlEdit::Save(url) => {
                state.editing_url = None;
                record_outcome(&mut state, console.set_webhook_url(&url));
            }
        }
        return false;
    }

    let result = match code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char(key @ ('s' | 'x')) => {
            let start = key == 's';
            if claim_command(&mut state, console.dashboard().run_state(), start).is_some() {
                spawn_command(console.clone(), ui.clone(), start);
            }
            return false;
        }
        KeyCode::Char('u') => {
            if console.dashboard().run_state().is_running() {
                Err(ControlError::ConfigFrozen)
            } else {
                state.editing_url = Some(console.source_config().webhook_url.unwrap_or_default());
                return false;
            }
        }
        KeyCode::Char('m') => console.toggle_stream_source().map(|_| ()),
        KeyCode::Char('w') => console.toggle_webhook().map(|_| ()),
        KeyCode::Char('+') | KeyCode::Char('=') => adjust_params(console, 1, 0.0),
        KeyCode::Char('-') => adjust_params(console, -1, 0.0),
        KeyCode::Char(']') => adjust_params(console, 0, INTERVAL_STEP),
        KeyCode::Char('[') => adjust_params(console, 0, -INTERVAL_STEP),
        _ => return false,
    };

    record_outcome(&mut state, result);
    false
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    console: Arc<Console>,
    ui: SharedUi,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        let view = View {
            snapshot: console.dashboard().snapshot(),
            source: console.source_config(),
            params: console.params(),
            ui: ui.lock().await.clone(),
        };
        terminal.draw(|f| draw_ui(f, &view))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key(key.code, &console, &ui).await {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut Frame, view: &View) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(6), // Source / params
            Constraint::Min(0),    // Reads + payload
            Constraint::Length(3), // Last error
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], view);

    let config_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_chunks[1]);
    draw_source_panel(f, config_chunks[0], view);
    draw_params_panel(f, config_chunks[1], view);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(main_chunks[2]);
    draw_reads_panel(f, body_chunks[0], &view.snapshot);
    draw_payload_panel(f, body_chunks[1], &view.snapshot);

    draw_error_panel(f, main_chunks[3], &view.ui);
}

fn payload_age(snapshot: &Snapshot) -> String {
    let Some(at_ms) = snapshot.last_payload_unix_ms else {
        return "never".to_string();
    };
    let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64;
    format!("{}s ago", now_ms.saturating_sub(at_ms) / 1000)
}

fn draw_header(f: &mut Frame, area: Rect, view: &View) {
    let snapshot = &view.snapshot;
    let (run_text, run_color) = match snapshot.run_state {
        RunState::Running => ("RUNNING", Color::Green),
        RunState::Idle => ("IDLE", Color::Yellow),
    };
    let (conn_text, conn_color) = if snapshot.connected {
        ("CONNECTED", Color::Green)
    } else if view.source.use_stream_source {
        ("DISCONNECTED", Color::Red)
    } else {
        ("STREAM OFF", Color::DarkGray)
    };

    let mut spans = vec![
        Span::styled("RFID Dashboard ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
        Span::styled(run_text, Style::default().fg(run_color).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(conn_text, Style::default().fg(conn_color)),
        Span::raw(" | Last: "),
        Span::raw(payload_age(snapshot)),
        Span::raw(" | Reads: "),
        Span::styled(
            format!("{}/{}", snapshot.reads.len(), DISPLAY_CAPACITY),
            Style::default().fg(Color::Yellow),
        ),
    ];
    if let Some(label) = view.ui.in_flight {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(label, Style::default().fg(Color::Magenta)));
    }
    if let Some(warning) = source_warning(&view.source) {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(warning, Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn switch(on: bool) -> Span<'static> {
    if on {
        Span::styled("[on] ", Style::default().fg(Color::Green))
    } else {
        Span::styled("[off]", Style::default().fg(Color::DarkGray))
    }
}

/// What is missing before a start can succeed
fn source_warning(source: &SourceConfig) -> Option<&'static str> {
    if !source.any_source() {
        Some("Select at least one source to enable simulation")
    } else if source.use_webhook && source.webhook_url.as_deref().map_or(true, |url| url.trim().is_empty()) {
        Some("Enter a webhook URL (u)")
    } else {
        None
    }
}

fn draw_source_panel(f: &mut Frame, area: Rect, view: &View) {
    let url_line = match &view.ui.editing_url {
        Some(buffer) => Line::from(vec![
            Span::raw("      url: "),
            Span::styled(format!("{}_", buffer), Style::default().fg(Color::Yellow)),
            Span::styled("  Enter save, Esc cancel", Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::from(vec![
            Span::raw("      url: "),
            Span::styled(
                view.source.webhook_url.clone().unwrap_or_else(|| "-".to_string()),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw("  (u)"),
        ]),
    };
    let lines = vec![
        Line::from(vec![switch(view.source.use_stream_source), Span::raw(" stream source  (m)")]),
        Line::from(vec![switch(view.source.use_webhook), Span::raw(" webhook        (w)")]),
        url_line,
    ];

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Source ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(panel, area);
}

fn draw_params_panel(f: &mut Frame, area: Rect, view: &View) {
    let editable = !view.snapshot.run_state.is_running();
    let value_style = if editable {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let lines = vec![
        Line::from(vec![
            Span::raw("Tags/cycle: "),
            Span::styled(format!("{:<6}", view.params.tag_count), value_style),
            Span::raw(" (+/-)"),
        ]),
        Line::from(vec![
            Span::raw("Interval:   "),
            Span::styled(format!("{:<6}", format!("{:.1}s", view.params.interval_seconds)), value_style),
            Span::raw(" ([/])"),
        ]),
        Line::from(Span::styled(
            "s start  x stop  q quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Simulation ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(panel, area);
}

fn reads_title(snapshot: &Snapshot) -> String {
    if snapshot.run_state.is_running() && snapshot.reads.is_empty() {
        " Tag Reads - receiving tags... ".to_string()
    } else {
        format!(" Tag Reads ({}) ", snapshot.reads.len())
    }
}

fn draw_reads_panel(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let rows: Vec<Row> = snapshot
        .reads
        .iter()
        .map(|read| {
            Row::new(vec![
                read.epc.clone(),
                read.antenna_port.to_string(),
                read.peak_rssi.to_string(),
                read.seen_count.to_string(),
                read.channel_index.to_string(),
                read.time_stamp.to_string(),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(26), // EPC
            Constraint::Length(4),  // Antenna
            Constraint::Length(6),  // RSSI
            Constraint::Length(5),  // Seen
            Constraint::Length(4),  // Channel
            Constraint::Min(10),    // Timestamp
        ],
    )
    .header(
        Row::new(vec!["EPC", "Ant", "RSSI", "Seen", "Ch", "Timestamp"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .title(reads_title(snapshot))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(table, area);
}

fn draw_payload_panel(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let text = snapshot
        .latest_payload
        .as_ref()
        .map(|payload| payload.to_pretty_json())
        .unwrap_or_else(|| "Waiting for data...".to_string());

    let panel = Paragraph::new(text).wrap(Wrap { trim: false }).block(
        Block::default()
            .title(" Latest Payload ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(panel, area);
}

fn draw_error_panel(f: &mut Frame, area: Rect, ui: &UiState) {
    let line = match &ui.last_error {
        Some(error) => Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))),
        None => Line::from(Span::styled("-", Style::default().fg(Color::DarkGray))),
    };

    let panel = Paragraph::new(line).block(
        Block::default()
            .title(" Last Error ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );
    f.render_widget(panel, area);
}
