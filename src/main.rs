mod api;
mod backends;
mod config;
mod connection;
mod filter;
mod gate;
mod keybindings;
mod ledger;
mod rate;
mod reconcile;
mod session;
mod snapshot;
mod ui;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::ApiConfig;
use crate::backends::transport::{
    TransportEvent, detect_available_transports, select_transport, subscribe,
};
use crate::config::{Config, ConfigOverrides};
use crate::connection::{ConnectionView, SortKey, sort_views};
use crate::session::ConnectionSession;
use crate::ui::AppState;

/// clashtop - A TUI connection monitor for Clash-compatible proxies
#[derive(Parser, Debug)]
#[command(name = "clashtop")]
#[command(version)]
#[command(about = "Active and closed proxy connections, live in your terminal", long_about = None)]
struct Args {
    /// External controller URL (e.g. http://127.0.0.1:9090)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Controller secret
    #[arg(long, value_name = "SECRET")]
    secret: Option<String>,

    /// Snapshot transport to use (websocket, poll)
    #[arg(long, value_name = "TRANSPORT")]
    transport: Option<String>,

    /// Poll interval in milliseconds (poll transport only)
    #[arg(long, value_name = "MS")]
    interval: Option<u64>,

    /// Initial filter keyword
    #[arg(long, value_name = "KEYWORD")]
    filter: Option<String>,

    /// List all available transports and exit
    #[arg(long)]
    list_transports: bool,

    /// Print the active connections once and exit (no TUI)
    #[arg(long)]
    once: bool,

    /// Write the effective configuration to the config file
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.url.clone(),
            secret: self.secret.clone(),
            transport: self.transport.clone(),
            poll_interval_ms: self.interval,
            filter: self.filter.clone(),
        }
    }
}

fn print_available_transports() {
    println!("clashtop - Available Transports\n");

    let transports = detect_available_transports();
    if transports.is_empty() {
        println!("  (none compiled in)");
    } else {
        for transport in transports {
            let status = if transport.available {
                "available"
            } else {
                "unavailable"
            };
            println!(
                "  {:12} [priority: {:?}] {}",
                transport.name, transport.priority, status
            );
        }
    }

    println!();
    println!("Usage:");
    println!("  clashtop [--url <URL>] [--secret <SECRET>] [--transport <name>]");
    println!("  clashtop --once [--filter <KEYWORD>]");
}

/// Run one-shot mode - fetch a single snapshot and print it
async fn run_once_mode(config: &Config) -> Result<()> {
    let client = api::http_client()?;
    let snapshot = api::fetch_snapshot(&client, &config.api).await?;

    let mut session = ConnectionSession::new();
    session.ingest(snapshot);

    let keyword = config.default_filter.as_deref().unwrap_or("");
    let mut rows = session.active_view(keyword);
    sort_views(&mut rows, SortKey::Newest);

    let totals = session.totals();
    println!(
        "{} active connection(s) at {}  (total ↓{} ↑{})",
        rows.len(),
        config.api.base_url,
        ConnectionView::format_bytes(totals.download),
        ConnectionView::format_bytes(totals.upload)
    );
    println!();
    println!(
        "{:40} {:16} {:28} {:>10} {:>10} {:22}",
        "Host", "Type", "Chains", "DL", "UL", "Source"
    );

    for conn in rows {
        println!(
            "{:40} {:16} {:28} {:>10} {:>10} {:22}",
            conn.host,
            conn.conn_type,
            conn.chains,
            ConnectionView::format_bytes(conn.download),
            ConnectionView::format_bytes(conn.upload),
            conn.source
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::formatted_builder()
            .parse_default_env()
            .init();
    }

    // Handle --list-transports
    if args.list_transports {
        print_available_transports();
        return Ok(());
    }

    let mut config = Config::load().unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable config: {:#}", e);
        Config::default()
    });
    config.apply(args.overrides());

    if args.save_config {
        let path = config.save()?;
        println!("Saved configuration to {:?}", path);
    }

    if args.once {
        return run_once_mode(&config).await;
    }

    let transport = select_transport(config.transport.as_deref(), config.poll_interval())?;
    let tick_interval = if transport.capabilities().push {
        log::info!(
            "Using {} transport ({:?} priority, streaming)",
            transport.name(),
            transport.priority()
        );
        // Controllers push one snapshot per second
        Duration::from_secs(1)
    } else {
        log::info!(
            "Using {} transport ({:?} priority, polling every {:?})",
            transport.name(),
            transport.priority(),
            config.poll_interval()
        );
        config.poll_interval()
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let subscription = subscribe(transport, config.api.clone(), event_tx);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = AppState::new(
        config.api.base_url.clone(),
        subscription.transport_name(),
        tick_interval,
        config.default_filter.clone(),
    );

    // Run the app
    let res = run_app(&mut terminal, &mut app, &mut event_rx, &config.api).await;

    // Stop future ticks before tearing down the terminal
    subscription.unsubscribe();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("Error: {:?}", err);
        return Err(err);
    }

    Ok(())
}

/// Result of handling one key press
enum Flow {
    Continue,
    Quit,
    CloseAll,
}

fn handle_key(app: &mut AppState, key: KeyEvent) -> Flow {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Flow::Quit;
    }

    // If help is shown, any key closes it
    if app.show_help {
        app.show_help = false;
        return Flow::Continue;
    }

    if app.show_close_all_dialog {
        app.show_close_all_dialog = false;
        return match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Flow::CloseAll,
            _ => {
                app.status_message = "Close all cancelled".to_string();
                Flow::Continue
            }
        };
    }

    if app.filter.editing {
        match key.code {
            KeyCode::Enter => app.filter.editing = false,
            KeyCode::Esc => {
                app.filter.editing = false;
                app.filter.keyword.clear();
            }
            KeyCode::Backspace => app.filter.handle_backspace(),
            KeyCode::Char(c) => app.filter.handle_char(c),
            _ => {}
        }
        app.filter_changed();
        return Flow::Continue;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Flow::Quit,
        KeyCode::Char('h') | KeyCode::Char('?') => app.show_help = true,
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Left | KeyCode::Right => app.switch_tab(),
        KeyCode::Char('/') => app.filter.editing = true,
        KeyCode::Char('p') | KeyCode::Char(' ') => app.toggle_refresh(),
        KeyCode::Char('s') => app.cycle_sort(),
        KeyCode::Enter => app.describe_selected(),
        KeyCode::Char('x') => app.show_close_all_dialog = true,
        _ => {}
    }

    Flow::Continue
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    api_config: &ApiConfig,
) -> Result<()> {
    let client = api::http_client()?;
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Result<()>>();

    let mut dirty = true;

    loop {
        // Only redraw when something visible changed
        if dirty {
            terminal.draw(|f| ui::draw_ui(f, app))?;
            dirty = false;
        }

        // Handle input with timeout
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    dirty = true;
                    match handle_key(app, key) {
                        Flow::Continue => {}
                        Flow::Quit => return Ok(()),
                        Flow::CloseAll => {
                            // Fire and forget; the next snapshot shows the closures
                            let client = client.clone();
                            let api_config = api_config.clone();
                            let command_tx = command_tx.clone();
                            tokio::spawn(async move {
                                let _ = command_tx.send(api::close_all(&client, &api_config).await);
                            });
                            app.status_message = "Close-all request sent".to_string();
                        }
                    }
                }
                Event::Resize(..) => dirty = true,
                _ => {}
            }
        }

        // Apply every snapshot that arrived, one tick at a time
        while let Ok(event) = events.try_recv() {
            dirty |= app.handle_transport_event(event);
        }

        while let Ok(result) = command_rx.try_recv() {
            dirty = true;
            match result {
                Ok(()) => {
                    app.status_message = "Controller accepted close-all request".to_string();
                }
                Err(e) => {
                    log::error!("Close all failed: {:#}", e);
                    app.status_message = format!("Failed to close connections: {:#}", e);
                }
            }
        }
    }
}
