mod app;
mod braille;
mod ui;

use anyhow::{Context, Result};
use app::{App, PLACES_LAYER, TILES_LAYER};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use mapview::config::MapConfig;
use mapview::logging::{self, DEFAULT_LOG_DIR, DEFAULT_LOG_FILE};
use ratatui::DefaultTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => MapConfig::load(Path::new(&path))?,
        None => MapConfig::default(),
    };

    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    let _log_guard =
        logging::init_logging(&log_dir, DEFAULT_LOG_FILE).context("Failed to set up logging")?;
    info!(projection = %config.viewport.projection, "Starting mapview");

    let mut terminal = ratatui::init();
    terminal.clear()?;
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = run(&mut terminal, &config);

    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    if let Err(e) = &result {
        error!(error = %e, "Exited with error");
    }
    result
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    app.set_mouse_pos(mouse.column, mouse.row);

    match mouse.kind {
        MouseEventKind::ScrollUp => app.zoom_in_at(mouse.column, mouse.row),
        MouseEventKind::ScrollDown => app.zoom_out_at(mouse.column, mouse.row),
        // Horizontal scroll (trackpad two-finger swipe)
        MouseEventKind::ScrollLeft => app.pan(-4, 0),
        MouseEventKind::ScrollRight => app.pan(4, 0),
        MouseEventKind::Down(MouseButton::Left) => {
            app.press();
            app.click(mouse.column, mouse.row);
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            app.handle_drag(mouse.column, mouse.row);
        }
        MouseEventKind::Up(MouseButton::Left) => {
            app.end_drag();
        }
        _ => {}
    }
}

fn run(terminal: &mut DefaultTerminal, config: &MapConfig) -> Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(config, size.width, size.height)?;

    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;

        // ~60fps
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),

                    KeyCode::Left | KeyCode::Char('h') => app.pan(-10, 0),
                    KeyCode::Right | KeyCode::Char('l') => app.pan(10, 0),
                    KeyCode::Up | KeyCode::Char('k') => app.pan(0, -5),
                    KeyCode::Down | KeyCode::Char('j') => app.pan(0, 5),

                    KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
                    KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

                    KeyCode::Char('f') => app.fit_places(),
                    KeyCode::Char('a') => app.fly_to_next_place(),

                    KeyCode::Char('t') | KeyCode::Char('T') => app.toggle_layer(TILES_LAYER),
                    KeyCode::Char('p') | KeyCode::Char('P') => app.toggle_layer(PLACES_LAYER),
                    KeyCode::Char('m') => app.toggle_mode(),

                    _ => {}
                },
                Event::Mouse(mouse) => handle_mouse(&mut app, mouse),
                Event::Resize(width, height) => app.resize(width, height),
                _ => {}
            }
        }

        app.tick();

        if app.should_quit {
            break;
        }
    }

    app.shutdown();
    Ok(())
}
