use crate::app::{App, Label, RenderMode, CELL_PX_X, CELL_PX_Y, PLACES_LAYER, TILES_LAYER};
use crate::braille;
use mapview::map::frame_offset;
use rayon::prelude::*;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};
use tiny_skia::Pixmap;

/// Below this luminance a braille dot is lit
const BRAILLE_THRESHOLD: u32 = 150;

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " mapview ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let cells = app
        .frames
        .latest()
        .and_then(|map_frame| {
            let offset = frame_offset(&map_frame, app.controller.viewport())?;
            let origin = (offset.x.round() as i64, offset.y.round() as i64);
            Some(rasterize(&map_frame.pixmap, origin, inner.width, inner.height, app.mode))
        })
        .unwrap_or_default();

    let cursor = app.mouse_pos.and_then(|(col, row)| {
        let (cx, cy) = (col.checked_sub(inner.x)?, row.checked_sub(inner.y)?);
        (cx < inner.width && cy < inner.height).then_some((cx, cy))
    });

    let widget = MapWidget {
        cells,
        labels: app.place_labels(),
        cursor,
    };
    frame.render_widget(widget, inner);
}

/// One terminal cell of map imagery
#[derive(Clone, Copy)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

/// Sample the frame into `cols` x `rows` cells starting at pixel `origin`.
/// Rows are converted in parallel.
fn rasterize(
    pixmap: &Pixmap,
    origin: (i64, i64),
    cols: u16,
    rows: u16,
    mode: RenderMode,
) -> Vec<Vec<Cell>> {
    (0..rows as i64)
        .into_par_iter()
        .map(|row| {
            (0..cols as i64)
                .map(|col| {
                    let x0 = origin.0 + col * CELL_PX_X as i64;
                    let y0 = origin.1 + row * CELL_PX_Y as i64;
                    match mode {
                        RenderMode::HalfBlock => half_block(pixmap, x0, y0),
                        RenderMode::Braille => braille_cell(pixmap, x0, y0),
                    }
                })
                .collect()
        })
        .collect()
}

fn half_block(pixmap: &Pixmap, x0: i64, y0: i64) -> Cell {
    let half = CELL_PX_Y as i64 / 2;
    let top = average(pixmap, x0, y0, CELL_PX_X as i64, half);
    let bottom = average(pixmap, x0, y0 + half, CELL_PX_X as i64, half);
    Cell {
        ch: '▀',
        fg: top.map_or(Color::Reset, rgb),
        bg: bottom.map_or(Color::Reset, rgb),
    }
}

fn braille_cell(pixmap: &Pixmap, x0: i64, y0: i64) -> Cell {
    let dot_w = CELL_PX_X as i64 / braille::DOTS_X as i64;
    let dot_h = CELL_PX_Y as i64 / braille::DOTS_Y as i64;

    let mut ink: Option<[u32; 3]> = None;
    let bits = braille::cell_bits(|x, y| {
        let dot = average(pixmap, x0 + x as i64 * dot_w, y0 + y as i64 * dot_h, dot_w, dot_h);
        match dot {
            Some(c) if luminance(c) < BRAILLE_THRESHOLD => {
                ink = Some(c);
                true
            }
            _ => false,
        }
    });

    Cell {
        ch: braille::glyph(bits),
        fg: ink.map_or(Color::White, rgb),
        bg: Color::Reset,
    }
}

/// Mean colour of the opaque pixels in a block, `None` if there are none
fn average(pixmap: &Pixmap, x0: i64, y0: i64, w: i64, h: i64) -> Option<[u32; 3]> {
    let mut sum = [0u32; 3];
    let mut n = 0u32;
    for y in y0.max(0)..(y0 + h).min(pixmap.height() as i64) {
        for x in x0.max(0)..(x0 + w).min(pixmap.width() as i64) {
            let Some(px) = pixmap.pixel(x as u32, y as u32) else {
                continue;
            };
            if px.alpha() == 0 {
                continue;
            }
            let c = px.demultiply();
            sum[0] += c.red() as u32;
            sum[1] += c.green() as u32;
            sum[2] += c.blue() as u32;
            n += 1;
        }
    }
    (n > 0).then(|| sum.map(|s| s / n))
}

fn luminance(c: [u32; 3]) -> u32 {
    (c[0] * 299 + c[1] * 587 + c[2] * 114) / 1000
}

fn rgb(c: [u32; 3]) -> Color {
    Color::Rgb(c[0] as u8, c[1] as u8, c[2] as u8)
}

/// Frame imagery with place labels and the cursor on top
struct MapWidget {
    cells: Vec<Vec<Cell>>,
    labels: Vec<Label>,
    cursor: Option<(u16, u16)>,
}

impl Widget for MapWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (row_idx, row) in self.cells.iter().enumerate().take(area.height as usize) {
            let y = area.y + row_idx as u16;
            for (col_idx, cell) in row.iter().enumerate().take(area.width as usize) {
                let x = area.x + col_idx as u16;
                buf[(x, y)].set_char(cell.ch).set_fg(cell.fg).set_bg(cell.bg);
            }
        }

        let label_style = Style::default()
            .fg(Color::White)
            .bg(Color::Black)
            .add_modifier(Modifier::BOLD);
        for label in &self.labels {
            if label.row >= area.height || label.col >= area.width {
                continue;
            }
            let y = area.y + label.row;
            let max_len = (area.width - label.col) as usize;
            for (i, ch) in label.text.chars().take(max_len.min(24)).enumerate() {
                buf[(area.x + label.col + i as u16, y)].set_char(ch).set_style(label_style);
            }
        }

        if let Some((cx, cy)) = self.cursor {
            buf[(area.x + cx, area.y + cy)].set_char('╋').set_fg(Color::Red);
        }
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let toggle = |on: bool, on_text: &'static str, off_text: &'static str| {
        Span::styled(
            if on { on_text } else { off_text },
            Style::default().fg(if on { Color::Green } else { Color::DarkGray }),
        )
    };
    let stats = app.cache.stats();
    let mode = match app.mode {
        RenderMode::HalfBlock => "blocks",
        RenderMode::Braille => "braille",
    };

    let mut spans = vec![
        Span::styled(" Zoom: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        toggle(app.layer_visible(TILES_LAYER), "[T]iles ", "[t]iles "),
        toggle(app.layer_visible(PLACES_LAYER), "[P]laces ", "[p]laces "),
        Span::styled(format!("[m]{mode} "), Style::default().fg(Color::Magenta)),
        Span::styled("| ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
        Span::styled(
            format!(" | tiles {}/{} ", stats.cached, stats.in_flight),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(selected) = &app.selected {
        spans.push(Span::styled(format!("| {selected} "), Style::default().fg(Color::White)));
    }
    spans.push(Span::styled(
        "| hjkl:pan +/-:zoom f:fit a:fly q:quit",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
