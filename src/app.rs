use anyhow::{Context, Result};
use glam::{DVec2, UVec2};
use mapview::config::MapConfig;
use mapview::data;
use mapview::geo::GeoCoordinate;
use mapview::map::projection;
use mapview::map::{
    FrameBuffer, Layer, LayerManager, RedrawSignal, RenderScheduler, ViewportController,
    ViewportPixel,
};
use mapview::tiles::{HttpFetcher, TileCache, TileMap, TileSource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Map pixels behind one terminal cell, the same in both render modes
pub const CELL_PX_X: u32 = 4;
pub const CELL_PX_Y: u32 = 8;

/// Steps and tick interval of the fly-to animation
const FLY_STEPS: u32 = 24;
const FLY_INTERVAL: Duration = Duration::from_millis(40);

/// Pick radius around the cursor, in map pixels
const HIT_FUZZ_PX: f64 = 6.0;

pub const TILES_LAYER: &str = "tiles";
pub const OVERLAY_LAYER: &str = "overlay";
pub const PLACES_LAYER: &str = "places";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Two colour pixels per cell via the upper half block
    HalfBlock,
    /// 2x4 dots per cell
    Braille,
}

/// A place label positioned in map-area cells
pub struct Label {
    pub col: u16,
    pub row: u16,
    pub text: String,
}

/// Application state
pub struct App {
    pub controller: ViewportController,
    pub layers: Arc<LayerManager>,
    pub frames: Arc<FrameBuffer>,
    pub cache: TileCache,
    pub mode: RenderMode,
    pub should_quit: bool,
    /// Current mouse position for cursor marker
    pub mouse_pos: Option<(u16, u16)>,
    /// Name and details of the last clicked place
    pub selected: Option<String>,
    next_place: usize,
    scheduler: RenderScheduler,
    // Declared last so it outlives the cache handles above
    _runtime: tokio::runtime::Runtime,
}

impl App {
    pub fn new(config: &MapConfig, width: u16, height: u16) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tile-fetch")
            .enable_all()
            .build()
            .context("Failed to start tile runtime")?;

        let fetcher = Arc::new(HttpFetcher::new(&config.tiles.user_agent)?);
        let cache = TileCache::new(fetcher, &config.tiles, runtime.handle().clone())?;

        let signal = RedrawSignal::default();
        let layers = Arc::new(LayerManager::new(signal.clone()));

        let tiles = Arc::new(Layer::new(TILES_LAYER));
        tiles.add_drawable(Arc::new(TileMap::new(
            TileSource::from_config(TILES_LAYER, &config.source),
            cache.clone(),
        )));
        layers.add(tiles, None);

        let overlay = Arc::new(Layer::new(OVERLAY_LAYER));
        data::add_world_outline(&overlay);
        if let Some(dir) = &config.data_dir {
            match data::load_dir(&overlay, dir) {
                Ok(n) => info!(dir = %dir.display(), geometries = n, "Loaded overlay data"),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Could not load overlay data"),
            }
        }
        layers.add(overlay, None);

        let places = Arc::new(Layer::new(PLACES_LAYER));
        data::add_default_places(&places);
        places.set_mouse_events(true);
        layers.add(places, None);

        {
            let signal = signal.clone();
            cache.on_update(move |_| signal.request());
        }

        let mut controller = ViewportController::new(&config.viewport)?;
        {
            let signal = signal.clone();
            controller.subscribe(move |_| signal.request());
        }
        controller.set_size(map_size_px(width, height));

        let frames = Arc::new(FrameBuffer::new());
        let scheduler = RenderScheduler::spawn(
            controller.source(),
            layers.clone(),
            frames.clone(),
            &config.scheduler,
        )
        .context("Failed to start render thread")?;
        signal.request();

        Ok(Self {
            controller,
            layers,
            frames,
            cache,
            mode: RenderMode::HalfBlock,
            should_quit: false,
            mouse_pos: None,
            selected: None,
            next_place: 0,
            scheduler,
            _runtime: runtime,
        })
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: u16, height: u16) {
        self.controller.set_size(map_size_px(width, height));
    }

    /// Pan by whole terminal cells
    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.controller.scroll(DVec2::new(
            (dx * CELL_PX_X as i32) as f64,
            (dy * CELL_PX_Y as i32) as f64,
        ));
    }

    pub fn zoom_in(&mut self) {
        self.controller.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.controller.zoom_out();
    }

    /// Zoom in keeping the point under a terminal cell in place
    pub fn zoom_in_at(&mut self, col: u16, row: u16) {
        self.controller.zoom_in_at(cell_to_px(col, row));
    }

    pub fn zoom_out_at(&mut self, col: u16, row: u16) {
        self.controller.zoom_out_at(cell_to_px(col, row));
    }

    /// Centre on all places at the tightest zoom that shows them
    pub fn fit_places(&mut self) {
        self.controller
            .set_focus_mean(&data::default_place_coords(), true);
    }

    /// Animate towards the next built-in place
    pub fn fly_to_next_place(&mut self) {
        let places = data::DEFAULT_PLACES;
        let (name, lon, lat, _) = places[self.next_place % places.len()];
        match self.controller.set_focus_animated(
            GeoCoordinate::new(lon, lat),
            FLY_STEPS,
            FLY_INTERVAL,
        ) {
            Ok(()) => {
                debug!(place = name, "Flying to place");
                self.selected = Some(name.to_string());
                self.next_place += 1;
            }
            Err(e) => debug!(error = %e, "Fly-to ignored"),
        }
    }

    /// Per-frame housekeeping
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.controller.advance_animation(now);
        self.controller.advance_inertia(now);
    }

    pub fn toggle_layer(&self, name: &str) {
        if let Some(layer) = self.layers.layer(name) {
            layer.set_visible(!layer.is_visible());
        }
    }

    pub fn layer_visible(&self, name: &str) -> bool {
        self.layers.layer(name).is_some_and(|l| l.is_visible())
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            RenderMode::HalfBlock => RenderMode::Braille,
            RenderMode::Braille => RenderMode::HalfBlock,
        };
    }

    /// Select the topmost place under a terminal cell
    pub fn click(&mut self, col: u16, row: u16) {
        let viewport = self.controller.viewport();
        let hits = self.layers.hit_test(viewport, cell_to_px(col, row), HIT_FUZZ_PX);
        self.selected = hits.first().map(|place| match place.metadata("population") {
            Some(population) => format!("{} (pop. {population})", place.name()),
            None => place.name().to_string(),
        });
    }

    /// Mouse button down: stops any coasting and arms a drag
    pub fn press(&mut self) {
        self.controller.press();
    }

    /// The map follows the pointer while the button is held
    pub fn handle_drag(&mut self, col: u16, row: u16) {
        self.controller.drag(cell_to_px(col, row), Instant::now());
    }

    /// Mouse button up: a drag in progress keeps coasting
    pub fn end_drag(&mut self) {
        self.controller.release();
    }

    /// Update mouse cursor position
    pub fn set_mouse_pos(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
    }

    /// Labels for visible places, in map-area cells
    pub fn place_labels(&self) -> Vec<Label> {
        let Some(places) = self.layers.layer(PLACES_LAYER) else {
            return Vec::new();
        };
        let viewport = self.controller.viewport();
        if !places.is_visible_at(viewport.zoom()) {
            return Vec::new();
        }

        let size = viewport.size_px().as_dvec2();
        places
            .visible_geometries(&viewport.visible_world_rect(), viewport)
            .into_iter()
            .filter_map(|place| {
                let anchor = place.anchor()?;
                let px = projection::to_viewport_px(viewport, &anchor);
                if px.x() < 0.0 || px.y() < 0.0 || px.x() >= size.x || px.y() >= size.y {
                    return None;
                }
                Some(Label {
                    col: (px.x() / CELL_PX_X as f64) as u16,
                    row: (px.y() / CELL_PX_Y as f64) as u16,
                    text: place.name().to_string(),
                })
            })
            .collect()
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn zoom_level(&self) -> String {
        format!("z{}", self.controller.viewport().zoom())
    }

    pub fn center_coords(&self) -> String {
        let focus = self.controller.viewport().focus();
        format!(
            "{:.1}°{}, {:.1}°{}",
            focus.latitude.abs(),
            if focus.latitude >= 0.0 { "N" } else { "S" },
            focus.longitude.abs(),
            if focus.longitude >= 0.0 { "E" } else { "W" }
        )
    }

    /// Stop background work before the terminal is restored
    pub fn shutdown(&mut self) {
        self.cache.abort_all();
        self.scheduler.shutdown();
        debug!(
            frames = self.scheduler.frames_rendered(),
            tiles = ?self.cache.stats(),
            "Background work stopped"
        );
    }
}

/// Map pixel size for a terminal of `width` x `height` cells, leaving room
/// for the border and the status bar
pub fn map_size_px(width: u16, height: u16) -> UVec2 {
    let cols = width.saturating_sub(2) as u32;
    let rows = height.saturating_sub(3) as u32;
    UVec2::new(cols * CELL_PX_X, rows * CELL_PX_Y)
}

/// Centre of a terminal cell in map pixels, accounting for the border
pub fn cell_to_px(col: u16, row: u16) -> ViewportPixel {
    let cx = col.saturating_sub(1) as f64;
    let cy = row.saturating_sub(1) as f64;
    ViewportPixel::new(
        (cx + 0.5) * CELL_PX_X as f64,
        (cy + 0.5) * CELL_PX_Y as f64,
    )
}
