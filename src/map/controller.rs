use super::inertia::{Inertia, KineticState};
use super::pixel::ViewportPixel;
use super::projection;
use super::projection::ProjectionKind;
use super::viewport::{Viewport, ViewportSource};
use crate::config::ViewportConfig;
use crate::error::{ConfigError, ViewportError};
use crate::geo::{self, BoundingBox, GeoCoordinate};
use glam::{DVec2, UVec2};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type Listener = Box<dyn Fn(&Viewport) + Send + Sync>;

/// In-flight focus animation
#[derive(Debug, Clone)]
struct Animation {
    target: GeoCoordinate,
    steps_left: u32,
    interval: Duration,
    next_tick: Instant,
}

/// Owner of the mutable viewport: pan, zoom, animate, restrict.
///
/// Every committed change is published to the shared [`ViewportSource`]
/// first and then reported to each subscriber.
pub struct ViewportController {
    viewport: Viewport,
    source: ViewportSource,
    zoom_min: u8,
    zoom_max: u8,
    restriction: Option<BoundingBox>,
    animation: Option<Animation>,
    inertia: Inertia,
    listeners: Vec<Listener>,
}

impl ViewportController {
    pub fn new(config: &ViewportConfig) -> Result<Self, ConfigError> {
        if config.tile_width == 0 || config.tile_height == 0 {
            return Err(ConfigError::InvalidTileSize {
                width: config.tile_width,
                height: config.tile_height,
            });
        }

        let (zoom_min, zoom_max) = if config.zoom_min > config.zoom_max {
            (config.zoom_max, config.zoom_min)
        } else {
            (config.zoom_min, config.zoom_max)
        };

        let mut viewport = Viewport::new(
            UVec2::new(config.width, config.height),
            config.projection,
            UVec2::new(config.tile_width, config.tile_height),
        );
        viewport.set_zoom(config.zoom.clamp(zoom_min, zoom_max));
        viewport.set_focus(GeoCoordinate::new(config.focus_lon, config.focus_lat));

        Ok(Self {
            source: ViewportSource::new(viewport.clone()),
            viewport,
            zoom_min,
            zoom_max,
            restriction: None,
            animation: None,
            inertia: Inertia::default(),
            listeners: Vec::new(),
        })
    }

    /// The current viewport
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Handle for other threads to snapshot the viewport
    pub fn source(&self) -> ViewportSource {
        self.source.clone()
    }

    /// Register a callback run after every committed change
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&Viewport) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn commit(&self) {
        self.source.publish(&self.viewport);
        for listener in &self.listeners {
            listener(&self.viewport);
        }
    }

    pub fn zoom_minimum(&self) -> u8 {
        self.zoom_min
    }

    pub fn zoom_maximum(&self) -> u8 {
        self.zoom_max
    }

    pub fn scroll_restriction(&self) -> Option<BoundingBox> {
        self.restriction
    }

    pub fn set_size(&mut self, size_px: UVec2) {
        if self.viewport.size_px() != size_px {
            self.viewport.set_size(size_px);
            self.commit();
        }
    }

    pub fn set_projection(&mut self, projection: ProjectionKind) {
        if self.viewport.projection() != projection {
            self.viewport.set_projection(projection);
            self.commit();
        }
    }

    pub fn set_tile_size(&mut self, tile_size_px: UVec2) -> Result<(), ConfigError> {
        if tile_size_px.x == 0 || tile_size_px.y == 0 {
            return Err(ConfigError::InvalidTileSize {
                width: tile_size_px.x,
                height: tile_size_px.y,
            });
        }
        self.viewport.set_tile_size(tile_size_px);
        self.commit();
        Ok(())
    }

    pub fn set_zoom_minimum(&mut self, zoom: u8) {
        self.zoom_min = zoom;
        self.validate_zoom();
    }

    pub fn set_zoom_maximum(&mut self, zoom: u8) {
        self.zoom_max = zoom;
        self.validate_zoom();
    }

    pub fn set_zoom_bounds(&mut self, min: u8, max: u8) {
        self.zoom_min = min;
        self.zoom_max = max;
        self.validate_zoom();
    }

    /// Swap an inverted range, then pull the current zoom back inside it
    fn validate_zoom(&mut self) {
        if self.zoom_min > self.zoom_max {
            debug!(min = self.zoom_min, max = self.zoom_max, "Swapping inverted zoom bounds");
            std::mem::swap(&mut self.zoom_min, &mut self.zoom_max);
        }
        self.set_zoom(self.viewport.zoom());
    }

    /// Clamp to the zoom range and walk there one level at a time
    pub fn set_zoom(&mut self, zoom: u8) {
        let target = zoom.clamp(self.zoom_min, self.zoom_max);
        while self.viewport.zoom() < target {
            self.zoom_in();
        }
        while self.viewport.zoom() > target {
            self.zoom_out();
        }
    }

    pub fn zoom_in(&mut self) -> bool {
        if self.viewport.zoom() >= self.zoom_max {
            return false;
        }
        self.viewport.set_zoom(self.viewport.zoom() + 1);
        self.commit();
        true
    }

    pub fn zoom_out(&mut self) -> bool {
        if self.viewport.zoom() <= self.zoom_min {
            return false;
        }
        self.viewport.set_zoom(self.viewport.zoom() - 1);
        self.commit();
        true
    }

    /// Zoom in one level keeping the coordinate under `px` in place
    pub fn zoom_in_at(&mut self, px: ViewportPixel) -> bool {
        if self.viewport.zoom() >= self.zoom_max {
            return false;
        }
        self.zoom_keeping(px, self.viewport.zoom() + 1);
        true
    }

    /// Zoom out one level keeping the coordinate under `px` in place
    pub fn zoom_out_at(&mut self, px: ViewportPixel) -> bool {
        if self.viewport.zoom() <= self.zoom_min {
            return false;
        }
        self.zoom_keeping(px, self.viewport.zoom() - 1);
        true
    }

    fn zoom_keeping(&mut self, px: ViewportPixel, zoom: u8) {
        let anchor = projection::viewport_px_to_geo(&self.viewport, px);
        self.viewport.set_zoom(zoom);

        let anchor_px = projection::to_world_px(&self.viewport, &anchor);
        let focus_px = anchor_px + (self.viewport.center_px() - px);
        self.viewport.set_focus(projection::to_geo(&self.viewport, focus_px));
        self.commit();
    }

    pub fn set_focus(&mut self, focus: GeoCoordinate) {
        self.viewport.set_focus(focus);
        self.commit();
    }

    /// Centre on the mean of `coords`, optionally hunting for the tightest
    /// zoom that keeps all of them visible
    pub fn set_focus_mean(&mut self, coords: &[GeoCoordinate], auto_zoom: bool) {
        let Some(mean) = geo::mean(coords) else {
            return;
        };
        self.set_focus(mean);

        if !auto_zoom {
            return;
        }

        while !self.viewport_contains(coords) && self.viewport.zoom() > self.zoom_min {
            self.zoom_out();
        }
        while self.viewport_contains(coords) && self.viewport.zoom() < self.zoom_max {
            self.zoom_in();
        }
        // Last zoom-in may have pushed points out of view
        if !self.viewport_contains(coords) && self.viewport.zoom() > self.zoom_min {
            self.zoom_out();
        }
    }

    /// Whether every coordinate lies inside the visible rect
    pub fn viewport_contains(&self, coords: &[GeoCoordinate]) -> bool {
        let rect = self.viewport.visible_world_rect();
        coords.iter().all(|c| rect.contains(c))
    }

    /// Start moving the focus to `target` over `steps` ticks, one per `interval`.
    ///
    /// Rejected while another animation is running. Ticks happen in
    /// [`advance_animation`](Self::advance_animation).
    pub fn set_focus_animated(
        &mut self,
        target: GeoCoordinate,
        steps: u32,
        interval: Duration,
    ) -> Result<(), ViewportError> {
        if self.animation.is_some() {
            warn!(
                lon = target.longitude,
                lat = target.latitude,
                "Focus animation rejected, already animating"
            );
            return Err(ViewportError::AlreadyAnimating);
        }

        if steps == 0 {
            self.set_focus(target);
            return Ok(());
        }

        self.animation = Some(Animation {
            target,
            steps_left: steps,
            interval,
            next_tick: Instant::now() + interval,
        });
        Ok(())
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Run every animation tick due at `now`. Returns true while animating.
    pub fn advance_animation(&mut self, now: Instant) -> bool {
        let Some(mut anim) = self.animation.take() else {
            return false;
        };

        while anim.steps_left > 0 && anim.next_tick <= now {
            let target_px = projection::to_world_px(&self.viewport, &anim.target);
            let delta = (target_px - self.viewport.focus_world_px()) / anim.steps_left as f64;
            self.scroll(delta);
            anim.steps_left -= 1;
            anim.next_tick += anim.interval;
        }

        if anim.steps_left > 0 {
            self.animation = Some(anim);
            true
        } else {
            false
        }
    }

    /// Move the focus by a world-pixel delta.
    ///
    /// With a scroll restriction in place, a move that would leave the
    /// visible rect entirely outside it is dropped. Returns whether the
    /// focus moved.
    pub fn scroll(&mut self, delta: DVec2) -> bool {
        let candidate = self.viewport.focus_world_px() + delta;

        if let Some(restriction) = &self.restriction {
            if !self.viewport.world_rect_for(candidate).intersects(restriction) {
                return false;
            }
        }

        let focus = projection::to_geo(&self.viewport, candidate);
        self.viewport.set_focus(focus);
        self.commit();
        true
    }

    pub fn scroll_left(&mut self, px: f64) -> bool {
        self.scroll(DVec2::new(-px, 0.0))
    }

    pub fn scroll_right(&mut self, px: f64) -> bool {
        self.scroll(DVec2::new(px, 0.0))
    }

    pub fn scroll_up(&mut self, px: f64) -> bool {
        self.scroll(DVec2::new(0.0, -px))
    }

    pub fn scroll_down(&mut self, px: f64) -> bool {
        self.scroll(DVec2::new(0.0, px))
    }

    /// Pointer button down on the map. Stops a coasting map.
    pub fn press(&mut self) {
        self.inertia.press();
    }

    /// Pointer moved while pressed; the map follows it. Returns whether the
    /// focus moved.
    pub fn drag(&mut self, px: ViewportPixel, now: Instant) -> bool {
        match self.inertia.drag(px, now) {
            Some(delta) => self.scroll(delta),
            None => false,
        }
    }

    /// Pointer button up. A drag keeps coasting from its last speed.
    pub fn release(&mut self) {
        self.inertia.release();
    }

    pub fn kinetic_state(&self) -> KineticState {
        self.inertia.state()
    }

    /// Run every inertia tick due at `now`. Returns true while coasting.
    pub fn advance_inertia(&mut self, now: Instant) -> bool {
        let mut steps = Vec::new();
        let coasting = self.inertia.advance(now, |delta| steps.push(delta));
        for delta in steps {
            self.scroll(delta);
        }
        coasting
    }

    /// Replace the scroll restriction. A null box disables it. Focus resets
    /// to (0, 0) either way.
    pub fn set_scroll_restriction(&mut self, restriction: Option<BoundingBox>) {
        self.restriction = restriction.filter(|r| !r.is_null());
        self.set_focus(GeoCoordinate::new(0.0, 0.0));
    }
}
