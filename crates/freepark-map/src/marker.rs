//! Interactive marker and geofence collision.
//!
//! While the controller is interactive the marker follows the camera center,
//! or the user's finger during a drag. Every position change rebuilds the
//! geofence around the marker, tests the rendered points against it and
//! redraws the radius and connecting-line layers.
//!
//! The controller owns the listener handles it attaches. They exist exactly
//! while it is interactive and are released by [`MarkerInteractionController::deactivate`],
//! the only cleanup path.

use crate::backend::MapBackend;
use crate::event::{EventKind, ListenerId, MapEvent};
use crate::layers::{LayerStore, RadiusCircle};
use crate::surface::MapSurface;
use freepark_core::config::MapConfig;
use freepark_core::error::{Result, StateError};
use freepark_core::types::{Coordinate, ZoomLevel};
use freepark_geo::geometry::{circle_polygon, distance_meters, is_point_in_polygon, nearest};
use freepark_geo::Polygon;
use serde::Serialize;
use tracing::{debug, info, trace};

/// Geofence and edit limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionSettings {
    pub geofence_radius_m: f64,
    pub circle_steps: usize,
    pub min_zoom_to_show_radius: f64,
    pub max_edit_distance_m: f64,
}

impl InteractionSettings {
    pub fn from_config(config: &MapConfig) -> Self {
        Self {
            geofence_radius_m: config.geofence_radius_m,
            circle_steps: config.circle_steps,
            min_zoom_to_show_radius: config.min_zoom_to_show_radius,
            max_edit_distance_m: config.max_edit_distance_m,
        }
    }
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self::from_config(&MapConfig::default())
    }
}

/// Result of the last collision evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollisionState {
    /// A rendered point lies inside the marker's geofence
    pub is_colliding: bool,
    /// First rendered point found inside the geofence
    pub colliding_with: Option<Coordinate>,
    /// Distance to the closest rendered point
    pub nearest_distance_m: Option<f64>,
    /// Distance from the reference location, when editing
    pub distance_from_reference_m: Option<f64>,
    /// The marker is farther from the reference than allowed
    pub is_out_of_range: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Idle,
    Interactive,
}

impl MarkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerState::Idle => "idle",
            MarkerState::Interactive => "interactive",
        }
    }
}

/// Listener handles held while interactive.
#[derive(Debug, Clone, Copy)]
struct Subscriptions {
    camera_move: ListenerId,
    drag_start: ListenerId,
    drag: ListenerId,
    drag_end: ListenerId,
}

impl Subscriptions {
    fn attach<B: MapBackend>(surface: &mut MapSurface<B>) -> Result<Self> {
        Ok(Self {
            camera_move: surface.listen(EventKind::CameraMove)?,
            drag_start: surface.listen(EventKind::DragStart)?,
            drag: surface.listen(EventKind::Drag)?,
            drag_end: surface.listen(EventKind::DragEnd)?,
        })
    }

    fn detach<B: MapBackend>(self, surface: &mut MapSurface<B>) {
        for id in [self.camera_move, self.drag_start, self.drag, self.drag_end] {
            surface.unlisten(id);
        }
    }

    fn listener_for(&self, kind: EventKind) -> Option<ListenerId> {
        match kind {
            EventKind::CameraMove => Some(self.camera_move),
            EventKind::DragStart => Some(self.drag_start),
            EventKind::Drag => Some(self.drag),
            EventKind::DragEnd => Some(self.drag_end),
            _ => None,
        }
    }
}

/// Drives the draggable marker used to place or move a parking point.
#[derive(Debug, Clone)]
pub struct MarkerInteractionController {
    settings: InteractionSettings,
    subscriptions: Option<Subscriptions>,
    position: Option<Coordinate>,
    reference: Option<Coordinate>,
    dragging: bool,
    rendered_points: Vec<Coordinate>,
    collision: CollisionState,
}

impl MarkerInteractionController {
    pub fn new(settings: InteractionSettings) -> Self {
        Self {
            settings,
            subscriptions: None,
            position: None,
            reference: None,
            dragging: false,
            rendered_points: Vec::new(),
            collision: CollisionState::default(),
        }
    }

    pub fn state(&self) -> MarkerState {
        if self.subscriptions.is_some() {
            MarkerState::Interactive
        } else {
            MarkerState::Idle
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.state() == MarkerState::Interactive
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn reference(&self) -> Option<Coordinate> {
        self.reference
    }

    pub fn collision(&self) -> &CollisionState {
        &self.collision
    }

    pub fn rendered_points(&self) -> &[Coordinate] {
        &self.rendered_points
    }

    /// Shows the marker at the camera center and starts following events.
    ///
    /// `reference` is the original location when moving an existing point.
    pub fn activate<B: MapBackend>(
        &mut self,
        surface: &mut MapSurface<B>,
        layers: &mut LayerStore,
        reference: Option<Coordinate>,
    ) -> Result<CollisionState> {
        if self.is_interactive() {
            return Err(StateError::invalid("activate", self.state().as_str()).into());
        }
        if surface.is_destroyed() {
            return Err(StateError::no_surface("activate").into());
        }
        if let Some(reference) = reference {
            reference.validate()?;
        }

        let center = surface.camera().center;
        surface.show_marker(center);
        surface.set_marker_draggable(true);
        self.subscriptions = Some(Subscriptions::attach(surface)?);
        self.position = Some(center);
        self.reference = reference;
        self.dragging = false;

        if let Err(e) = self.evaluate(surface, layers) {
            self.deactivate(surface, layers);
            return Err(e);
        }

        info!(
            position = %center,
            editing = reference.is_some(),
            is_colliding = self.collision.is_colliding,
            "Marker interaction started"
        );
        Ok(self.collision.clone())
    }

    /// Stops following events, hides the marker and clears the interaction
    /// layers. Safe to call in any state.
    ///
    /// Returns true if the controller was interactive.
    pub fn deactivate<B: MapBackend>(&mut self, surface: &mut MapSurface<B>, layers: &mut LayerStore) -> bool {
        let subscriptions = self.subscriptions.take();
        let was_interactive = subscriptions.is_some();
        if let Some(subscriptions) = subscriptions {
            subscriptions.detach(surface);
        }

        surface.set_marker_draggable(false);
        surface.hide_marker();
        layers.clear_interaction_layers(surface);

        self.position = None;
        self.reference = None;
        self.dragging = false;
        self.collision = CollisionState::default();

        if was_interactive {
            info!("Marker interaction ended");
        }
        was_interactive
    }

    /// Applies a map event. Returns true if the event was consumed.
    ///
    /// Only events with a live listener held by this controller are handled.
    pub fn handle_event<B: MapBackend>(
        &mut self,
        surface: &mut MapSurface<B>,
        layers: &mut LayerStore,
        event: &MapEvent,
    ) -> Result<bool> {
        let Some(subscriptions) = self.subscriptions else {
            return Ok(false);
        };
        let Some(listener) = subscriptions.listener_for(event.kind()) else {
            return Ok(false);
        };
        if !surface.is_live(listener) {
            return Ok(false);
        }

        match *event {
            MapEvent::CameraMove { center, zoom } => {
                if self.dragging {
                    // The marker stays put but the zoom may cross the radius threshold
                    trace!(center = %center, zoom, "Camera move ignored during drag");
                    self.redraw_radius(surface, layers)?;
                    return Ok(false);
                }
                self.move_to(surface, layers, center)?;
            }
            MapEvent::DragStart { position } => {
                self.dragging = true;
                self.move_to(surface, layers, position)?;
            }
            MapEvent::Drag { position } => {
                self.dragging = true;
                self.move_to(surface, layers, position)?;
            }
            MapEvent::DragEnd { position } => {
                self.dragging = false;
                self.move_to(surface, layers, position)?;
                let zoom = surface.camera().zoom;
                surface.jump_to(position, ZoomLevel::Level(zoom))?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Current marker position.
    pub fn current_position(&self) -> Result<Coordinate> {
        match (self.state(), self.position) {
            (MarkerState::Interactive, Some(position)) => Ok(position),
            (state, _) => Err(StateError::invalid("current_position", state.as_str()).into()),
        }
    }

    /// Replaces the collision candidates without re-evaluating.
    pub fn load_rendered_points(&mut self, points: Vec<Coordinate>) {
        self.rendered_points = points;
    }

    /// Replaces the collision candidates and re-evaluates when interactive.
    pub fn set_rendered_points<B: MapBackend>(
        &mut self,
        surface: &mut MapSurface<B>,
        layers: &mut LayerStore,
        points: Vec<Coordinate>,
    ) -> Result<()> {
        self.rendered_points = points;
        if self.is_interactive() {
            self.evaluate(surface, layers)?;
        }
        Ok(())
    }

    fn move_to<B: MapBackend>(
        &mut self,
        surface: &mut MapSurface<B>,
        layers: &mut LayerStore,
        position: Coordinate,
    ) -> Result<()> {
        position.validate()?;
        self.position = Some(position);
        surface.move_marker(position);
        self.evaluate(surface, layers)
    }

    fn evaluate<B: MapBackend>(&mut self, surface: &mut MapSurface<B>, layers: &mut LayerStore) -> Result<()> {
        let position = self.current_position()?;
        let geofence = circle_polygon(position, self.settings.geofence_radius_m, self.settings.circle_steps)?;

        // The point being moved must not collide with its own old location.
        let candidates: Vec<Coordinate> = self
            .rendered_points
            .iter()
            .copied()
            .filter(|c| Some(*c) != self.reference)
            .collect();

        let mut colliding_with = None;
        for &candidate in &candidates {
            if is_point_in_polygon(candidate, &geofence)? {
                colliding_with = Some(candidate);
                break;
            }
        }

        let nearest_distance_m = match nearest(position, &candidates)? {
            Some(closest) => Some(distance_meters(position, closest)?),
            None => None,
        };
        let distance_from_reference_m = match self.reference {
            Some(reference) => Some(distance_meters(reference, position)?),
            None => None,
        };
        let is_out_of_range =
            distance_from_reference_m.map_or(false, |d| d > self.settings.max_edit_distance_m);

        self.collision = CollisionState {
            is_colliding: colliding_with.is_some(),
            colliding_with,
            nearest_distance_m,
            distance_from_reference_m,
            is_out_of_range,
        };

        self.draw_radius(surface, layers, geofence);
        layers.set_connecting_line(
            surface,
            self.reference,
            Some(position),
            self.collision.is_colliding || is_out_of_range,
        )?;

        debug!(
            position = %position,
            is_colliding = self.collision.is_colliding,
            is_out_of_range,
            "Collision evaluated"
        );
        Ok(())
    }

    fn redraw_radius<B: MapBackend>(&self, surface: &mut MapSurface<B>, layers: &mut LayerStore) -> Result<()> {
        let position = self.current_position()?;
        let geofence = circle_polygon(position, self.settings.geofence_radius_m, self.settings.circle_steps)?;
        self.draw_radius(surface, layers, geofence);
        Ok(())
    }

    fn draw_radius<B: MapBackend>(&self, surface: &mut MapSurface<B>, layers: &mut LayerStore, geofence: Polygon<f64>) {
        if surface.camera().zoom >= self.settings.min_zoom_to_show_radius {
            let circle = RadiusCircle {
                polygon: geofence,
                is_colliding: self.collision.is_colliding,
            };
            layers.set_radius(surface, &[circle]);
        } else {
            layers.set_radius(surface, &[]);
        }
    }
}
