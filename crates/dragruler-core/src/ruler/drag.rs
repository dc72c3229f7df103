//! Drag-aware ruler decorator.

use super::{BoxFuture, DragUpdate, MoveOutcome, PointerMove, Role, Ruler, RulerError, RulerResult, RulerState, RulerUpdate};
use crate::grid::GridGeometry;
use crate::scheduler::{DeferredMeasurementScheduler, MeasurementWait, WaitOutcome};
use crate::segment::{DragSegment, Ray, RulerSegment, SegmentContext, SegmentStyle, build_segments, highlight_positions};
use crate::session::DragSession;
use crate::settings::SettingsProvider;
use crate::snap::Snapper;
use crate::token::{Token, TokenId, TokenRegistry};
use crate::waypoint::{WaypointAnnotator, WaypointStore};
use kurbo::Point;
use std::sync::Arc;

/// Collaborators a drag ruler consults.
#[derive(Clone)]
pub struct RulerEnv {
    pub tokens: Arc<dyn TokenRegistry>,
    pub grid: Arc<dyn GridGeometry>,
    pub settings: Arc<dyn SettingsProvider>,
}

impl std::fmt::Debug for RulerEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulerEnv")
            .field("grid_kind", &self.grid.kind())
            .field("grid_size", &self.grid.size())
            .field("settings", &self.settings.settings())
            .finish_non_exhaustive()
    }
}

/// Wraps a host [`Ruler`] with drag-measurement behavior.
///
/// Owns the drag session flags, the waypoint store and the deferred
/// measurement scheduler. Every [`Ruler`] method delegates to the base ruler
/// unchanged while no session is active.
#[derive(Debug)]
pub struct DragRuler<R> {
    base: R,
    env: RulerEnv,
    /// User the ruler belongs to.
    owner: Role,
    /// User looking at the ruler on this client.
    viewer: Role,
    session: DragSession,
    waypoints: WaypointStore,
    scheduler: DeferredMeasurementScheduler<PointerMove>,
    style: SegmentStyle,
}

impl<R: Ruler> DragRuler<R> {
    pub fn new(base: R, env: RulerEnv, owner: Role, viewer: Role) -> Self {
        Self {
            base,
            env,
            owner,
            viewer,
            session: DragSession::new(),
            waypoints: WaypointStore::new(),
            scheduler: DeferredMeasurementScheduler::new(),
            style: SegmentStyle::default(),
        }
    }

    pub fn with_style(mut self, style: SegmentStyle) -> Self {
        self.style = style;
        self
    }

    pub fn base(&self) -> &R {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut R {
        &mut self.base
    }

    pub fn session(&self) -> &DragSession {
        &self.session
    }

    pub fn waypoint_store(&self) -> &WaypointStore {
        &self.waypoints
    }

    pub fn scheduler(&self) -> &DeferredMeasurementScheduler<PointerMove> {
        &self.scheduler
    }

    /// Whether a drag session is active on this ruler.
    pub fn is_drag_ruler(&self) -> bool {
        self.session.is_active()
    }

    /// The live dragged token, if the session is active and it still exists.
    pub fn dragged_token(&self) -> Option<Token> {
        self.session.resolve_dragged_token(self.env.tokens.as_ref())
    }

    /// Snapping for the dragged token; single-cell when the token is missing.
    pub fn snapper(&self) -> Snapper<'_> {
        let footprint = self.dragged_token().map(|token| token.footprint);
        Snapper::new(self.env.grid.as_ref(), footprint)
    }

    /// Start a drag session for `token`, grabbed with the pointer at `pointer`.
    pub fn start_drag(&mut self, token: TokenId, pointer: Point) -> RulerResult<()> {
        self.start_drag_with_history(token, pointer, &[])
    }

    /// Start a drag session whose earlier movement is `history`.
    pub fn start_drag_with_history(&mut self, token: TokenId, pointer: Point, history: &[Point]) -> RulerResult<()> {
        if self.is_drag_ruler() {
            return Err(RulerError::SessionActive);
        }
        let dragged = self.env.tokens.get(token).ok_or(RulerError::TokenNotFound(token))?;
        let grid = self.env.grid.as_ref();
        let anchor = Snapper::new(grid, Some(dragged.footprint)).snap(dragged.center);

        self.session.begin(token, dragged.center - pointer);
        self.waypoints.begin_with_history(history, anchor);
        self.base.clear();
        for waypoint in self.waypoints.waypoints() {
            self.base.add_waypoint(waypoint.point, false);
        }
        log::debug!("Drag session started for token {} at {:?}", token, anchor);
        Ok(())
    }

    fn end_drag_session(&mut self) {
        if !self.is_drag_ruler() {
            return;
        }
        let anchor = match self.dragged_token() {
            Some(token) => self.snapper().snap(token.center),
            None => self.waypoints.anchor().map(|w| w.point).unwrap_or(Point::ZERO),
        };
        self.scheduler.cancel();
        self.session.end();
        self.waypoints.clear(anchor);
        log::debug!("Drag session ended");
    }

    /// Timer tick from the host event loop. Measures the latest deferred
    /// request if the timer is armed; returns whether it did.
    pub fn on_tick(&mut self) -> bool {
        let Some(fire) = self.scheduler.fire() else {
            return false;
        };
        log::trace!("Running deferred measurement to {:?}", fire.request.destination);
        self.base.measure(fire.request.destination);
        fire.complete();
        true
    }

    /// A handle resolving once the currently deferred measurement has run.
    pub fn await_deferred_measurement(&self) -> MeasurementWait {
        self.scheduler.wait()
    }

    /// Run any armed deferred measurement now and wait for it to settle.
    pub async fn do_deferred_measurements(&mut self) -> WaitOutcome {
        if !self.is_drag_ruler() {
            return WaitOutcome::Completed;
        }
        self.on_tick();
        self.scheduler.wait().await
    }

    /// Delete the newest pending waypoint and re-measure. With nothing left to
    /// delete the drag is aborted.
    pub fn delete_waypoint(&mut self) {
        if !self.is_drag_ruler() {
            return;
        }
        if self.waypoints.delete_last_waypoint().is_some() {
            self.base.remove_last_waypoint();
            if let Some(destination) = self.base.destination() {
                self.base.measure(destination);
            }
        } else {
            self.abort_drag();
        }
    }

    /// End the measurement without moving the token.
    pub fn abort_drag(&mut self) {
        if !self.is_drag_ruler() {
            return;
        }
        log::debug!("Drag aborted");
        self.end_measurement();
    }

    /// Refresh waypoint caches and re-measure to the current destination.
    pub fn recalculate(&mut self, annotator: &dyn WaypointAnnotator) {
        if !self.is_drag_ruler() {
            return;
        }
        self.waypoints.recalculate(annotator);
        if let Some(destination) = self.base.destination() {
            self.base.measure(destination);
        }
    }

    /// Record that the token has travelled through waypoint `upto`.
    pub fn mark_traversed(&mut self, upto: usize) {
        if self.is_drag_ruler() {
            self.waypoints.mark_traversed(upto);
        }
    }

    /// Right-click: delete a waypoint, or add one when the actions are swapped.
    pub fn on_right_click(&mut self) {
        if !self.is_drag_ruler() {
            return;
        }
        if self.env.settings.settings().swap_spacebar_right_click {
            self.commit_destination();
        } else {
            self.delete_waypoint();
        }
    }

    /// Pointer released: move the token along the measured path.
    pub fn on_drop(&mut self) -> BoxFuture<'_, RulerResult<()>> {
        if self.is_drag_ruler() {
            self.base.set_state(RulerState::Moving);
        }
        self.move_token()
    }

    fn commit_destination(&mut self) {
        if let Some(destination) = self.base.destination() {
            let center = self.session.snap_enabled();
            self.add_waypoint(destination, center);
        }
    }

    /// Rays for the current path, with the live destination appended.
    pub fn segments(&self) -> Vec<Ray> {
        let destination = self.base.destination();
        if self.is_drag_ruler() {
            return build_segments(self.waypoints.waypoints(), destination);
        }
        let mut points = self.base.waypoints().to_vec();
        points.extend(destination);
        points.windows(2).map(|pair| Ray::new(pair[0], pair[1])).collect()
    }

    /// Render each segment through the host segment type built by `make`.
    pub fn render_segments<S, F>(&self, mut make: F) -> Vec<S>
    where
        S: RulerSegment,
        F: FnMut(usize, Ray) -> S,
    {
        let token = self.dragged_token();
        let context = self.is_drag_ruler().then(|| SegmentContext {
            waypoints: self.waypoints.waypoints(),
            snapper: token.map(|t| Snapper::new(self.env.grid.as_ref(), Some(t.footprint))),
            style: &self.style,
        });
        let grid = self.env.grid.as_ref();

        self.segments()
            .into_iter()
            .enumerate()
            .map(|(index, ray)| {
                let mut segment = DragSegment::new(make(index, ray), context);
                segment.add_properties();
                segment.draw_line();
                for position in highlight_positions(segment.ray(), grid) {
                    segment.highlight_position(position);
                }
                segment.into_inner()
            })
            .collect()
    }

    fn hides_from_viewer(&self, data: &RulerUpdate) -> bool {
        if !self.owner.is_gm() || self.viewer.is_gm() {
            return false;
        }
        if self.env.settings.settings().show_gm_ruler_to_players {
            return false;
        }
        let session = data.drag.as_ref().map(|d| d.session).unwrap_or(self.session);
        session.resolve_dragged_token(self.env.tokens.as_ref()).is_some()
    }
}

impl<R: Ruler> Ruler for DragRuler<R> {
    fn state(&self) -> RulerState {
        self.base.state()
    }

    fn set_state(&mut self, state: RulerState) {
        self.base.set_state(state);
    }

    fn waypoints(&self) -> &[Point] {
        self.base.waypoints()
    }

    fn destination(&self) -> Option<Point> {
        self.base.destination()
    }

    fn clear(&mut self) {
        self.cancel_scheduled_measurement();
        self.base.clear();
    }

    fn update(&mut self, data: &RulerUpdate) {
        if self.hides_from_viewer(data) {
            log::trace!("Suppressed GM drag ruler update for player");
            return;
        }
        match &data.drag {
            Some(drag) if !drag.waypoints.is_empty() => {
                self.session = drag.session;
                self.waypoints.restore(drag.waypoints.clone(), drag.anchor);
            }
            _ => self.end_drag_session(),
        }
        self.base.update(data);
    }

    fn to_update(&self) -> RulerUpdate {
        let mut update = self.base.to_update();
        if self.is_drag_ruler() {
            update.drag = Some(DragUpdate {
                session: self.session,
                waypoints: self.waypoints.waypoints().to_vec(),
                anchor: self.waypoints.anchor_index(),
            });
        }
        update
    }

    fn end_measurement(&mut self) {
        self.end_drag_session();
        self.base.end_measurement();
    }

    fn on_pointer_move(&mut self, event: &PointerMove) -> MoveOutcome {
        if !self.is_drag_ruler() {
            let outcome = self.base.on_pointer_move(event);
            if outcome == MoveOutcome::RateLimited {
                self.base.defer_measurement(event.destination, event);
            }
            return outcome;
        }

        // The offset must be applied before the base ruler measures.
        let mut event = event.clone();
        event.destination += self.session.pointer_offset();
        self.session.set_snap(!event.modifiers.shift);
        if self.session.snap_enabled() {
            event.destination = self.snapper().snap(event.destination);
        }

        let outcome = self.base.on_pointer_move(&event);
        match outcome {
            MoveOutcome::RateLimited => self.defer_measurement(event.destination, &event),
            // A fresh measurement supersedes whatever the timer still holds.
            MoveOutcome::Measured => self.cancel_scheduled_measurement(),
            MoveOutcome::Ignored => {}
        }
        outcome
    }

    fn set_destination(&mut self, destination: Point) {
        let destination = if self.session.snap_enabled() {
            self.snapper().snap(destination)
        } else {
            destination
        };
        self.base.set_destination(destination);
    }

    fn add_waypoint(&mut self, point: Point, center: bool) {
        if !self.is_drag_ruler() {
            self.base.add_waypoint(point, center);
            return;
        }
        let footprint = self.dragged_token().map(|token| token.footprint);
        let snapper = Snapper::new(self.env.grid.as_ref(), footprint);
        if let Some(point) = self.waypoints.add_waypoint(point, center, &snapper) {
            self.base.add_waypoint(point, false);
        }
    }

    fn remove_last_waypoint(&mut self) {
        if !self.is_drag_ruler() {
            self.base.remove_last_waypoint();
            return;
        }
        if self.waypoints.delete_last_waypoint().is_some() {
            self.base.remove_last_waypoint();
        }
    }

    fn measure(&mut self, destination: Point) {
        self.base.measure(destination);
    }

    fn defer_measurement(&mut self, destination: Point, event: &PointerMove) {
        if self.is_drag_ruler() {
            self.scheduler.defer(destination, event.clone());
        }
        self.base.defer_measurement(destination, event);
    }

    fn cancel_scheduled_measurement(&mut self) {
        if self.is_drag_ruler() {
            self.scheduler.cancel();
        }
        self.base.cancel_scheduled_measurement();
    }

    fn movement_token(&self) -> Option<TokenId> {
        if !self.is_drag_ruler() {
            return self.base.movement_token();
        }
        self.dragged_token().map(|token| token.id)
    }

    fn move_token_along(&mut self, token: TokenId) -> BoxFuture<'_, RulerResult<()>> {
        self.base.move_token_along(token)
    }

    fn move_token(&mut self) -> BoxFuture<'_, RulerResult<()>> {
        if !self.is_drag_ruler() {
            return self.base.move_token();
        }
        if self.base.state() != RulerState::Moving {
            // Spacebar while measuring edits waypoints instead of moving.
            if self.env.settings.settings().swap_spacebar_right_click {
                self.delete_waypoint();
            } else {
                self.commit_destination();
            }
            return Box::pin(async { Ok(()) });
        }

        Box::pin(async move {
            if self.do_deferred_measurements().await == WaitOutcome::Abandoned {
                log::debug!("Deferred measurement abandoned before move");
            }
            let Some(token) = self.movement_token() else {
                self.base.set_state(RulerState::Measuring);
                return Err(RulerError::NoMovementToken);
            };
            match self.base.move_token_along(token).await {
                Ok(()) => {
                    self.end_measurement();
                    Ok(())
                }
                Err(e) => {
                    log::warn!("Token move failed: {}", e);
                    self.base.set_state(RulerState::Measuring);
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, GridCell};
    use crate::ruler::{Instant, MeasuringRuler, Modifiers};
    use crate::segment::{PREVIOUS_OPACITY, RecordingSegment};
    use crate::settings::{DragRulerSettings, SharedSettings};
    use crate::token::{MemoryTokenRegistry, TokenFootprint};
    use crate::waypoint::NoAnnotations;
    use std::time::Duration;

    struct Fixture {
        ruler: DragRuler<MeasuringRuler>,
        tokens: Arc<MemoryTokenRegistry>,
        settings: Arc<SharedSettings>,
        token: TokenId,
        start: Instant,
    }

    fn fixture_with_roles(owner: Role, viewer: Role) -> Fixture {
        let grid = Arc::new(Grid::square(10.0));
        let tokens = Arc::new(MemoryTokenRegistry::new());
        let settings = Arc::new(SharedSettings::new(DragRulerSettings::default()));
        let token = Token::new(Point::new(5.0, 5.0), TokenFootprint::default());
        let id = token.id;
        tokens.insert(token);

        let base = MeasuringRuler::new(grid.clone(), Arc::clone(&tokens));
        let env = RulerEnv {
            tokens: tokens.clone(),
            grid,
            settings: settings.clone(),
        };
        Fixture {
            ruler: DragRuler::new(base, env, owner, viewer),
            tokens,
            settings,
            token: id,
            start: Instant::now(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with_roles(Role::Player, Role::Player)
    }

    fn at(fx: &Fixture, ms: u64) -> Instant {
        fx.start + Duration::from_millis(ms)
    }

    #[test]
    fn test_start_drag_sets_anchor_and_offset() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(8.0, 2.0)).unwrap();

        assert!(fx.ruler.is_drag_ruler());
        assert_eq!(fx.ruler.session().pointer_offset(), kurbo::Vec2::new(-3.0, 3.0));
        assert_eq!(fx.ruler.waypoint_store().len(), 1);
        assert_eq!(fx.ruler.waypoints(), &[Point::new(5.0, 5.0)]);
        assert!(matches!(fx.ruler.start_drag(fx.token, Point::ZERO), Err(RulerError::SessionActive)));
    }

    #[test]
    fn test_start_drag_unknown_token() {
        let mut fx = fixture();
        let missing = TokenId::new_v4();
        assert!(matches!(fx.ruler.start_drag(missing, Point::ZERO), Err(RulerError::TokenNotFound(id)) if id == missing));
        assert!(!fx.ruler.is_drag_ruler());
    }

    #[test]
    fn test_pointer_move_applies_offset_then_snaps() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(8.0, 2.0)).unwrap();

        let event = PointerMove::new(Point::new(30.0, 14.0), at(&fx, 0));
        assert_eq!(fx.ruler.on_pointer_move(&event), MoveOutcome::Measured);
        // (30, 14) + (-3, 3) = (27, 17), snapped to the centre of cell (1, 2)
        assert_eq!(fx.ruler.destination(), Some(Point::new(25.0, 15.0)));

        let shifted = PointerMove::new(Point::new(30.0, 14.0), at(&fx, 100)).with_modifiers(Modifiers {
            shift: true,
            ..Modifiers::default()
        });
        fx.ruler.on_pointer_move(&shifted);
        assert_eq!(fx.ruler.destination(), Some(Point::new(27.0, 17.0)));
    }

    #[test]
    fn test_inactive_ruler_delegates() {
        let mut fx = fixture();
        fx.ruler.add_waypoint(Point::new(13.0, 13.0), true);
        assert_eq!(fx.ruler.waypoints(), &[Point::new(15.0, 15.0)]);
        assert!(fx.ruler.waypoint_store().is_empty());

        let event = PointerMove::new(Point::new(31.0, 12.0), at(&fx, 0));
        fx.ruler.on_pointer_move(&event);
        assert_eq!(fx.ruler.destination(), Some(Point::new(31.0, 12.0)));

        let quick = PointerMove::new(Point::new(41.0, 12.0), at(&fx, 1));
        assert_eq!(fx.ruler.on_pointer_move(&quick), MoveOutcome::RateLimited);
        assert_eq!(fx.ruler.base().deferred(), Some(Point::new(41.0, 12.0)));
        assert!(!fx.ruler.scheduler().is_armed());
        assert_eq!(fx.ruler.movement_token(), None);
    }

    #[test]
    fn test_rate_limited_moves_defer_latest() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();

        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(15.0, 5.0), at(&fx, 0)));
        assert_eq!(fx.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 5.0), at(&fx, 10))), MoveOutcome::RateLimited);
        assert_eq!(fx.ruler.on_pointer_move(&PointerMove::new(Point::new(35.0, 5.0), at(&fx, 20))), MoveOutcome::RateLimited);
        assert!(fx.ruler.scheduler().is_armed());
        assert_eq!(fx.ruler.base().deferred(), Some(Point::new(35.0, 5.0)));

        let wait = fx.ruler.await_deferred_measurement();
        assert!(fx.ruler.on_tick());
        assert!(!fx.ruler.on_tick());
        assert_eq!(fx.ruler.base().measurements, vec![Point::new(15.0, 5.0), Point::new(35.0, 5.0)]);
        assert_eq!(pollster::block_on(wait), WaitOutcome::Completed);
    }

    #[test]
    fn test_immediate_measure_discards_deferred() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();

        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(15.0, 5.0), at(&fx, 0)));
        assert_eq!(fx.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 5.0), at(&fx, 10))), MoveOutcome::RateLimited);
        let wait = fx.ruler.await_deferred_measurement();
        assert_eq!(fx.ruler.on_pointer_move(&PointerMove::new(Point::new(75.0, 5.0), at(&fx, 100))), MoveOutcome::Measured);

        assert!(!fx.ruler.scheduler().is_armed());
        assert_eq!(fx.ruler.base().deferred(), None);
        assert_eq!(wait.outcome(), Some(WaitOutcome::Abandoned));
        assert!(!fx.ruler.on_tick());
        assert_eq!(fx.ruler.destination(), Some(Point::new(75.0, 5.0)));

        pollster::block_on(fx.ruler.on_drop()).unwrap();
        assert_eq!(fx.tokens.get(fx.token).unwrap().center, Point::new(75.0, 5.0));
        assert_eq!(fx.ruler.base().moves[0].1, vec![Point::new(5.0, 5.0), Point::new(75.0, 5.0)]);
    }

    #[test]
    fn test_waypoints_snap_to_token() {
        let mut fx = fixture();
        let big = Token::new(Point::new(10.0, 10.0), TokenFootprint::new(2.0, 2.0));
        let id = big.id;
        fx.tokens.insert(big);
        fx.ruler.start_drag(id, Point::new(10.0, 10.0)).unwrap();

        fx.ruler.add_waypoint(Point::new(27.0, 13.0), true);
        assert_eq!(fx.ruler.waypoints(), &[Point::new(10.0, 10.0), Point::new(30.0, 10.0)]);
        assert_eq!(fx.ruler.waypoint_store().last().unwrap().point, Point::new(30.0, 10.0));
    }

    #[test]
    fn test_spacebar_adds_and_right_click_deletes() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 5.0), at(&fx, 0)));

        pollster::block_on(fx.ruler.move_token()).unwrap();
        assert_eq!(fx.ruler.waypoint_store().len(), 2);
        assert_eq!(fx.ruler.waypoints().len(), 2);

        fx.ruler.on_right_click();
        assert_eq!(fx.ruler.waypoint_store().len(), 1);
        assert_eq!(fx.ruler.waypoints().len(), 1);
        assert!(fx.ruler.is_drag_ruler());

        // Nothing left to delete: the drag is aborted.
        fx.ruler.on_right_click();
        assert!(!fx.ruler.is_drag_ruler());
        assert_eq!(fx.ruler.state(), RulerState::Inactive);
    }

    #[test]
    fn test_swapped_controls() {
        let mut fx = fixture();
        fx.settings.set(DragRulerSettings {
            swap_spacebar_right_click: true,
            ..DragRulerSettings::default()
        });
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 5.0), at(&fx, 0)));

        fx.ruler.on_right_click();
        assert_eq!(fx.ruler.waypoint_store().len(), 2);
        pollster::block_on(fx.ruler.move_token()).unwrap();
        assert_eq!(fx.ruler.waypoint_store().len(), 1);
    }

    #[test]
    fn test_end_measurement_resets_everything() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        for x in [15.0, 25.0, 35.0] {
            fx.ruler.add_waypoint(Point::new(x, 5.0), true);
        }
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(45.0, 5.0), at(&fx, 0)));
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(55.0, 5.0), at(&fx, 1)));
        let wait = fx.ruler.await_deferred_measurement();
        assert!(fx.ruler.scheduler().is_armed());

        fx.ruler.end_measurement();
        assert!(!fx.ruler.is_drag_ruler());
        assert_eq!(fx.ruler.waypoint_store().len(), 1);
        assert!(!fx.ruler.scheduler().is_armed());
        assert!(!fx.ruler.on_tick());
        assert_eq!(wait.outcome(), Some(WaitOutcome::Abandoned));
        assert_eq!(fx.ruler.movement_token(), None);
    }

    #[test]
    fn test_drop_moves_token_with_latest_destination() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(15.0, 5.0), at(&fx, 0)));
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(35.0, 15.0), at(&fx, 5)));

        pollster::block_on(fx.ruler.on_drop()).unwrap();

        assert_eq!(fx.tokens.get(fx.token).unwrap().center, Point::new(35.0, 15.0));
        let (moved, path) = &fx.ruler.base().moves[0];
        assert_eq!(*moved, fx.token);
        assert_eq!(path, &vec![Point::new(5.0, 5.0), Point::new(35.0, 15.0)]);
        assert!(!fx.ruler.is_drag_ruler());
    }

    #[test]
    fn test_drop_with_deleted_token_fails_softly() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(15.0, 5.0), at(&fx, 0)));
        fx.tokens.remove(fx.token);

        let result = pollster::block_on(fx.ruler.on_drop());
        assert!(matches!(result, Err(RulerError::NoMovementToken)));
        assert!(fx.ruler.is_drag_ruler());
        assert_eq!(fx.ruler.state(), RulerState::Measuring);
    }

    #[test]
    fn test_missing_token_degrades_snapping() {
        let mut fx = fixture();
        let big = Token::new(Point::new(10.0, 10.0), TokenFootprint::new(2.0, 2.0));
        let id = big.id;
        fx.tokens.insert(big);
        fx.ruler.start_drag(id, Point::new(10.0, 10.0)).unwrap();
        fx.tokens.remove(id);

        fx.ruler.add_waypoint(Point::new(27.0, 13.0), true);
        assert_eq!(fx.ruler.waypoint_store().last().unwrap().point, Point::new(25.0, 15.0));
        assert!(fx.ruler.is_drag_ruler());
    }

    #[test]
    fn test_gm_ruler_hidden_from_players() {
        let mut gm = fixture_with_roles(Role::Gamemaster, Role::Gamemaster);
        gm.ruler.start_drag(gm.token, Point::new(5.0, 5.0)).unwrap();
        gm.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 5.0), at(&gm, 0)));
        let data = gm.ruler.to_update();
        assert!(data.drag.is_some());

        let mut player = fixture_with_roles(Role::Gamemaster, Role::Player);
        player.tokens.insert(gm.tokens.get(gm.token).unwrap());
        player.settings.set(DragRulerSettings {
            show_gm_ruler_to_players: false,
            ..DragRulerSettings::default()
        });
        player.ruler.update(&data);
        assert!(player.ruler.base().updates.is_empty());
        assert!(!player.ruler.is_drag_ruler());

        player.settings.set(DragRulerSettings::default());
        player.ruler.update(&data);
        assert_eq!(player.ruler.base().updates.len(), 1);
        assert!(player.ruler.is_drag_ruler());
        assert_eq!(player.ruler.destination(), Some(Point::new(25.0, 5.0)));
    }

    #[test]
    fn test_update_roundtrips_through_json() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.add_waypoint(Point::new(15.0, 5.0), true);
        fx.ruler.mark_traversed(0);
        let json = serde_json::to_string(&fx.ruler.to_update()).unwrap();
        let data: RulerUpdate = serde_json::from_str(&json).unwrap();

        let drag = data.drag.expect("drag details");
        assert_eq!(drag.session.dragged_token_id(), Some(fx.token));
        assert!(drag.waypoints[0].is_previous);
        assert!(!drag.waypoints[1].is_previous);
    }

    #[test]
    fn test_render_segments_dims_previous() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.add_waypoint(Point::new(25.0, 5.0), true);
        fx.ruler.mark_traversed(0);
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 25.0), at(&fx, 0)));

        let segments = fx.ruler.render_segments(|index, ray| RecordingSegment::new(index, ray, 10.0));
        assert_eq!(segments.len(), 2);
        assert!(segments[0].ray().is_previous);
        assert!((segments[0].opacity().line - PREVIOUS_OPACITY).abs() < f32::EPSILON);
        assert!(!segments[1].ray().is_previous);
        assert_eq!(
            segments[0].filled_cells(),
            vec![GridCell::new(0, 0), GridCell::new(0, 1), GridCell::new(0, 2)]
        );
        assert_eq!(segments[1].filled_cells().last(), Some(&GridCell::new(2, 2)));
    }

    #[test]
    fn test_recalculate_remeasures() {
        let mut fx = fixture();
        fx.ruler.start_drag(fx.token, Point::new(5.0, 5.0)).unwrap();
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(25.0, 5.0), at(&fx, 0)));
        fx.ruler.recalculate(&NoAnnotations);
        assert_eq!(fx.ruler.base().measurements, vec![Point::new(25.0, 5.0), Point::new(25.0, 5.0)]);
    }

    #[test]
    fn test_history_segments() {
        let mut fx = fixture();
        fx.ruler
            .start_drag_with_history(fx.token, Point::new(5.0, 5.0), &[Point::new(5.0, 25.0), Point::new(5.0, 15.0)])
            .unwrap();
        fx.ruler.on_pointer_move(&PointerMove::new(Point::new(15.0, 5.0), at(&fx, 0)));

        let rays = fx.ruler.segments();
        assert_eq!(rays.len(), 3);
        assert!(rays[0].is_previous && rays[1].is_previous);
        assert!(!rays[2].is_previous);
        // History cannot be deleted; the drag aborts instead.
        fx.ruler.delete_waypoint();
        assert!(!fx.ruler.is_drag_ruler());
    }
}
