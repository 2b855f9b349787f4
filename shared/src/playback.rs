//! Simulated vehicle playback along a route.
//!
//! The engine turns wall-clock time into a progress percentage scaled by the
//! route duration and a playback speed multiplier, then places the vehicle on
//! the polyline by linear interpolation between consecutive points.
//!
//! It is driven from a single thread: user actions call [`PlaybackEngine::play`],
//! [`PlaybackEngine::pause`], [`PlaybackEngine::reset`] and
//! [`PlaybackEngine::set_speed_multiplier`], and the render loop calls
//! [`PlaybackEngine::tick`] once per frame while a frame subscription is held.
//! Nothing here returns an error: a call whose preconditions are not met leaves
//! the state untouched.

use std::sync::Arc;

use crate::{Coordinate, Route};

/// Monotonic time source in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

impl<F> Clock for F
where
    F: Fn() -> f64,
{
    fn now_ms(&self) -> f64 {
        self()
    }
}

/// Subscribes the engine to the render loop's frame cadence.
///
/// Dropping the returned handle must cancel the subscription. The engine keeps
/// the handle only while playing.
pub trait FrameScheduler {
    type Handle;

    fn schedule(&mut self) -> Self::Handle;
}

/// Receives vehicle positions and progress readouts.
pub trait RenderSink {
    fn on_frame(&mut self, lat: f64, lon: f64, heading_degrees: f64);
    fn on_progress(&mut self, percent: u8, elapsed_seconds: u64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePosition {
    pub point: Coordinate,
    /// `None` when the current segment has zero length.
    pub heading_degrees: Option<f64>,
    /// Index of the segment start point.
    pub segment: usize,
}

/// Places a point on `points` at `progress_percent` (0–100).
///
/// Returns `None` for paths with fewer than two points. Progress outside the
/// range is clamped, and a non-finite value counts as 0.
pub fn interpolate(points: &[Coordinate], progress_percent: f64) -> Option<RoutePosition> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let progress = if progress_percent.is_finite() {
        progress_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let t = (progress / 100.0) * (n - 1) as f64;
    let i = (t.floor() as usize).min(n - 2);
    let j = i + 1;
    let frac = t - i as f64;

    let (from, to) = (points[i], points[j]);
    Some(RoutePosition {
        point: from.interpolate(to, frac),
        heading_degrees: heading(from, to),
        segment: i,
    })
}

/// Direction of travel from `from` to `to` in degrees, 0 = north, 90 = east.
///
/// Computed in coordinate space, so `None` for a zero-length segment.
pub fn heading(from: Coordinate, to: Coordinate) -> Option<f64> {
    let dlat = to.lat - from.lat;
    let dlon = to.lon - from.lon;
    if dlat == 0.0 && dlon == 0.0 {
        return None;
    }
    Some(dlon.atan2(dlat).to_degrees())
}

/// `elapsed / (duration * 1000 / speed) * 100`, clamped to `[0, 100]`.
///
/// A zero duration is complete immediately.
pub fn progress_percent(elapsed_ms: f64, duration_seconds: f64, speed_multiplier: u32) -> f64 {
    let total_ms = duration_seconds * 1000.0;
    let effective_ms = total_ms / f64::from(speed_multiplier.max(1));
    if effective_ms <= 0.0 || !effective_ms.is_finite() {
        return 100.0;
    }
    let progress = elapsed_ms / effective_ms * 100.0;
    if progress.is_nan() {
        return 0.0;
    }
    progress.clamp(0.0, 100.0)
}

#[derive(Debug)]
pub struct PlaybackState<H> {
    is_playing: bool,
    progress_percent: f64,
    speed_multiplier: u32,
    elapsed_ms: f64,
    start_wall_clock: f64,
    heading_degrees: f64,
    frame: Option<H>,
}

impl<H> Default for PlaybackState<H> {
    fn default() -> Self {
        Self {
            is_playing: false,
            progress_percent: 0.0,
            speed_multiplier: 1,
            elapsed_ms: 0.0,
            start_wall_clock: 0.0,
            heading_degrees: 0.0,
            frame: None,
        }
    }
}

impl<H> PlaybackState<H> {
    /// Stops playing and drops the frame subscription.
    fn stop(&mut self) {
        self.is_playing = false;
        self.frame = None;
    }

    fn rewind(&mut self) {
        self.stop();
        self.elapsed_ms = 0.0;
        self.progress_percent = 0.0;
        self.heading_degrees = 0.0;
    }
}

/// Owns the playback state for the single active route.
///
/// `C` is the time source and `H` the frame subscription handle produced by the
/// [`FrameScheduler`] passed to [`play`](Self::play).
pub struct PlaybackEngine<C, H> {
    clock: C,
    route: Option<Arc<Route>>,
    state: PlaybackState<H>,
}

impl<C: Clock, H> PlaybackEngine<C, H> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            route: None,
            state: PlaybackState::default(),
        }
    }

    /// Installs a new route and rewinds to its first point.
    pub fn set_route(&mut self, route: impl Into<Arc<Route>>, sink: &mut impl RenderSink) {
        self.route = Some(route.into());
        self.reset(sink);
    }

    /// Drops the route. Scalar state is rewound; no frame is rendered.
    pub fn clear_route(&mut self, sink: &mut impl RenderSink) {
        self.route = None;
        self.reset(sink);
    }

    /// Starts or resumes playback from the current elapsed time.
    ///
    /// Ignored without a route, while already playing, or once the end has been
    /// reached (reset first to replay).
    pub fn play(&mut self, scheduler: &mut impl FrameScheduler<Handle = H>) {
        if self.route.is_none() || self.state.is_playing || self.is_finished() {
            return;
        }
        self.state.is_playing = true;
        self.state.start_wall_clock = self.clock.now_ms() - self.state.elapsed_ms;
        self.state.frame = Some(scheduler.schedule());
    }

    pub fn pause(&mut self) {
        self.state.stop();
    }

    pub fn reset(&mut self, sink: &mut impl RenderSink) {
        self.state.rewind();
        sink.on_progress(0, 0);
        if let Some(route) = &self.route {
            let start = route.start();
            sink.on_frame(start.lat, start.lon, 0.0);
        }
    }

    /// Multipliers below 1 are ignored. The new value applies from the next tick.
    pub fn set_speed_multiplier(&mut self, multiplier: u32) {
        if multiplier >= 1 {
            self.state.speed_multiplier = multiplier;
        }
    }

    /// Per-frame update. Frames that arrive after a pause are ignored.
    pub fn tick(&mut self, sink: &mut impl RenderSink) {
        if !self.state.is_playing {
            return;
        }
        let Some(route) = self.route.clone() else {
            return;
        };

        let now = self.clock.now_ms();
        let elapsed = now - self.state.start_wall_clock;
        if elapsed > self.state.elapsed_ms {
            self.state.elapsed_ms = elapsed;
        }

        self.state.progress_percent = progress_percent(
            self.state.elapsed_ms,
            route.duration_seconds(),
            self.state.speed_multiplier,
        );
        if self.state.progress_percent >= 100.0 {
            self.state.progress_percent = 100.0;
            self.state.stop();
        }

        sink.on_progress(self.progress_readout(), self.elapsed_seconds());

        if let Some(position) = interpolate(route.points(), self.state.progress_percent) {
            if let Some(heading) = position.heading_degrees {
                self.state.heading_degrees = heading;
            }
            sink.on_frame(
                position.point.lat,
                position.point.lon,
                self.state.heading_degrees,
            );
        }
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    /// True while a frame subscription is held.
    pub fn is_scheduled(&self) -> bool {
        self.state.frame.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.state.progress_percent >= 100.0
    }

    pub fn progress_percent(&self) -> f64 {
        self.state.progress_percent
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.state.elapsed_ms
    }

    pub fn elapsed_seconds(&self) -> u64 {
        (self.state.elapsed_ms / 1000.0).floor() as u64
    }

    pub fn speed_multiplier(&self) -> u32 {
        self.state.speed_multiplier
    }

    pub fn heading_degrees(&self) -> f64 {
        self.state.heading_degrees
    }

    fn progress_readout(&self) -> u8 {
        self.state.progress_percent.round() as u8
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<f64>>);

    impl ManualClock {
        fn set(&self, ms: f64) {
            self.0.set(ms);
        }

        fn advance(&self, ms: f64) {
            self.0.set(self.0.get() + ms);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> f64 {
            self.0.get()
        }
    }

    /// Handle that counts how many subscriptions were cancelled.
    struct FrameToken(Rc<Cell<usize>>);

    impl Drop for FrameToken {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[derive(Default)]
    struct CountingScheduler {
        scheduled: usize,
        cancelled: Rc<Cell<usize>>,
    }

    impl FrameScheduler for CountingScheduler {
        type Handle = FrameToken;

        fn schedule(&mut self) -> FrameToken {
            self.scheduled += 1;
            FrameToken(self.cancelled.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<(f64, f64, f64)>,
        progress: Vec<(u8, u64)>,
    }

    impl RenderSink for RecordingSink {
        fn on_frame(&mut self, lat: f64, lon: f64, heading_degrees: f64) {
            self.frames.push((lat, lon, heading_degrees));
        }

        fn on_progress(&mut self, percent: u8, elapsed_seconds: u64) {
            self.progress.push((percent, elapsed_seconds));
        }
    }

    type TestEngine = PlaybackEngine<ManualClock, FrameToken>;

    fn point(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    fn three_point_route() -> Route {
        Route::new(vec![point(0.0, 0.0), point(0.0, 1.0), point(0.0, 2.0)], 10.0).unwrap()
    }

    fn engine_with(route: Route) -> (TestEngine, ManualClock, CountingScheduler, RecordingSink) {
        let clock = ManualClock::default();
        let mut engine = PlaybackEngine::new(clock.clone());
        let mut sink = RecordingSink::default();
        engine.set_route(route, &mut sink);
        (engine, clock, CountingScheduler::default(), sink)
    }

    #[test]
    fn halfway_lands_on_middle_point() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        clock.set(5000.0);
        engine.tick(&mut sink);

        assert_eq!(engine.progress_percent(), 50.0);
        assert_eq!(sink.frames.last().map(|f| (f.0, f.1)), Some((0.0, 1.0)));
        assert_eq!(sink.progress.last(), Some(&(50, 5)));
    }

    #[test]
    fn double_speed_halves_effective_duration() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.set_speed_multiplier(2);
        engine.play(&mut scheduler);
        clock.set(2500.0);
        engine.tick(&mut sink);

        assert_eq!(engine.progress_percent(), 50.0);
    }

    #[test]
    fn quarter_of_two_point_route() {
        let points = [point(0.0, 0.0), point(0.0, 10.0)];
        let position = interpolate(&points, 25.0).unwrap();
        assert_eq!(position.point, point(0.0, 2.5));
        assert_eq!(position.segment, 0);
    }

    #[test]
    fn interpolation_hits_both_ends() {
        let points = [point(23.81, 90.41), point(23.79, 90.40), point(23.75, 90.38)];
        assert_eq!(interpolate(&points, 0.0).unwrap().point, points[0]);
        assert_eq!(interpolate(&points, 100.0).unwrap().point, points[2]);
        assert_eq!(interpolate(&points, 250.0).unwrap().point, points[2]);
        assert_eq!(interpolate(&points, f64::NAN).unwrap().point, points[0]);
    }

    #[test]
    fn interpolation_needs_two_points() {
        assert!(interpolate(&[], 50.0).is_none());
        assert!(interpolate(&[point(1.0, 1.0)], 50.0).is_none());
    }

    #[test]
    fn heading_follows_compass() {
        let origin = point(0.0, 0.0);
        assert_eq!(heading(origin, point(1.0, 0.0)), Some(0.0));
        assert_eq!(heading(origin, point(0.0, 1.0)), Some(90.0));
        assert_eq!(heading(origin, point(0.0, -1.0)), Some(-90.0));
        assert_eq!(heading(origin, origin), None);
    }

    #[test]
    fn play_without_route_is_ignored() {
        let mut engine: TestEngine = PlaybackEngine::new(ManualClock::default());
        let mut scheduler = CountingScheduler::default();
        engine.play(&mut scheduler);

        assert!(!engine.is_playing());
        assert!(!engine.is_scheduled());
        assert_eq!(scheduler.scheduled, 0);
        assert_eq!(engine.elapsed_ms(), 0.0);
    }

    #[test]
    fn play_twice_schedules_once() {
        let (mut engine, _clock, mut scheduler, _sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        engine.play(&mut scheduler);
        assert_eq!(scheduler.scheduled, 1);
        assert_eq!(scheduler.cancelled.get(), 0);
    }

    #[test]
    fn pause_and_resume_keep_elapsed_time() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        clock.set(1000.0);
        engine.play(&mut scheduler);
        clock.advance(3000.0);
        engine.tick(&mut sink);
        let before_pause = engine.elapsed_ms();
        assert_eq!(before_pause, 3000.0);

        engine.pause();
        clock.advance(60_000.0);
        engine.play(&mut scheduler);
        assert_eq!(engine.elapsed_ms(), before_pause);

        engine.tick(&mut sink);
        assert_eq!(engine.elapsed_ms(), before_pause);
        assert_eq!(engine.progress_percent(), 30.0);
    }

    #[test]
    fn pause_cancels_frames_and_is_idempotent() {
        let (mut engine, _clock, mut scheduler, _sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        assert!(engine.is_scheduled());

        engine.pause();
        engine.pause();
        assert!(!engine.is_playing());
        assert!(!engine.is_scheduled());
        assert_eq!(scheduler.cancelled.get(), 1);
    }

    #[test]
    fn stray_frame_after_pause_renders_nothing() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        clock.set(2000.0);
        engine.tick(&mut sink);
        engine.pause();
        let frames = sink.frames.len();

        clock.set(4000.0);
        engine.tick(&mut sink);
        assert_eq!(sink.frames.len(), frames);
        assert_eq!(engine.elapsed_ms(), 2000.0);
    }

    #[test]
    fn reaching_the_end_stops_playback() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        clock.set(12_000.0);
        engine.tick(&mut sink);

        assert_eq!(engine.progress_percent(), 100.0);
        assert!(engine.is_finished());
        assert!(!engine.is_playing());
        assert_eq!(scheduler.cancelled.get(), 1);
        assert_eq!(sink.frames.last().map(|f| (f.0, f.1)), Some((0.0, 2.0)));
        assert_eq!(sink.progress.last(), Some(&(100, 12)));

        engine.play(&mut scheduler);
        assert!(!engine.is_playing());
        assert_eq!(scheduler.scheduled, 1);
    }

    #[test]
    fn reset_rewinds_from_any_state() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        clock.set(7000.0);
        engine.tick(&mut sink);

        engine.reset(&mut sink);
        assert!(!engine.is_playing());
        assert!(!engine.is_scheduled());
        assert_eq!(engine.progress_percent(), 0.0);
        assert_eq!(engine.elapsed_ms(), 0.0);
        assert_eq!(sink.frames.last(), Some(&(0.0, 0.0, 0.0)));
        assert_eq!(sink.progress.last(), Some(&(0, 0)));

        engine.play(&mut scheduler);
        assert!(engine.is_playing());
    }

    #[test]
    fn reset_without_route_skips_render() {
        let mut engine: TestEngine = PlaybackEngine::new(ManualClock::default());
        let mut sink = RecordingSink::default();
        engine.reset(&mut sink);
        assert!(sink.frames.is_empty());
        assert_eq!(sink.progress, vec![(0, 0)]);
    }

    #[test]
    fn degenerate_segment_keeps_previous_heading() {
        let route = Route::new(
            vec![point(0.0, 0.0), point(0.0, 1.0), point(0.0, 1.0), point(1.0, 1.0)],
            30.0,
        )
        .unwrap();
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(route);
        engine.play(&mut scheduler);

        clock.set(5000.0);
        engine.tick(&mut sink);
        assert_eq!(engine.heading_degrees(), 90.0);

        clock.set(15_000.0);
        engine.tick(&mut sink);
        assert_eq!(engine.heading_degrees(), 90.0);
        assert_eq!(sink.frames.last().map(|f| f.2), Some(90.0));

        clock.set(25_000.0);
        engine.tick(&mut sink);
        assert_eq!(engine.heading_degrees(), 0.0);
    }

    #[test]
    fn speed_change_while_paused_waits_for_resume() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        clock.set(2000.0);
        engine.tick(&mut sink);
        engine.pause();

        engine.set_speed_multiplier(4);
        engine.tick(&mut sink);
        assert_eq!(engine.progress_percent(), 20.0);
        assert_eq!(engine.speed_multiplier(), 4);

        engine.play(&mut scheduler);
        engine.tick(&mut sink);
        assert_eq!(engine.progress_percent(), 80.0);
    }

    #[test]
    fn speed_change_while_playing_applies_on_next_tick() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.play(&mut scheduler);
        clock.set(2000.0);
        engine.tick(&mut sink);
        assert_eq!(engine.progress_percent(), 20.0);

        engine.set_speed_multiplier(2);
        assert_eq!(engine.elapsed_ms(), 2000.0);
        assert_eq!(engine.progress_percent(), 20.0);
        assert!(engine.is_playing());

        engine.tick(&mut sink);
        assert_eq!(engine.progress_percent(), 40.0);
        assert_eq!(engine.elapsed_ms(), 2000.0);

        clock.set(3000.0);
        engine.tick(&mut sink);
        assert_eq!(engine.progress_percent(), 60.0);
        assert_eq!(sink.progress.last(), Some(&(60, 3)));
        assert_eq!(scheduler.scheduled, 1);
    }

    #[test]
    fn zero_speed_multiplier_is_ignored() {
        let (mut engine, _clock, _scheduler, _sink) = engine_with(three_point_route());
        engine.set_speed_multiplier(3);
        engine.set_speed_multiplier(0);
        assert_eq!(engine.speed_multiplier(), 3);
    }

    #[test]
    fn zero_duration_finishes_on_first_frame() {
        let route = Route::new(vec![point(0.0, 0.0), point(1.0, 1.0)], 0.0).unwrap();
        let (mut engine, _clock, mut scheduler, mut sink) = engine_with(route);
        engine.play(&mut scheduler);
        engine.tick(&mut sink);
        assert!(engine.is_finished());
        assert_eq!(sink.frames.last().map(|f| (f.0, f.1)), Some((1.0, 1.0)));
    }

    #[test]
    fn new_route_rewinds_playback() {
        let (mut engine, clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.set_speed_multiplier(5);
        engine.play(&mut scheduler);
        clock.set(1000.0);
        engine.tick(&mut sink);

        let replacement = Route::new(vec![point(5.0, 5.0), point(6.0, 6.0)], 20.0).unwrap();
        engine.set_route(replacement, &mut sink);
        assert!(!engine.is_playing());
        assert_eq!(engine.elapsed_ms(), 0.0);
        assert_eq!(engine.speed_multiplier(), 5);
        assert_eq!(sink.frames.last(), Some(&(5.0, 5.0, 0.0)));
    }

    #[test]
    fn clearing_route_blocks_play() {
        let (mut engine, _clock, mut scheduler, mut sink) = engine_with(three_point_route());
        engine.clear_route(&mut sink);
        engine.play(&mut scheduler);
        assert!(engine.route().is_none());
        assert!(!engine.is_playing());
    }

    #[test]
    fn closures_are_clocks() {
        let clock = || 42.0;
        assert_eq!(clock.now_ms(), 42.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn path() -> impl Strategy<Value = Vec<Coordinate>> {
            prop::collection::vec(
                (-90.0..=90.0, -180.0..=180.0).prop_map(|(lat, lon)| Coordinate { lat, lon }),
                2..32,
            )
        }

        proptest! {
            #[test]
            fn prop_progress_rises_to_exactly_100(
                speed in 1u32..=32,
                duration in 0.5f64..20_000.0,
                steps in 1usize..64,
            ) {
                let (mut engine, clock, mut scheduler, mut sink) = engine_with(
                    Route::new(vec![point(0.0, 0.0), point(1.0, 1.0)], duration).unwrap(),
                );
                engine.set_speed_multiplier(speed);
                engine.play(&mut scheduler);

                let target = duration * 1000.0 / f64::from(speed);
                let mut previous = 0.0;
                for step in 1..steps {
                    clock.set(target * step as f64 / steps as f64);
                    engine.tick(&mut sink);
                    let progress = engine.progress_percent();
                    prop_assert!(progress >= previous);
                    prop_assert!(progress <= 100.0);
                    previous = progress;
                }
                clock.set(target);
                engine.tick(&mut sink);
                prop_assert_eq!(engine.progress_percent(), 100.0);
                prop_assert!(!engine.is_playing());
            }

            #[test]
            fn prop_endpoints_are_exact(points in path()) {
                let first = interpolate(&points, 0.0).unwrap();
                let last = interpolate(&points, 100.0).unwrap();
                prop_assert_eq!(first.point, points[0]);
                prop_assert_eq!(last.point, points[points.len() - 1]);
            }

            #[test]
            fn prop_segment_index_never_goes_back(
                points in path(),
                mut progresses in prop::collection::vec(0.0f64..=100.0, 1..64),
            ) {
                progresses.sort_by(|a, b| a.total_cmp(b));
                let mut last_segment = 0;
                for progress in progresses {
                    let position = interpolate(&points, progress).unwrap();
                    prop_assert!(position.segment >= last_segment);
                    prop_assert!(position.segment <= points.len() - 2);
                    last_segment = position.segment;
                }
            }
        }
    }
}
