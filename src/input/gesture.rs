//! 指针手势识别
//!
//! Per-pointer state machine turning down/move/up sequences into taps,
//! double taps and swipes:
//! - mouse releases are always taps
//! - a press is a tap when it was short and barely moved, or held past the
//!   max tap duration
//! - otherwise a long enough displacement is a swipe along its dominant axis
//!
//! Two taps within the double-tap window form a double tap when they hit the
//! same tile or land within the pixel tolerance of each other.

use std::collections::HashMap;
use std::time::Duration;

use dungeon::{Direction, Position};
use tokio::time::Instant;

use crate::config::InputConfig;

pub type PointerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
    Pen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub id: PointerId,
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
    pub at: Instant,
}

impl PointerEvent {
    pub fn new(id: PointerId, kind: PointerKind, x: f32, y: f32) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            at: Instant::now(),
        }
    }

    pub fn at(mut self, at: Instant) -> Self {
        self.at = at;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub x: f32,
    pub y: f32,
    pub tile: Option<Position>,
    pub kind: PointerKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Tap(Tap),
    DoubleTap(Tap),
    Swipe(Direction),
}

/// The pointer moved onto a different tile while pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCrossing {
    pub from: Option<Position>,
    pub to: Position,
}

/// Raw classification of a finished press, before double-tap pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Tap,
    Swipe(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureThresholds {
    pub tap_max_duration: Duration,
    pub tap_max_distance: f32,
    pub swipe_min_distance: f32,
    pub double_tap_window: Duration,
    pub double_tap_tolerance: f32,
}

impl From<&InputConfig> for GestureThresholds {
    fn from(config: &InputConfig) -> Self {
        Self {
            tap_max_duration: config.tap_max_duration(),
            tap_max_distance: config.tap_max_distance,
            swipe_min_distance: config.swipe_min_distance,
            double_tap_window: config.double_tap_window(),
            double_tap_tolerance: config.double_tap_tolerance,
        }
    }
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self::from(&InputConfig::default())
    }
}

/// Classify one press. `None` means a quick press that moved too far for a
/// tap but not far enough for a swipe.
pub fn classify(
    kind: PointerKind,
    dx: f32,
    dy: f32,
    duration: Duration,
    thresholds: &GestureThresholds,
) -> Option<PressKind> {
    if kind == PointerKind::Mouse {
        return Some(PressKind::Tap);
    }
    let distance = (dx * dx + dy * dy).sqrt();
    let held = duration > thresholds.tap_max_duration;
    if held || distance <= thresholds.tap_max_distance {
        return Some(PressKind::Tap);
    }
    if distance >= thresholds.swipe_min_distance {
        return Some(PressKind::Swipe(swipe_direction(dx, dy)));
    }
    None
}

/// Dominant axis wins; screen y grows downward.
pub fn swipe_direction(dx: f32, dy: f32) -> Direction {
    if dx.abs() > dy.abs() {
        if dx > 0.0 { Direction::Right } else { Direction::Left }
    } else if dy > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

#[derive(Debug, Clone)]
struct PointerTrack {
    kind: PointerKind,
    origin: (f32, f32),
    started: Instant,
    initial_tile: Option<Position>,
    last_tile: Option<Position>,
    menu_opened: bool,
}

#[derive(Debug, Clone, Copy)]
struct LastTap {
    at: Instant,
    x: f32,
    y: f32,
    tile: Option<Position>,
}

#[derive(Debug, Default)]
pub struct GestureDetector {
    thresholds: GestureThresholds,
    pointers: HashMap<PointerId, PointerTrack>,
    last_tap: Option<LastTap>,
}

impl GestureDetector {
    pub fn new(thresholds: GestureThresholds) -> Self {
        Self {
            thresholds,
            pointers: HashMap::new(),
            last_tap: None,
        }
    }

    pub fn thresholds(&self) -> &GestureThresholds {
        &self.thresholds
    }

    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_tracking(&self, id: PointerId) -> bool {
        self.pointers.contains_key(&id)
    }

    pub fn pointer_down(&mut self, event: &PointerEvent, tile: Option<Position>) {
        self.pointers.insert(
            event.id,
            PointerTrack {
                kind: event.kind,
                origin: (event.x, event.y),
                started: event.at,
                initial_tile: tile,
                last_tile: tile,
                menu_opened: false,
            },
        );
    }

    /// Reports when the pressed pointer enters a new tile.
    pub fn pointer_move(
        &mut self,
        event: &PointerEvent,
        tile: Option<Position>,
    ) -> Option<TileCrossing> {
        let track = self.pointers.get_mut(&event.id)?;
        let to = tile?;
        if track.last_tile == Some(to) {
            return None;
        }
        let from = track.last_tile.replace(to);
        Some(TileCrossing { from, to })
    }

    /// The tile where the pointer went down.
    pub fn initial_tile(&self, id: PointerId) -> Option<Position> {
        self.pointers.get(&id).and_then(|track| track.initial_tile)
    }

    pub fn pointer_kind(&self, id: PointerId) -> Option<PointerKind> {
        self.pointers.get(&id).map(|track| track.kind)
    }

    /// Record that this pointer opened the radial menu. Returns `false` if it
    /// already had, or is unknown.
    pub fn mark_menu_opened(&mut self, id: PointerId) -> bool {
        match self.pointers.get_mut(&id) {
            Some(track) if !track.menu_opened => {
                track.menu_opened = true;
                true
            }
            _ => false,
        }
    }

    pub fn menu_opened(&self, id: PointerId) -> bool {
        self.pointers.get(&id).is_some_and(|track| track.menu_opened)
    }

    /// 指针抬起，返回识别出的手势
    pub fn pointer_up(&mut self, event: &PointerEvent, tile: Option<Position>) -> Option<Gesture> {
        let track = self.pointers.remove(&event.id)?;
        if track.menu_opened {
            // the press already opened the menu, swallow the tap
            self.last_tap = None;
            return None;
        }

        let dx = event.x - track.origin.0;
        let dy = event.y - track.origin.1;
        let duration = event.at.saturating_duration_since(track.started);
        match classify(track.kind, dx, dy, duration, &self.thresholds)? {
            PressKind::Swipe(direction) => {
                self.last_tap = None;
                Some(Gesture::Swipe(direction))
            }
            PressKind::Tap => {
                let tap = Tap {
                    x: event.x,
                    y: event.y,
                    tile: tile.or(track.initial_tile),
                    kind: track.kind,
                };
                Some(self.pair_tap(tap, event.at))
            }
        }
    }

    pub fn pointer_cancel(&mut self, id: PointerId) -> bool {
        self.pointers.remove(&id).is_some()
    }

    fn pair_tap(&mut self, tap: Tap, at: Instant) -> Gesture {
        if let Some(previous) = self.last_tap.take() {
            let within_window =
                at.saturating_duration_since(previous.at) <= self.thresholds.double_tap_window;
            let same_tile = previous.tile.is_some() && previous.tile == tap.tile;
            let distance = ((tap.x - previous.x).powi(2) + (tap.y - previous.y).powi(2)).sqrt();
            if within_window && (same_tile || distance <= self.thresholds.double_tap_tolerance) {
                return Gesture::DoubleTap(tap);
            }
        }
        self.last_tap = Some(LastTap {
            at,
            x: tap.x,
            y: tap.y,
            tile: tap.tile,
        });
        Gesture::Tap(tap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(x: f32, y: f32, at: Instant) -> PointerEvent {
        PointerEvent::new(1, PointerKind::Touch, x, y).at(at)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn horizontal_drag_is_a_right_swipe() {
        let t = GestureThresholds::default();
        assert_eq!(
            classify(PointerKind::Touch, 50.0, 10.0, ms(100), &t),
            Some(PressKind::Swipe(Direction::Right))
        );
        assert_eq!(
            classify(PointerKind::Pen, -5.0, -40.0, ms(100), &t),
            Some(PressKind::Swipe(Direction::Up))
        );
    }

    #[test]
    fn mouse_is_always_a_tap() {
        let t = GestureThresholds::default();
        assert_eq!(
            classify(PointerKind::Mouse, 200.0, 0.0, ms(50), &t),
            Some(PressKind::Tap)
        );
    }

    #[test]
    fn long_presses_are_taps_and_mid_drags_are_nothing() {
        let t = GestureThresholds::default();
        assert_eq!(
            classify(PointerKind::Touch, 60.0, 0.0, ms(900), &t),
            Some(PressKind::Tap)
        );
        assert_eq!(classify(PointerKind::Touch, 20.0, 0.0, ms(100), &t), None);
    }

    #[test]
    fn still_presses_past_the_tap_duration_are_taps() {
        let t = GestureThresholds::default();
        assert_eq!(
            classify(PointerKind::Touch, 0.0, 0.0, ms(300), &t),
            Some(PressKind::Tap)
        );
        assert_eq!(
            classify(PointerKind::Pen, 4.0, 3.0, ms(251), &t),
            Some(PressKind::Tap)
        );

        let start = Instant::now();
        let mut detector = GestureDetector::default();
        let tile = Some(Position::new(2, 2));
        detector.pointer_down(&touch(25.0, 25.0, start), tile);
        let held = detector.pointer_up(&touch(25.0, 25.0, start + ms(300)), tile);
        assert!(matches!(held, Some(Gesture::Tap(Tap { tile: Some(_), .. }))));
    }

    #[test]
    fn nearby_taps_on_neighbouring_tiles_pair_up() {
        let start = Instant::now();
        let mut detector = GestureDetector::default();

        // 15px apart across a tile border, inside the 20px tolerance
        detector.pointer_down(&touch(95.0, 50.0, start), Some(Position::new(9, 5)));
        let first = detector.pointer_up(&touch(95.0, 50.0, start + ms(40)), Some(Position::new(9, 5)));
        assert!(matches!(first, Some(Gesture::Tap(_))));

        detector.pointer_down(&touch(110.0, 50.0, start + ms(150)), Some(Position::new(11, 5)));
        let second =
            detector.pointer_up(&touch(110.0, 50.0, start + ms(190)), Some(Position::new(11, 5)));
        let Some(Gesture::DoubleTap(tap)) = second else {
            panic!("expected a double tap, got {second:?}");
        };
        assert_eq!(tap.tile, Some(Position::new(11, 5)));

        // the same spacing past the tolerance stays single
        detector.pointer_down(&touch(150.0, 50.0, start + ms(400)), Some(Position::new(15, 5)));
        detector.pointer_up(&touch(150.0, 50.0, start + ms(420)), Some(Position::new(15, 5)));
        detector.pointer_down(&touch(175.0, 50.0, start + ms(500)), Some(Position::new(17, 5)));
        let apart =
            detector.pointer_up(&touch(175.0, 50.0, start + ms(520)), Some(Position::new(17, 5)));
        assert!(matches!(apart, Some(Gesture::Tap(_))));
    }

    #[test]
    fn two_quick_taps_on_one_tile_pair_up() {
        let start = Instant::now();
        let mut detector = GestureDetector::default();
        let tile = Some(Position::new(3, 3));

        detector.pointer_down(&touch(100.0, 100.0, start), tile);
        let first = detector.pointer_up(&touch(101.0, 100.0, start + ms(80)), tile);
        assert!(matches!(first, Some(Gesture::Tap(_))));

        detector.pointer_down(&touch(130.0, 100.0, start + ms(200)), tile);
        let second = detector.pointer_up(&touch(130.0, 100.0, start + ms(260)), tile);
        assert!(matches!(second, Some(Gesture::DoubleTap(_))));

        // a third tap starts a fresh pair
        detector.pointer_down(&touch(130.0, 100.0, start + ms(300)), tile);
        let third = detector.pointer_up(&touch(130.0, 100.0, start + ms(340)), tile);
        assert!(matches!(third, Some(Gesture::Tap(_))));
    }

    #[test]
    fn slow_or_distant_taps_stay_single() {
        let start = Instant::now();
        let mut detector = GestureDetector::default();
        detector.pointer_down(&touch(10.0, 10.0, start), Some(Position::new(0, 0)));
        detector.pointer_up(&touch(10.0, 10.0, start + ms(50)), Some(Position::new(0, 0)));

        detector.pointer_down(&touch(200.0, 10.0, start + ms(100)), Some(Position::new(9, 0)));
        let far = detector.pointer_up(&touch(200.0, 10.0, start + ms(150)), Some(Position::new(9, 0)));
        assert!(matches!(far, Some(Gesture::Tap(_))));

        detector.pointer_down(&touch(200.0, 10.0, start + ms(600)), Some(Position::new(9, 0)));
        let late = detector.pointer_up(&touch(200.0, 10.0, start + ms(650)), Some(Position::new(9, 0)));
        assert!(matches!(late, Some(Gesture::Tap(_))));
    }

    #[test]
    fn tile_crossings_are_reported_once() {
        let start = Instant::now();
        let mut detector = GestureDetector::default();
        detector.pointer_down(&touch(0.0, 0.0, start), Some(Position::new(0, 0)));
        assert_eq!(
            detector.pointer_move(&touch(5.0, 0.0, start), Some(Position::new(0, 0))),
            None
        );
        assert_eq!(
            detector.pointer_move(&touch(20.0, 0.0, start), Some(Position::new(1, 0))),
            Some(TileCrossing {
                from: Some(Position::new(0, 0)),
                to: Position::new(1, 0)
            })
        );
        assert_eq!(detector.pointer_move(&touch(40.0, 0.0, start), None), None);
    }

    #[test]
    fn menu_press_swallows_the_tap() {
        let start = Instant::now();
        let mut detector = GestureDetector::default();
        detector.pointer_down(&touch(0.0, 0.0, start), Some(Position::new(2, 2)));
        assert!(detector.mark_menu_opened(1));
        assert!(!detector.mark_menu_opened(1));
        assert_eq!(detector.pointer_up(&touch(0.0, 0.0, start + ms(50)), None), None);
        assert_eq!(detector.active_pointers(), 0);
    }

    #[test]
    fn unknown_pointers_are_ignored() {
        let mut detector = GestureDetector::default();
        assert_eq!(detector.pointer_up(&touch(0.0, 0.0, Instant::now()), None), None);
        assert!(!detector.pointer_cancel(7));
    }
}
