//! Swipe gesture normalization for touch devices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ScriptError, ScriptResult};

const DEFAULT_SWIPE_DURATION_MS: u64 = 300;
/// Repeat count used when a script asks for an unbounded swipe (`repeat: 0`).
const UNBOUNDED_SWIPE_REPEAT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

impl ScreenSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Read a point from a resolved target: `{center: [x, y]}`, `{x, y}` or `[x, y]`.
    pub fn from_value(value: &Value) -> Option<Self> {
        fn pair(v: &Value) -> Option<Point> {
            let arr = v.as_array()?;
            match arr.as_slice() {
                [x, y] => Some(Point::new(x.as_f64()?, y.as_f64()?)),
                _ => None,
            }
        }

        if let Some(center) = value.get("center") {
            return pair(center);
        }
        if let (Some(x), Some(y)) = (value.get("x"), value.get("y")) {
            return Some(Point::new(x.as_f64()?, y.as_f64()?));
        }
        pair(value)
    }

    fn clamp_to(self, screen: ScreenSize) -> Self {
        Self {
            x: self.x.clamp(0.0, screen.width),
            y: self.y.clamp(0.0, screen.height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Swipe request with start/end already resolved to screen points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwipeGesture {
    pub start: Option<Point>,
    pub end: Option<Point>,
    pub direction: Option<SwipeDirection>,
    pub distance: Option<f64>,
    pub duration: Option<u64>,
    pub repeat: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSwipe {
    pub start_point: Point,
    pub end_point: Point,
    pub duration: u64,
    pub repeat_count: u32,
}

/// Compute concrete pixel coordinates for a swipe.
///
/// The start defaults to the screen center. The end is taken from `end`, or derived from
/// `distance` along `direction`, and is clamped to the screen.
pub fn normalize_mobile_swipe_param(
    gesture: &SwipeGesture,
    screen: ScreenSize,
) -> ScriptResult<NormalizedSwipe> {
    let start_point = gesture.start.unwrap_or_else(|| screen.center());

    let end_point = match (gesture.end, gesture.distance) {
        (Some(end), _) => end,
        (None, Some(distance)) => {
            let direction = gesture.direction.ok_or_else(|| {
                ScriptError::InvalidSwipe(
                    "direction is required when distance is given".to_string(),
                )
            })?;
            let (dx, dy) = match direction {
                SwipeDirection::Up => (0.0, -distance),
                SwipeDirection::Down => (0.0, distance),
                SwipeDirection::Left => (-distance, 0.0),
                SwipeDirection::Right => (distance, 0.0),
            };
            Point::new(start_point.x + dx, start_point.y + dy)
        }
        (None, None) => {
            return Err(ScriptError::InvalidSwipe(
                "either end or distance must be given".to_string(),
            ))
        }
    }
    .clamp_to(screen);

    let repeat_count = match gesture.repeat {
        Some(0) => UNBOUNDED_SWIPE_REPEAT,
        Some(n) => n,
        None => 1,
    };

    Ok(NormalizedSwipe {
        start_point,
        end_point,
        duration: gesture.duration.unwrap_or(DEFAULT_SWIPE_DURATION_MS),
        repeat_count,
    })
}
