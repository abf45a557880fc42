//! Capabilities the engine consumes from the outside world.
//!
//! The engine never captures the screen or moves the pointer itself. It sees
//! the game through [`Vision`], acts through [`Input`], leaves through
//! [`Navigator`] and measures time through [`Clock`]. Every query here is a
//! single attempt; retry budgets live in the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A screen coordinate in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// This point shifted by `offset`.
    pub const fn offset(self, offset: Offset) -> Self {
        Self {
            x: self.x + offset.dx,
            y: self.y + offset.dy,
        }
    }
}

/// A displacement relative to an anchor point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Offset {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

/// Template-matching perception.
///
/// Element names are template identifiers such as `"attack"` or
/// `"exp_gained"`. A miss is a normal answer, not a fault.
pub trait Vision {
    /// Locate a button on screen.
    fn find_button(&mut self, name: &str) -> Option<Point>;

    /// Whether the screen identified by `name` is currently shown.
    fn confirm_screen(&mut self, name: &str) -> bool;

    /// Wait until `name` is gone, up to `timeout`. Returns `false` if it is
    /// still visible when the timeout expires.
    fn wait_vanish(&mut self, name: &str, timeout: Duration) -> bool;

    /// Every match of `name`, top to bottom.
    fn find_all(&mut self, name: &str) -> Vec<Point>;
}

/// Pointer input. `label` names what is being clicked, for logs and
/// simulation only.
pub trait Input {
    fn click(&mut self, at: Point, label: &str);

    fn double_click(&mut self, at: Point, label: &str);

    /// Scroll the page with the pointer at `at`. Negative amounts scroll down.
    fn scroll(&mut self, at: Point, amount: i32);
}

/// Pre- and post-combat navigation owned by the surrounding application.
pub trait Navigator {
    /// Leave the battle for the home screen without retreating.
    fn go_back_home(&mut self);
}

/// Monotonic time source. Real surfaces sleep; simulated ones advance a
/// virtual clock.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// Everything the engine needs from the game session.
pub trait Surface: Vision + Input + Navigator + Clock {}

impl<T> Surface for T where T: Vision + Input + Navigator + Clock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_offset_point() {
        let anchor = Point::new(800, 600);
        assert_eq!(anchor.offset(Offset::new(-317, 123)), Point::new(483, 723));
    }

    #[test]
    fn test_should_deserialize_point_from_yaml() {
        let point: Point = serde_yaml::from_str("{ x: 10, y: -4 }").expect("should parse point");
        assert_eq!(point, Point::new(10, -4));
    }
}
