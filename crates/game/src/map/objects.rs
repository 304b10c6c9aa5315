use glam::Vec2;
use serde::{Deserialize, Serialize};

/// One-way platform: solid only from above, entities pass through from
/// below and from the sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub left: f32,
    pub right: f32,
    pub top: f32,
}

impl Platform {
    pub fn new(left: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            right: left.max(right),
            top,
        }
    }

    pub fn spans(&self, x: f32) -> bool {
        x >= self.left && x <= self.right
    }

    /// Whether a body moving from `prev_y` to `next_y` at horizontal `x`
    /// crossed this platform's top surface on the way down.
    pub fn crossed_from_above(&self, x: f32, prev_y: f32, next_y: f32) -> bool {
        self.spans(x) && prev_y >= self.top && next_y <= self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldBounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub bounds: WorldBounds,
    pub platforms: Vec<Platform>,
}

impl Level {
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            platforms: Vec::new(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platforms.push(platform);
        self
    }

    /// The highest platform crossed during a downward move, if any. Picking
    /// the highest keeps fast falls from landing on a lower platform after
    /// skipping a thin upper one.
    pub fn landing_surface(&self, x: f32, prev_y: f32, next_y: f32) -> Option<&Platform> {
        self.platforms
            .iter()
            .filter(|p| p.crossed_from_above(x, prev_y, next_y))
            .max_by(|a, b| a.top.total_cmp(&b.top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landing_prefers_highest_crossed_platform() {
        let level = Level::new(WorldBounds::new(Vec2::splat(-100.0), Vec2::splat(100.0)))
            .with_platform(Platform::new(-5.0, 5.0, 0.0))
            .with_platform(Platform::new(-5.0, 5.0, 2.0));

        let surface = level.landing_surface(0.0, 10.0, -1.0).unwrap();
        assert_eq!(surface.top, 2.0);
        assert!(level.landing_surface(8.0, 10.0, -1.0).is_none());
    }

    #[test]
    fn platform_ignores_upward_motion() {
        let platform = Platform::new(0.0, 4.0, 1.0);
        assert!(!platform.crossed_from_above(2.0, 0.5, 1.5));
        assert!(platform.crossed_from_above(2.0, 1.0, 0.9));
    }
}
