use glam::Vec2;

use super::{Level, Platform, WorldBounds};

/// Built-in arena shared by the client predictor and the reference server.
pub struct TestingGround;

impl TestingGround {
    const HALF_WIDTH: f32 = 400.0;
    const CEILING: f32 = 300.0;
    const GROUND_Y: f32 = 0.0;

    pub fn level() -> Level {
        let bounds = WorldBounds::new(
            Vec2::new(-Self::HALF_WIDTH, Self::GROUND_Y - 50.0),
            Vec2::new(Self::HALF_WIDTH, Self::CEILING),
        );

        let mut level = Level::new(bounds).with_platform(Platform::new(
            -Self::HALF_WIDTH,
            Self::HALF_WIDTH,
            Self::GROUND_Y,
        ));

        Self::add_stair_platforms(&mut level);
        Self::add_floating_platforms(&mut level);

        level
    }

    fn add_stair_platforms(level: &mut Level) {
        for step in 0..4 {
            let left = 60.0 + step as f32 * 30.0;
            level
                .platforms
                .push(Platform::new(left, left + 30.0, 8.0 * (step + 1) as f32));
        }
    }

    fn add_floating_platforms(level: &mut Level) {
        level.platforms.push(Platform::new(-120.0, -60.0, 40.0));
        level.platforms.push(Platform::new(-40.0, 40.0, 70.0));
        level.platforms.push(Platform::new(-200.0, -160.0, 25.0));
    }
}
