mod objects;
mod testing_ground;

pub use objects::{Level, Platform, WorldBounds};
pub use testing_ground::TestingGround;
