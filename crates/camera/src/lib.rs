pub mod jpeg;
mod pattern;
mod still;
mod v4l2;

pub use pattern::PatternSource;
pub use still::{FrameSource, Still};
pub use v4l2::V4l2Source;
