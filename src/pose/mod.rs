pub mod landmark;
pub mod source;

pub use landmark::{format_landmark, Landmark, LandmarkFrame, LandmarkIndex};
pub use source::{FrameGate, LandmarkSource, ReplaySource};
