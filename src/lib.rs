pub mod config;
pub mod control;
pub mod pose;
#[cfg(feature = "viewer")]
pub mod render;
pub mod rig;
pub mod tracker;
