pub mod skeleton;
pub mod window;

pub use skeleton::Projection;
pub use window::MinifbRenderer;
