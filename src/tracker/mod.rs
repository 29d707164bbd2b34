pub mod joints;
pub mod normalize;
pub mod smooth;

pub use joints::{JointStore, JOINT_COUNT};
pub use normalize::Normalizer;
pub use smooth::JointFilter;
