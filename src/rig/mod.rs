pub mod asset;
pub mod compositor;
pub mod engine;
pub mod mapping;
pub mod rest;
pub mod retarget;
pub mod segment;
pub mod skeleton;
pub mod solver;
pub mod transform;

pub use asset::{
    spawn_asset_load, AssetEvent, AssetLoader, AssetRest, BoundAsset, JsonMeshLoader,
    MeshHierarchy, SubMesh,
};
pub use compositor::rig_transform;
pub use engine::{AssetFrame, FrameOutput, RenderMode, RigEngine, TickStatus};
pub use mapping::{
    effective_mapping, AxisChoice, EffectiveMapping, MappingRow, MappingTable, SegmentOverride,
};
pub use rest::{RestPoseController, RestState};
pub use retarget::{SegmentMarker, SegmentPose};
pub use segment::{AssetSlot, AssetSlots, SegmentDef, SegmentRest, SEGMENTS};
pub use skeleton::{BonePose, JointMarker, SkeletonFrame, BONE_PAIRS};
pub use solver::{ConstraintTable, RotationSolver, RotationStrategy};
pub use transform::{Aabb, Transform};
