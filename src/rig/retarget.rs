//! Segment retargeting.
//!
//! Each rigid mesh segment is rotated so its authored natural axis follows the
//! bone between its two mapped joints and is placed at the bone midpoint. The
//! authored scale is never touched. Whenever the pose cannot drive a segment it
//! falls back to the exact rest transform captured at load time.

use nalgebra::Vector3;
use serde::Serialize;

use crate::tracker::JointStore;

use super::asset::BoundAsset;
use super::mapping::{EffectiveMapping, MappingTable};
use super::segment::{SegmentDef, SegmentRest};
use super::solver::{bone_direction, RotationSolver};
use super::transform::Transform;

/// これ未満の距離の 2 関節は同一点とみなす
pub const COINCIDENT_LENGTH: f32 = 1e-4;

/// セグメント原点の確認用マーカー
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentMarker {
    /// 親のスケールを打ち消すスケール
    pub scale: Vector3<f32>,
    pub visible: bool,
}

impl SegmentMarker {
    pub fn for_scale(scale: &Vector3<f32>, segment_visible: bool, enabled: bool) -> Self {
        let inverse = scale.map(|s| if s.abs() > f32::EPSILON { 1.0 / s } else { 1.0 });
        Self {
            scale: inverse,
            visible: segment_visible && enabled,
        }
    }
}

/// セグメントの 1 フレーム分の結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentPose {
    pub transform: Transform,
    /// ポーズで駆動された（レストではない）
    pub tracked: bool,
    pub visible: bool,
    pub marker: SegmentMarker,
}

impl SegmentPose {
    /// レスト変換そのまま
    pub fn rest(rest: &SegmentRest, visible: bool, markers: bool) -> Self {
        Self {
            transform: rest.transform,
            tracked: false,
            visible,
            marker: SegmentMarker::for_scale(&rest.transform.scale, visible, markers),
        }
    }
}

/// 1 セグメントをリターゲット
pub fn retarget_segment(
    def: &SegmentDef,
    mapping: &EffectiveMapping,
    rest: &SegmentRest,
    solver: &RotationSolver,
    joints: &JointStore,
    markers: bool,
) -> SegmentPose {
    if !def.animated {
        return SegmentPose::rest(rest, true, markers);
    }

    let (start, end) = match (
        joints.visible_position(mapping.start),
        joints.visible_position(mapping.end),
    ) {
        (Some(s), Some(e)) => (s, e),
        _ => return SegmentPose::rest(rest, false, markers),
    };

    let q0 = rest.transform.rotation;
    let scale = rest.transform.scale;

    let Some((direction, length)) = bone_direction(start, end, COINCIDENT_LENGTH) else {
        // 単一ランドマーク追従: 位置のみ
        return SegmentPose {
            transform: Transform::new(*start, q0, scale),
            tracked: true,
            visible: true,
            marker: SegmentMarker::for_scale(&scale, true, markers),
        };
    };

    let axis = mapping.axis.unwrap_or(rest.axis);
    let natural = rest.natural_axis(&axis);
    let alignment = solver.align_axis(mapping.start, mapping.end, &natural, &direction, joints);
    let position = start + direction.into_inner() * (length * 0.5);

    SegmentPose {
        transform: Transform::new(position, alignment * q0, scale),
        tracked: true,
        visible: true,
        marker: SegmentMarker::for_scale(&scale, true, markers),
    }
}

/// アセットの全セグメントをリターゲット（未束縛は None）
pub fn retarget_asset(
    asset: &BoundAsset,
    mapping: &MappingTable,
    solver: &RotationSolver,
    joints: &JointStore,
    markers: bool,
) -> Vec<Option<SegmentPose>> {
    asset
        .bindings()
        .map(|(i, def, rest)| {
            rest.map(|r| retarget_segment(def, &mapping.effective(i), r, solver, joints, markers))
        })
        .collect()
}

/// 全セグメントをレスト変換に（すべて表示）
pub fn rest_poses(asset: &BoundAsset, markers: bool) -> Vec<Option<SegmentPose>> {
    asset
        .segments
        .iter()
        .map(|rest| rest.as_ref().map(|r| SegmentPose::rest(r, true, markers)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::LandmarkIndex;
    use crate::rig::segment::SEGMENTS;
    use crate::rig::solver::{rotation_between, ConstraintTable, RotationStrategy};
    use crate::rig::transform::Aabb;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    const SHOULDER: usize = LandmarkIndex::LeftShoulder as usize;
    const ELBOW: usize = LandmarkIndex::LeftElbow as usize;
    const WRIST: usize = LandmarkIndex::LeftWrist as usize;

    const STRATEGIES: [RotationStrategy; 3] = [
        RotationStrategy::Unconstrained,
        RotationStrategy::PoleVector,
        RotationStrategy::Anatomical,
    ];

    fn upper_arm() -> &'static SegmentDef {
        SEGMENTS.iter().find(|s| s.name == "object_11").unwrap()
    }

    fn mapping(start: usize, end: usize) -> EffectiveMapping {
        EffectiveMapping {
            start,
            end,
            axis: None,
        }
    }

    /// X 方向に長い、やや回転した・非等倍スケールのセグメント
    fn rest() -> SegmentRest {
        let t = Transform::new(
            Vector3::new(0.3, 0.8, -0.1),
            UnitQuaternion::from_euler_angles(0.2, -0.4, 0.7),
            Vector3::new(1.5, 0.5, 2.0),
        );
        let bounds = Aabb::new(Vector3::new(-0.5, -0.1, -0.1), Vector3::new(0.5, 0.1, 0.1));
        SegmentRest::capture(t, &bounds, UnitQuaternion::identity())
    }

    fn arm_joints() -> JointStore {
        let mut joints = JointStore::new();
        joints.set(SHOULDER, Vector3::new(0.0, 0.0, 0.0), true);
        joints.set(ELBOW, Vector3::new(0.0, -1.0, 0.0), true);
        joints.set(WRIST, Vector3::new(1.0, -1.0, 0.0), true);
        joints
    }

    /// 上腕を肩→肘でリターゲット
    fn pose_upper_arm(
        solver: &RotationSolver,
        rest: &SegmentRest,
        joints: &JointStore,
        markers: bool,
    ) -> SegmentPose {
        let m = mapping(SHOULDER, ELBOW);
        retarget_segment(upper_arm(), &m, rest, solver, joints, markers)
    }

    #[test]
    fn test_invisible_joints_give_exact_rest() {
        let table = ConstraintTable::default();
        let rest = rest();
        let mut joints = arm_joints();
        // 過去のフレームで動かした後でもレストに戻る
        for strategy in STRATEGIES {
            let solver = RotationSolver::new(strategy, &table);
            let moved = pose_upper_arm(&solver, &rest, &joints, false);
            assert!(moved.tracked);
            joints.set(ELBOW, Vector3::new(0.0, -1.0, 0.0), false);
            let pose = pose_upper_arm(&solver, &rest, &joints, true);
            assert_eq!(pose.transform, rest.transform);
            assert!(!pose.visible);
            assert!(!pose.tracked);
            assert!(!pose.marker.visible);
            joints.set(ELBOW, Vector3::new(0.0, -1.0, 0.0), true);
        }
    }

    #[test]
    fn test_coincident_joints_keep_rest_rotation() {
        let table = ConstraintTable::default();
        let solver = RotationSolver::new(RotationStrategy::PoleVector, &table);
        let rest = rest();
        let joints = arm_joints();
        let m = mapping(SHOULDER, SHOULDER);
        let pose = retarget_segment(upper_arm(), &m, &rest, &solver, &joints, true);
        assert_eq!(pose.transform.position, Vector3::zeros());
        assert_eq!(pose.transform.rotation, rest.transform.rotation);
        assert_eq!(pose.transform.scale, rest.transform.scale);
        assert!(pose.visible && pose.marker.visible);
    }

    #[test]
    fn test_natural_axis_follows_bone_for_all_strategies() {
        let table = ConstraintTable::default();
        let rest = rest();
        let joints = arm_joints();
        for strategy in STRATEGIES {
            let solver = RotationSolver::new(strategy, &table);
            let pose = pose_upper_arm(&solver, &rest, &joints, false);
            // 回転後の自然軸 = ボーン方向
            let axis_world = pose.transform.rotation * rest.axis;
            assert_relative_eq!(axis_world, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-4);
            let midpoint = Vector3::new(0.0, -0.5, 0.0);
            assert_relative_eq!(pose.transform.position, midpoint, epsilon = 1e-6);
            assert_eq!(pose.transform.scale, rest.transform.scale);
        }
    }

    #[test]
    fn test_markers_do_not_change_tracked_transform() {
        let table = ConstraintTable::default();
        let rest = rest();
        let joints = arm_joints();
        for strategy in STRATEGIES {
            let solver = RotationSolver::new(strategy, &table);
            let plain = pose_upper_arm(&solver, &rest, &joints, false);
            let marked = pose_upper_arm(&solver, &rest, &joints, true);
            assert!(plain.tracked && marked.tracked);
            assert_eq!(plain.transform, marked.transform);
            assert!(!plain.marker.visible);
            assert!(marked.marker.visible);
        }
    }

    #[test]
    fn test_unconstrained_composition_order() {
        let table = ConstraintTable::default();
        let solver = RotationSolver::new(RotationStrategy::Unconstrained, &table);
        let rest = rest();
        let joints = arm_joints();
        let pose = pose_upper_arm(&solver, &rest, &joints, false);
        let natural = rest.natural_axis(&rest.axis);
        let alignment = rotation_between(&natural, &Vector3::new(0.0, -1.0, 0.0));
        let expected = alignment * rest.transform.rotation;
        assert_relative_eq!(pose.transform.rotation.angle_to(&expected), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_axis_override() {
        let table = ConstraintTable::default();
        let solver = RotationSolver::new(RotationStrategy::Unconstrained, &table);
        let rest = rest();
        let joints = arm_joints();
        let m = EffectiveMapping {
            axis: Some(Vector3::z()),
            ..mapping(SHOULDER, ELBOW)
        };
        let pose = retarget_segment(upper_arm(), &m, &rest, &solver, &joints, false);
        let z_world = pose.transform.rotation * Vector3::z();
        assert_relative_eq!(z_world, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn test_static_segment_stays_at_rest() {
        let table = ConstraintTable::default();
        let solver = RotationSolver::new(RotationStrategy::Unconstrained, &table);
        let def = SegmentDef {
            animated: false,
            ..*upper_arm()
        };
        let m = mapping(SHOULDER, ELBOW);
        let pose = retarget_segment(&def, &m, &rest(), &solver, &arm_joints(), false);
        assert_eq!(pose.transform, rest().transform);
        assert!(pose.visible);
        assert!(!pose.tracked);
    }

    #[test]
    fn test_marker_inverse_scale() {
        let m = SegmentMarker::for_scale(&Vector3::new(2.0, 0.5, 0.0), true, true);
        assert_eq!(m.scale, Vector3::new(0.5, 2.0, 1.0));
        assert!(m.visible);
        assert!(!SegmentMarker::for_scale(&Vector3::new(1.0, 1.0, 1.0), true, false).visible);
    }
}
