use nalgebra::Vector3;
use serde::Serialize;

use crate::pose::LandmarkIndex;
use crate::tracker::{JointStore, JOINT_COUNT};

use super::solver::{bone_direction, RotationSolver};
use super::transform::Transform;

/// 合成スケルトンの骨 (開始ランドマーク, 終了ランドマーク)
pub const BONE_PAIRS: [(LandmarkIndex, LandmarkIndex); 31] = {
    use LandmarkIndex::*;
    [
        // 顔
        (Nose, LeftEyeInner),
        (LeftEyeInner, LeftEye),
        (LeftEye, LeftEyeOuter),
        (LeftEyeOuter, LeftEar),
        (Nose, RightEyeInner),
        (RightEyeInner, RightEye),
        (RightEye, RightEyeOuter),
        (RightEyeOuter, RightEar),
        (MouthLeft, MouthRight),
        // 上半身
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        // 胴体
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        // 下半身
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (LeftAnkle, LeftHeel),
        (LeftHeel, LeftFootIndex),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (RightAnkle, RightHeel),
        (RightHeel, RightFootIndex),
    ]
};

/// 関節マーカー
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointMarker {
    pub position: Vector3<f32>,
    pub visible: bool,
}

/// 合成スケルトンの骨 1 本
///
/// 単位長の箱を (1, L, 1) に伸ばして中点に置く。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BonePose {
    pub start: usize,
    pub end: usize,
    pub transform: Transform,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkeletonFrame {
    pub joints: Vec<JointMarker>,
    pub bones: Vec<BonePose>,
}

impl SkeletonFrame {
    /// 表示中の骨の数
    pub fn visible_bones(&self) -> usize {
        self.bones.iter().filter(|b| b.visible).count()
    }

    /// 全体の表示フラグを掛け合わせる
    pub fn with_overlay(mut self, shown: bool) -> Self {
        for joint in &mut self.joints {
            joint.visible &= shown;
        }
        for bone in &mut self.bones {
            bone.visible &= shown;
        }
        self
    }
}

fn pose_bone(start: usize, end: usize, joints: &JointStore, solver: &RotationSolver) -> BonePose {
    let hidden = BonePose {
        start,
        end,
        transform: Transform::identity(),
        visible: false,
    };
    let (Some(a), Some(b)) = (joints.visible_position(start), joints.visible_position(end)) else {
        return hidden;
    };
    let Some((direction, length)) = bone_direction(a, b, 0.0) else {
        return hidden;
    };
    BonePose {
        start,
        end,
        transform: Transform::new(
            a + direction.into_inner() * (length * 0.5),
            solver.solve(start, end, &direction, joints),
            Vector3::new(1.0, length, 1.0),
        ),
        visible: true,
    }
}

/// 関節と骨を現在の関節状態から配置
pub fn pose_skeleton(joints: &JointStore, solver: &RotationSolver) -> SkeletonFrame {
    let markers = (0..JOINT_COUNT)
        .map(|i| JointMarker {
            position: joints.position(i).copied().unwrap_or_else(Vector3::zeros),
            visible: joints.is_visible(i),
        })
        .collect();
    let bones = BONE_PAIRS
        .iter()
        .map(|&(s, e)| pose_bone(s as usize, e as usize, joints, solver))
        .collect();
    SkeletonFrame {
        joints: markers,
        bones,
    }
}
