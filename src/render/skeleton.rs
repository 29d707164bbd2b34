use nalgebra::Vector3;

use crate::rig::{FrameOutput, Transform};

/// 関節の色 (RGB)
pub const JOINT_COLOR: u32 = 0xFFF2A6;

/// 合成スケルトンの骨の色 (RGB)
pub const BONE_COLOR: u32 = 0x6FD3FF;

/// アセットセグメントの色 (RGB)
pub const SEGMENT_COLOR: u32 = 0xC8C8C8;

/// セグメント原点マーカーの色 (RGB)
pub const MARKER_COLOR: u32 = 0xFFA54A;

/// 正面からの正射影
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub width: usize,
    pub height: usize,
    /// 画面中央に来るワールド座標
    pub center: Vector3<f32>,
    pub pixels_per_unit: f32,
}

impl Projection {
    /// 高さ 2.5 単位が画面に収まる投影（既定リグ位置が中央）
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            center: Vector3::new(0.0, 1.2, 0.0),
            pixels_per_unit: height as f32 / 2.5,
        }
    }

    /// ワールド座標 → ピクセル座標（Y は下向き）
    pub fn to_pixel(&self, p: &Vector3<f32>) -> (i32, i32) {
        let d = p - self.center;
        let x = self.width as f32 * 0.5 + d.x * self.pixels_per_unit;
        let y = self.height as f32 * 0.5 - d.y * self.pixels_per_unit;
        (x.round() as i32, y.round() as i32)
    }
}

/// 親変換の連結（スケールは成分ごと）
fn compose(parent: &Transform, child: &Transform) -> Transform {
    Transform::new(
        parent.transform_point(&child.position),
        parent.rotation * child.rotation,
        parent.scale.component_mul(&child.scale),
    )
}

/// 骨の両端（ワールド）
pub fn bone_segments(output: &FrameOutput) -> Vec<(Vector3<f32>, Vector3<f32>)> {
    output
        .skeleton
        .bones
        .iter()
        .filter(|b| b.visible)
        .map(|b| {
            let start = &output.skeleton.joints[b.start].position;
            let end = &output.skeleton.joints[b.end].position;
            (output.rig.transform_point(start), output.rig.transform_point(end))
        })
        .collect()
}

/// 表示中の関節（ワールド）
pub fn joint_points(output: &FrameOutput) -> Vec<Vector3<f32>> {
    output
        .skeleton
        .joints
        .iter()
        .filter(|j| j.visible)
        .map(|j| output.rig.transform_point(&j.position))
        .collect()
}

/// 表示中セグメントの原点と自身の Y 軸端点、マーカー表示フラグ（ワールド）
pub fn segment_points(output: &FrameOutput) -> Vec<(Vector3<f32>, Vector3<f32>, bool)> {
    let Some(asset) = output.asset.as_ref().filter(|a| a.visible) else {
        return Vec::new();
    };
    let root = Transform::new(
        asset.root_position,
        nalgebra::UnitQuaternion::identity(),
        Vector3::new(1.0, 1.0, 1.0),
    );
    let parent = compose(&compose(&output.rig, &asset.group), &root);
    asset
        .segments
        .iter()
        .flatten()
        .filter(|s| s.visible)
        .map(|s| {
            let world = compose(&parent, &s.transform);
            let tip = world.transform_point(&Vector3::new(0.0, 0.1, 0.0));
            (world.position, tip, s.marker.visible)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_center() {
        let p = Projection::new(640, 480);
        assert_eq!(p.to_pixel(&Vector3::new(0.0, 1.2, 0.0)), (320, 240));
        // 上方向は画面の上
        let (_, y) = p.to_pixel(&Vector3::new(0.0, 2.0, 0.0));
        assert!(y < 240);
    }

    #[test]
    fn test_compose_translation() {
        let parent = Transform::new(
            Vector3::new(1.0, 0.0, 0.0),
            nalgebra::UnitQuaternion::identity(),
            Vector3::new(2.0, 2.0, 2.0),
        );
        let child = Transform::new(
            Vector3::new(0.5, 0.0, 0.0),
            nalgebra::UnitQuaternion::identity(),
            Vector3::new(1.0, 1.0, 1.0),
        );
        assert_eq!(compose(&parent, &child).position, Vector3::new(2.0, 0.0, 0.0));
    }
}
