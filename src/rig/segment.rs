use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

use crate::config::{AssetConfig, Axis, Correction};
use crate::pose::LandmarkIndex;

use super::transform::{Aabb, Transform};

/// 残りの寸法に対する最小レスト長
const MIN_REST_LENGTH: f32 = 1e-3;

/// 論理セグメント定義（両アセット共通、名前で束縛）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentDef {
    /// アセット内のサブメッシュ名
    pub name: &'static str,
    pub label: &'static str,
    pub start: LandmarkIndex,
    pub end: LandmarkIndex,
    /// false ならレスト姿勢に固定
    pub animated: bool,
}

const fn seg(
    name: &'static str,
    label: &'static str,
    start: LandmarkIndex,
    end: LandmarkIndex,
) -> SegmentDef {
    SegmentDef {
        name,
        label,
        start,
        end,
        animated: true,
    }
}

pub const SEGMENT_COUNT: usize = 20;

/// セグメントテーブル
///
/// 始点 == 終点のセグメント（頭蓋骨・肩など）は単一ランドマークに追従する。
pub const SEGMENTS: [SegmentDef; SEGMENT_COUNT] = {
    use LandmarkIndex::*;
    [
        // 腕
        seg("object_11", "Left lower arm (torso side)", LeftShoulder, LeftElbow),
        seg("object_12", "Left upper arm", LeftElbow, LeftWrist),
        seg("object_13", "Left hand", LeftWrist, LeftIndex),
        seg("object_18", "Right lower arm (torso side)", RightShoulder, RightElbow),
        seg("object_19", "Right upper arm", RightElbow, RightWrist),
        seg("object_20", "Right hand", RightWrist, RightIndex),
        // 脚
        seg("object_4", "Left thigh", LeftHip, LeftKnee),
        seg("object_5", "Left shin", LeftKnee, LeftAnkle),
        seg("object_6", "Left foot", LeftAnkle, LeftFootIndex),
        seg("object_14", "Right thigh", RightHip, RightKnee),
        seg("object_15", "Right shin", RightKnee, RightAnkle),
        seg("object_16", "Right foot", RightAnkle, RightFootIndex),
        // 頭
        seg("object_7", "Neck", LeftShoulder, Nose),
        seg("object_8", "Skull", Nose, Nose),
        seg("object_9", "Jaw", Nose, Nose),
        // 胴体
        seg("object_10", "Left shoulder", LeftShoulder, LeftShoulder),
        seg("object_17", "Right shoulder", RightShoulder, RightShoulder),
        seg("object_3", "Chest", LeftShoulder, LeftHip),
        seg("object_2", "Lower spine", LeftShoulder, LeftHip),
        seg("object_1", "Pelvis", LeftHip, RightHip),
    ]
};

/// 2つのオーサリング済みアセットのスロット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSlot {
    Primary,
    Alternate,
}

impl AssetSlot {
    pub const ALL: [AssetSlot; 2] = [AssetSlot::Primary, AssetSlot::Alternate];

    pub fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Alternate => 1,
        }
    }
}

impl fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Alternate => f.write_str("alternate"),
        }
    }
}

/// アセットスロットで引く固定長コンテナ
#[derive(Debug, Clone)]
pub struct AssetSlots<T> {
    slots: [Option<T>; 2],
}

impl<T> AssetSlots<T> {
    pub fn new() -> Self {
        Self {
            slots: [None, None],
        }
    }

    pub fn get(&self, slot: AssetSlot) -> Option<&T> {
        self.slots[slot.index()].as_ref()
    }

    pub fn get_mut(&mut self, slot: AssetSlot) -> Option<&mut T> {
        self.slots[slot.index()].as_mut()
    }

    pub fn insert(&mut self, slot: AssetSlot, value: T) -> Option<T> {
        self.slots[slot.index()].replace(value)
    }

    pub fn remove(&mut self, slot: AssetSlot) -> Option<T> {
        self.slots[slot.index()].take()
    }

    pub fn is_loaded(&self, slot: AssetSlot) -> bool {
        self.slots[slot.index()].is_some()
    }
}

impl<T> Default for AssetSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<AssetSlot> for AssetSlots<T> {
    type Output = Option<T>;

    fn index(&self, slot: AssetSlot) -> &Option<T> {
        &self.slots[slot.index()]
    }
}

impl<T> IndexMut<AssetSlot> for AssetSlots<T> {
    fn index_mut(&mut self, slot: AssetSlot) -> &mut Option<T> {
        &mut self.slots[slot.index()]
    }
}

/// 単軸の回転
pub fn axis_rotation(axis: Axis, degrees: f32) -> UnitQuaternion<f32> {
    let unit = match axis {
        Axis::X => Vector3::x_axis(),
        Axis::Y => Vector3::y_axis(),
        Axis::Z => Vector3::z_axis(),
    };
    UnitQuaternion::from_axis_angle(&unit, degrees.to_radians())
}

/// 補正リストを順に適用した回転（後のものほど外側）
fn compose_corrections(corrections: &[Correction]) -> UnitQuaternion<f32> {
    corrections
        .iter()
        .fold(UnitQuaternion::identity(), |acc, c| {
            axis_rotation(c.axis, c.degrees) * acc
        })
}

/// アセット全体の座標系補正 (Z-up → Y-up, Y 180°)
pub fn base_correction(profile: &AssetConfig) -> UnitQuaternion<f32> {
    let mut q = UnitQuaternion::identity();
    if profile.up_axis == Axis::Z {
        q = axis_rotation(Axis::X, 90.0) * q;
    }
    if profile.flip_y {
        q = axis_rotation(Axis::Y, 180.0) * q;
    }
    q
}

/// セグメント名に対するジオメトリ補正（アセット全体 + パーツ個別）
pub fn geometry_correction(profile: &AssetConfig, name: &str) -> UnitQuaternion<f32> {
    let base = base_correction(profile);
    match profile.corrections.get(name) {
        Some(list) => compose_corrections(list) * base,
        None => base,
    }
}

/// バウンディングボックスの最長軸（同長は X、次に Z を優先）
pub fn longest_axis(size: &Vector3<f32>) -> (Vector3<f32>, f32) {
    if size.x >= size.y && size.x >= size.z {
        (Vector3::x(), size.x)
    } else if size.z >= size.x && size.z >= size.y {
        (Vector3::z(), size.z)
    } else {
        (Vector3::y(), size.y)
    }
}

/// ロード時に取得する 1 セグメント分のレストデータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentRest {
    /// レスト時のローカル変換（位置・回転 q0・スケール）
    pub transform: Transform,
    /// 自動検出したメッシュの自然軸（ローカル、単位ベクトル）
    pub axis: Vector3<f32>,
    pub rest_length: f32,
    /// 補正後のローカルバウンディングボックス寸法
    pub bounds_size: Vector3<f32>,
    /// 中心化で取り除いたジオメトリ中心（補正前ローカル）
    pub geometry_center: Vector3<f32>,
    /// 頂点に適用するジオメトリ補正
    pub geometry_correction: UnitQuaternion<f32>,
}

impl SegmentRest {
    /// サブメッシュのレスト変換とローカル境界から作成
    pub fn capture(
        transform: Transform,
        local_bounds: &Aabb,
        correction: UnitQuaternion<f32>,
    ) -> Self {
        let center = local_bounds.center();
        let corrected = local_bounds.map_corners(|p| correction * (p - center));
        let size = corrected.size();
        let (axis, length) = longest_axis(&size);
        Self {
            transform,
            axis,
            rest_length: length.max(MIN_REST_LENGTH),
            bounds_size: size,
            geometry_center: center,
            geometry_correction: correction,
        }
    }

    /// q0 で回した自然軸（親空間）
    pub fn natural_axis(&self, axis: &Vector3<f32>) -> Vector3<f32> {
        self.transform.rotation * axis
    }
}
