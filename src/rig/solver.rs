//! Bone orientation solving.
//!
//! Every strategy maps the canonical up axis (+Y) onto the bone direction. The
//! constrained strategies additionally fix the twist around the bone using a
//! reference vector: a live third joint (pole vector) or an authored direction
//! (anatomical). When the reference is unusable the result is the unconstrained one.

use anyhow::bail;
use nalgebra::{Matrix3, Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::pose::LandmarkIndex;
use crate::tracker::JointStore;

/// 参照ベクトルがボーンとほぼ平行とみなす閾値（垂直成分の長さの2乗）
const DEGENERATE_REFERENCE_SQ: f32 = 1e-6;

/// 反平行判定の閾値 (dot + 1)
const OPPOSITE_EPSILON: f32 = 1e-6;

/// ボーンの基準軸 (+Y)
pub fn up_axis() -> Vector3<f32> {
    Vector3::y()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationStrategy {
    /// 最短回転のみ（ねじれ未定義）
    #[default]
    #[serde(rename = "unconstrained")]
    Unconstrained,
    /// 第3関節をポールとしてねじれを決める
    #[serde(rename = "pole")]
    PoleVector,
    /// ボーンごとの固定方向でねじれを決める
    #[serde(rename = "anatomical")]
    Anatomical,
}

impl FromStr for RotationStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "unconstrained" => Ok(Self::Unconstrained),
            "pole" => Ok(Self::PoleVector),
            "anatomical" => Ok(Self::Anatomical),
            other => bail!("Unknown rotation strategy: {}", other),
        }
    }
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconstrained => "unconstrained",
            Self::PoleVector => "pole",
            Self::Anatomical => "anatomical",
        };
        f.write_str(name)
    }
}

/// 制約付き戦略用のボーン設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneConstraint {
    /// ポール関節
    pub pole: usize,
    /// 解剖学的な参照方向
    pub anatomical: Vector3<f32>,
}

/// (始点, 終点) → 制約設定。登録のないボーンは常に Unconstrained
#[derive(Debug, Clone)]
pub struct ConstraintTable {
    entries: HashMap<(usize, usize), BoneConstraint>,
}

impl ConstraintTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, start: usize, end: usize, constraint: BoneConstraint) {
        self.entries.insert((start, end), constraint);
    }

    pub fn get(&self, start: usize, end: usize) -> Option<&BoneConstraint> {
        self.entries.get(&(start, end))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConstraintTable {
    /// 腕は前方、脚と胴体は後方
    fn default() -> Self {
        use LandmarkIndex::*;
        let forward = Vector3::new(0.0, 0.0, 1.0);
        let backward = Vector3::new(0.0, 0.0, -1.0);
        let rows: [(LandmarkIndex, LandmarkIndex, LandmarkIndex, Vector3<f32>); 10] = [
            (LeftShoulder, LeftElbow, LeftWrist, forward),
            (LeftElbow, LeftWrist, LeftIndex, forward),
            (RightShoulder, RightElbow, RightWrist, forward),
            (RightElbow, RightWrist, RightIndex, forward),
            (LeftHip, LeftKnee, LeftAnkle, backward),
            (LeftKnee, LeftAnkle, LeftHeel, backward),
            (RightHip, RightKnee, RightAnkle, backward),
            (RightKnee, RightAnkle, RightHeel, backward),
            (LeftShoulder, LeftHip, RightShoulder, backward),
            (RightShoulder, RightHip, LeftShoulder, backward),
        ];
        let mut table = Self::empty();
        for (start, end, pole, anatomical) in rows {
            table.insert(
                start as usize,
                end as usize,
                BoneConstraint {
                    pole: pole as usize,
                    anatomical,
                },
            );
        }
        table
    }
}

/// `from` を `to` に移す最短回転（両方とも単位ベクトル）
///
/// 反平行のときは `from` に垂直な軸まわりの 180° 回転を返す。
pub fn rotation_between(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    let r = from.dot(to) + 1.0;
    let q = if r < OPPOSITE_EPSILON {
        if from.x.abs() > from.z.abs() {
            Quaternion::new(0.0, -from.y, from.x, 0.0)
        } else {
            Quaternion::new(0.0, 0.0, -from.z, from.y)
        }
    } else {
        let c = from.cross(to);
        Quaternion::new(r, c.x, c.y, c.z)
    };
    UnitQuaternion::new_normalize(q)
}

/// 方向 `direction`（単位）を Y 軸、参照ベクトルの垂直成分でねじれを決めた回転
///
/// 列 = {right, direction, forward}。参照がほぼ平行なら None。
pub fn basis_rotation(
    direction: &Vector3<f32>,
    reference: &Vector3<f32>,
) -> Option<UnitQuaternion<f32>> {
    let perpendicular = reference - direction * reference.dot(direction);
    if perpendicular.norm_squared() < DEGENERATE_REFERENCE_SQ {
        return None;
    }
    let perpendicular = perpendicular.normalize();
    let right = direction.cross(&perpendicular).normalize();
    let forward = right.cross(direction).normalize();
    let m = Matrix3::from_columns(&[right, *direction, forward]);
    Some(UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(m),
    ))
}

/// 始点→終点の単位方向と長さ。長さが `min_length` 未満なら None（描画不可）
pub fn bone_direction(
    start: &Vector3<f32>,
    end: &Vector3<f32>,
    min_length: f32,
) -> Option<(Unit<Vector3<f32>>, f32)> {
    let delta = end - start;
    let length = delta.norm();
    if !length.is_finite() || length <= min_length {
        return None;
    }
    Some((Unit::new_unchecked(delta / length), length))
}

/// グローバルな戦略切り替えとボーン設定を束ねたソルバー
pub struct RotationSolver<'a> {
    strategy: RotationStrategy,
    table: &'a ConstraintTable,
}

impl<'a> RotationSolver<'a> {
    pub fn new(strategy: RotationStrategy, table: &'a ConstraintTable) -> Self {
        Self { strategy, table }
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    /// 戦略に応じた参照ベクトル。使えなければ None
    fn reference(&self, start: usize, end: usize, joints: &JointStore) -> Option<Vector3<f32>> {
        let constraint = self.table.get(start, end)?;
        match self.strategy {
            RotationStrategy::Unconstrained => None,
            RotationStrategy::PoleVector => {
                let pole = joints.visible_position(constraint.pole)?;
                let origin = joints.position(start)?;
                Some(pole - origin)
            }
            RotationStrategy::Anatomical => Some(constraint.anatomical),
        }
    }

    /// 制約付き戦略のターゲット基底。Unconstrained へのフォールバック時は None
    pub fn target_basis(
        &self,
        start: usize,
        end: usize,
        direction: &Vector3<f32>,
        joints: &JointStore,
    ) -> Option<UnitQuaternion<f32>> {
        let reference = self.reference(start, end, joints)?;
        basis_rotation(direction, &reference)
    }

    /// 基準軸 (+Y) を `direction` に向ける回転
    pub fn solve(
        &self,
        start: usize,
        end: usize,
        direction: &Vector3<f32>,
        joints: &JointStore,
    ) -> UnitQuaternion<f32> {
        self.target_basis(start, end, direction, joints)
            .unwrap_or_else(|| rotation_between(&up_axis(), direction))
    }

    /// メッシュの自然軸 `axis`（親空間）を `direction` に向ける回転
    ///
    /// Unconstrained: axis → direction の最短回転。
    /// 制約付き: axis → +Y → ターゲット基底。
    pub fn align_axis(
        &self,
        start: usize,
        end: usize,
        axis: &Vector3<f32>,
        direction: &Vector3<f32>,
        joints: &JointStore,
    ) -> UnitQuaternion<f32> {
        match self.target_basis(start, end, direction, joints) {
            Some(target) => target * rotation_between(axis, &up_axis()),
            None => rotation_between(axis, direction),
        }
    }
}
