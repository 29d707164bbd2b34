use nalgebra::Vector3;

use crate::config::Calibration;
use crate::pose::{LandmarkFrame, LandmarkIndex};

use super::normalize::Normalizer;
use super::smooth::JointFilter;

pub const JOINT_COUNT: usize = LandmarkIndex::COUNT;

/// 33 関節の平滑化済み位置と可視フラグ
///
/// 検出フレームごとに `update` で更新される。不可視の関節の位置は古いまま残る（参照しない）。
#[derive(Debug, Clone)]
pub struct JointStore {
    positions: [Vector3<f32>; JOINT_COUNT],
    visible: [bool; JOINT_COUNT],
}

impl JointStore {
    pub fn new() -> Self {
        Self {
            positions: [Vector3::zeros(); JOINT_COUNT],
            visible: [false; JOINT_COUNT],
        }
    }

    /// 検出フレームで全関節を更新
    pub fn update(&mut self, frame: &LandmarkFrame, calibration: &Calibration) {
        let normalizer = Normalizer::from_calibration(calibration);
        let filter = JointFilter::from_smoothing(calibration.smoothing);

        for (i, sample) in frame.landmarks.iter().enumerate() {
            let was_visible = self.visible[i];
            match sample {
                Some(lm) => {
                    let target = normalizer.normalize(lm);
                    filter.apply(&mut self.positions[i], was_visible, &target);
                    self.visible[i] = true;
                }
                None => {
                    self.visible[i] = false;
                }
            }
        }
    }

    /// 全関節を不可視にする（ポーズ未検出・トラッキング停止時）
    pub fn clear_visibility(&mut self) {
        self.visible = [false; JOINT_COUNT];
    }

    pub fn position(&self, index: usize) -> Option<&Vector3<f32>> {
        self.positions.get(index)
    }

    /// 可視なら位置を返す
    pub fn visible_position(&self, index: usize) -> Option<&Vector3<f32>> {
        if self.is_visible(index) {
            self.positions.get(index)
        } else {
            None
        }
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.get(index).copied().unwrap_or(false)
    }

    pub fn any_visible(&self) -> bool {
        self.visible.iter().any(|v| *v)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }

    /// テスト・外部入力用: 関節を直接設定
    pub fn set(&mut self, index: usize, position: Vector3<f32>, visible: bool) {
        if index < JOINT_COUNT {
            self.positions[index] = position;
            self.visible[index] = visible;
        }
    }
}

impl Default for JointStore {
    fn default() -> Self {
        Self::new()
    }
}
