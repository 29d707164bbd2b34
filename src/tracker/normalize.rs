use nalgebra::Vector3;

use crate::config::Calibration;
use crate::pose::Landmark;

/// ランドマーク座標 → リグローカル座標変換
///
/// 右手系 Y-up。リグ全体のキャリブレーション変換はこの後に適用される。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    /// 軸ごとのスケール [x, y, z]
    scale: [f32; 3],
    /// X軸反転
    mirror: bool,
}

impl Normalizer {
    pub fn new(scale: [f32; 3], mirror: bool) -> Self {
        Self { scale, mirror }
    }

    /// キャリブレーションから作成
    pub fn from_calibration(calibration: &Calibration) -> Self {
        Self::new(calibration.scale, calibration.mirror)
    }

    pub fn normalize(&self, lm: &Landmark) -> Vector3<f32> {
        // X: 画像中央を0とし、scaleでスケール
        let x = if self.mirror {
            (0.5 - lm.x) * self.scale[0]
        } else {
            (lm.x - 0.5) * self.scale[0]
        };
        // Y: 画像は下向き、リグは上向き
        let y = (0.5 - lm.y) * self.scale[1];
        // Z: 検出器の深度はカメラに近いほど負
        let z = -lm.z * self.scale[2];
        Vector3::new(x, y, z)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new([1.0, 1.0, 1.0], false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_vec(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).iter().all(|d| d.abs() < eps)
    }

    #[test]
    fn test_center_is_origin() {
        let n = Normalizer::new([2.0, 3.0, 4.0], false);
        let p = n.normalize(&Landmark::new(0.5, 0.5, 0.0));
        assert!(approx_eq_vec(&p, &Vector3::zeros(), 1e-6));
    }

    #[test]
    fn test_mirrored_x() {
        let n = Normalizer::new([2.0, 1.0, 1.0], true);
        let p = n.normalize(&Landmark::new(0.25, 0.5, 0.0));
        assert!((p.x - 0.5).abs() < 1e-6);

        let unmirrored = Normalizer::new([2.0, 1.0, 1.0], false);
        let q = unmirrored.normalize(&Landmark::new(0.25, 0.5, 0.0));
        assert!((q.x + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_y_up_and_depth_flip() {
        let n = Normalizer::new([1.0, 2.0, 3.0], false);
        // 画像の上端 → リグの上方向
        let top = n.normalize(&Landmark::new(0.5, 0.0, 0.5));
        assert!((top.y - 1.0).abs() < 1e-6);
        assert!((top.z + 1.5).abs() < 1e-6);

        let bottom = n.normalize(&Landmark::new(0.5, 1.0, -0.5));
        assert!((bottom.y + 1.0).abs() < 1e-6);
        assert!((bottom.z - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_from_calibration() {
        let cal = Calibration::default();
        let n = Normalizer::from_calibration(&cal);
        assert_eq!(n, Normalizer::new(cal.scale, cal.mirror));
    }
}
