use nalgebra::Vector3;

use crate::config::MAX_SMOOTHING;

/// 関節位置の指数平滑化フィルタ
///
/// alpha = 1 - smoothing。前フレームで不可視だった関節は補間せずにそのまま採用する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFilter {
    alpha: f32,
}

impl JointFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    /// 平滑化係数 (0.0〜0.95) から作成
    pub fn from_smoothing(smoothing: f32) -> Self {
        let s = if smoothing.is_nan() {
            0.0
        } else {
            smoothing.clamp(0.0, MAX_SMOOTHING)
        };
        Self::new(1.0 - s)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// `current` を `target` に向けて更新する
    ///
    /// was_visible=false のとき（再出現）は補間せず target へスナップ。
    /// 古い位置からの「スライドイン」を防ぐ。
    pub fn apply(&self, current: &mut Vector3<f32>, was_visible: bool, target: &Vector3<f32>) {
        if !was_visible || self.alpha >= 1.0 {
            *current = *target;
        } else if self.alpha <= 0.0 {
            // 最大平滑化: 前の値を保持
        } else {
            // 成分ごとのEMA
            for i in 0..3 {
                current[i] += (target[i] - current[i]) * self.alpha;
            }
        }
    }
}

impl Default for JointFilter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_vec(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).iter().all(|d| d.abs() < eps)
    }

    #[test]
    fn test_alpha_from_smoothing() {
        assert!((JointFilter::from_smoothing(0.5).alpha() - 0.5).abs() < 1e-6);
        assert!((JointFilter::from_smoothing(0.0).alpha() - 1.0).abs() < 1e-6);
        // 0.95でクランプ
        assert!((JointFilter::from_smoothing(2.0).alpha() - 0.05).abs() < 1e-6);
        assert!((JointFilter::from_smoothing(-1.0).alpha() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_smoothing() {
        let f = JointFilter::from_smoothing(0.5);
        let mut pos = Vector3::zeros();
        f.apply(&mut pos, true, &Vector3::new(2.0, 0.0, 0.0));
        assert!(approx_eq_vec(&pos, &Vector3::new(1.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_snap_on_reappearance() {
        for i in 0..=19 {
            let s = i as f32 * 0.05;
            let f = JointFilter::from_smoothing(s);
            let mut pos = Vector3::new(100.0, -50.0, 7.0);
            let target = Vector3::new(0.3, 0.2, -0.1);
            f.apply(&mut pos, false, &target);
            assert_eq!(pos, target, "s={}", s);
        }
    }

    #[test]
    fn test_no_smoothing_passthrough() {
        let f = JointFilter::new(1.0);
        let mut pos = Vector3::new(1.0, 1.0, 1.0);
        let target = Vector3::new(4.0, 5.0, 6.0);
        f.apply(&mut pos, true, &target);
        assert_eq!(pos, target);
    }

    #[test]
    fn test_full_smoothing_freezes() {
        let f = JointFilter::new(0.0);
        let mut pos = Vector3::new(1.0, 2.0, 3.0);
        f.apply(&mut pos, true, &Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(pos, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_convergence_rate_monotonic() {
        let target = Vector3::new(1.0, -1.0, 0.5);
        let mut prev_err = 0.0;
        // smoothingが小さいほど速く収束する
        for &s in &[0.9, 0.7, 0.5, 0.3, 0.1] {
            let f = JointFilter::from_smoothing(s);
            let mut pos = Vector3::zeros();
            for _ in 0..5 {
                f.apply(&mut pos, true, &target);
            }
            let err = (target - pos).norm();
            if prev_err > 0.0 {
                assert!(err < prev_err, "s={} err={} prev={}", s, err, prev_err);
            }
            prev_err = err;
        }
    }

    #[test]
    fn test_converges_to_constant_target() {
        let target = Vector3::new(0.25, 1.5, -2.0);
        for &s in &[0.0, 0.5, 0.95] {
            let f = JointFilter::from_smoothing(s);
            let mut pos = Vector3::new(-3.0, 3.0, 3.0);
            for _ in 0..2000 {
                f.apply(&mut pos, true, &target);
            }
            assert!(approx_eq_vec(&pos, &target, 1e-5), "s={} pos={:?}", s, pos);
        }
    }
}
