use crate::config::Calibration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestState {
    Tracking,
    Resting,
}

/// ライブリターゲットとレスト姿勢の切り替え
///
/// レストに入るときキャリブレーションを退避して起動時の値に戻し、
/// 抜けるときに退避した値をそのまま戻す。
#[derive(Debug, Clone)]
pub struct RestPoseController {
    state: RestState,
    defaults: Calibration,
    saved: Option<Calibration>,
}

impl RestPoseController {
    pub fn new(defaults: Calibration) -> Self {
        Self {
            state: RestState::Tracking,
            defaults,
            saved: None,
        }
    }

    pub fn state(&self) -> RestState {
        self.state
    }

    pub fn is_resting(&self) -> bool {
        self.state == RestState::Resting
    }

    pub fn defaults(&self) -> &Calibration {
        &self.defaults
    }

    /// Tracking → Resting。すでにレスト中なら何もしない
    pub fn enter(&mut self, calibration: &mut Calibration) {
        if self.is_resting() {
            return;
        }
        self.saved = Some(*calibration);
        *calibration = self.defaults;
        self.state = RestState::Resting;
    }

    /// Resting → Tracking。退避値がなければキャリブレーションはそのまま
    pub fn exit(&mut self, calibration: &mut Calibration) {
        if let Some(saved) = self.saved.take() {
            *calibration = saved;
        }
        self.state = RestState::Tracking;
    }

    pub fn set(&mut self, resting: bool, calibration: &mut Calibration) {
        if resting {
            self.enter(calibration);
        } else {
            self.exit(calibration);
        }
    }

    /// 切り替えて新しい状態を返す
    pub fn toggle(&mut self, calibration: &mut Calibration) -> RestState {
        let resting = !self.is_resting();
        self.set(resting, calibration);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweaked() -> Calibration {
        Calibration {
            smoothing: 0.33,
            scale: [2.1, 0.7, 1.3],
            mirror: false,
            position: [0.123, -4.5, 6.75],
            rotation_deg: [12.5, -170.0, 0.001],
        }
    }

    #[test]
    fn test_round_trip_restores_bit_for_bit() {
        let mut controller = RestPoseController::new(Calibration::default());
        let mut cal = tweaked();
        assert_eq!(controller.toggle(&mut cal), RestState::Resting);
        assert_eq!(cal, Calibration::default());
        assert_eq!(controller.toggle(&mut cal), RestState::Tracking);
        assert_eq!(cal, tweaked());
        for (a, b) in cal.position.iter().zip(tweaked().position.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_exit_without_snapshot_is_noop() {
        let mut controller = RestPoseController::new(Calibration::default());
        let mut cal = tweaked();
        controller.exit(&mut cal);
        assert_eq!(cal, tweaked());
        assert_eq!(controller.state(), RestState::Tracking);
    }

    #[test]
    fn test_double_enter_keeps_first_snapshot() {
        let mut controller = RestPoseController::new(Calibration::default());
        let mut cal = tweaked();
        controller.enter(&mut cal);
        controller.enter(&mut cal);
        controller.exit(&mut cal);
        assert_eq!(cal, tweaked());
    }

    #[test]
    fn test_snapshot_consumed_on_exit() {
        let mut controller = RestPoseController::new(Calibration::default());
        let mut cal = tweaked();
        controller.set(true, &mut cal);
        controller.set(false, &mut cal);
        // 2 回目の exit は退避値がないので変更なし
        cal.smoothing = 0.1;
        controller.set(false, &mut cal);
        assert_eq!(cal.smoothing, 0.1);
    }
}
