use nalgebra::{UnitQuaternion, Vector3};

use crate::config::Calibration;

use super::transform::Transform;

/// キャリブレーションからリグコンテナ全体の変換を作る
///
/// 回転は Y → X → Z の順に合成 (q = qy * qx * qz)。ポーズ検出の有無に関係なく毎フレーム適用する。
pub fn rig_transform(calibration: &Calibration) -> Transform {
    let [px, py, pz] = calibration.position;
    let [rx, ry, rz] = calibration.rotation_deg;
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), ry.to_radians());
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), rx.to_radians());
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rz.to_radians());
    Transform::new(
        Vector3::new(px, py, pz),
        qy * qx * qz,
        Vector3::new(1.0, 1.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration(position: [f32; 3], rotation_deg: [f32; 3]) -> Calibration {
        Calibration {
            position,
            rotation_deg,
            ..Calibration::default()
        }
    }

    #[test]
    fn test_translation_only() {
        let t = rig_transform(&calibration([0.5, 1.2, -2.0], [0.0; 3]));
        assert_eq!(t.position, Vector3::new(0.5, 1.2, -2.0));
        assert_relative_eq!(t.rotation.angle(), 0.0);
        assert_eq!(t.scale, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_single_axis() {
        let t = rig_transform(&calibration([0.0; 3], [0.0, 90.0, 0.0]));
        assert_relative_eq!(t.rotation * Vector3::x(), -Vector3::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_yxz_order() {
        let t = rig_transform(&calibration([0.0; 3], [30.0, 45.0, 60.0]));
        // オイラー順 YXZ と一致
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 45f32.to_radians())
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 30f32.to_radians())
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 60f32.to_radians());
        assert_relative_eq!(t.rotation.angle_to(&expected), 0.0, epsilon = 1e-5);
        // 順序を変えると別の回転になる
        let xyz = UnitQuaternion::from_euler_angles(
            30f32.to_radians(),
            45f32.to_radians(),
            60f32.to_radians(),
        );
        assert!(t.rotation.angle_to(&xyz) > 1e-3);
    }
}
