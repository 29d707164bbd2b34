use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::rig::{AssetSlot, RenderMode, RotationStrategy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// リグ全体のキャリブレーション値
///
/// 外部コントロールから tick 間で書き換えられ、tick 開始時に読まれる。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// 平滑化係数 (0.0〜0.95)。大きいほど滑らか
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// ランドマーク座標の軸ごとのスケール [x, y, z]
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    /// 左右反転（自撮りカメラ用）
    #[serde(default = "default_mirror")]
    pub mirror: bool,
    /// リグ全体の位置オフセット [x, y, z]
    #[serde(default = "default_position")]
    pub position: [f32; 3],
    /// リグ全体の回転オフセット（度） [x, y, z]
    #[serde(default)]
    pub rotation_deg: [f32; 3],
}

pub const MAX_SMOOTHING: f32 = 0.95;

fn default_smoothing() -> f32 { 0.6 }
fn default_scale() -> [f32; 3] { [1.6, 1.8, 1.0] }
fn default_mirror() -> bool { true }
fn default_position() -> [f32; 3] { [0.0, 1.2, 0.0] }

impl Calibration {
    /// [0, 0.95] にクランプした平滑化係数
    pub fn clamped_smoothing(&self) -> f32 {
        if self.smoothing.is_nan() {
            return 0.0;
        }
        self.smoothing.clamp(0.0, MAX_SMOOTHING)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            scale: default_scale(),
            mirror: default_mirror(),
            position: default_position(),
            rotation_deg: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub strategy: RotationStrategy,
    #[serde(default)]
    pub render_mode: RenderMode,
    /// 合成スケルトンをアセットに重ねて表示
    #[serde(default)]
    pub show_rig: bool,
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

fn default_target_fps() -> u32 { 60 }

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::default(),
            render_mode: RenderMode::default(),
            show_rig: false,
            target_fps: default_target_fps(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// minifb デバッグビュー
    #[serde(default)]
    pub view: bool,
    /// セグメント原点マーカー
    #[serde(default)]
    pub markers: bool,
    /// 起動時にマッピング上書きを適用
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// ジオメトリ補正の単軸回転
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub axis: Axis,
    pub degrees: f32,
}

impl Correction {
    pub fn new(axis: Axis, degrees: f32) -> Self {
        Self { axis, degrees }
    }
}

/// アセットごとのオーサリング補正
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub slot: AssetSlot,
    /// ローダーに渡すアセット識別子
    pub id: String,
    /// モデルの上方向軸。"z" なら X 軸 90° で Y-up に変換
    #[serde(default = "default_up_axis")]
    pub up_axis: Axis,
    /// Y 軸 180° の全体反転（手のひらの向き補正）
    #[serde(default = "default_flip_y")]
    pub flip_y: bool,
    /// セグメント名 → 追加補正（順に適用）
    #[serde(default = "default_corrections")]
    pub corrections: HashMap<String, Vec<Correction>>,
}

fn default_up_axis() -> Axis { Axis::Z }
fn default_flip_y() -> bool { true }

/// 首・顎・胸は前向きに、頭蓋骨はさらに上下を反転
fn default_corrections() -> HashMap<String, Vec<Correction>> {
    let flip_y = Correction::new(Axis::Y, 180.0);
    let flip_x = Correction::new(Axis::X, 180.0);
    HashMap::from([
        ("object_7".to_string(), vec![flip_y]),
        ("object_8".to_string(), vec![flip_y, flip_x]),
        ("object_9".to_string(), vec![flip_y]),
        ("object_3".to_string(), vec![flip_y]),
    ])
}

impl AssetConfig {
    pub fn new(slot: AssetSlot, id: &str) -> Self {
        Self {
            slot,
            id: id.to_string(),
            up_axis: default_up_axis(),
            flip_y: default_flip_y(),
            corrections: default_corrections(),
        }
    }
}

fn default_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig::new(AssetSlot::Primary, "assets/29human-skeleton.json"),
        AssetConfig::new(AssetSlot::Alternate, "assets/alt-human-skeleton.json"),
    ]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayConfig {
    /// JSON Lines のランドマーク記録
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            tracking: TrackingConfig::default(),
            debug: DebugConfig::default(),
            assets: default_assets(),
            replay: ReplayConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// 読めなければデフォルト設定で続行
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }

    pub fn asset(&self, slot: AssetSlot) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.slot == slot)
    }
}
