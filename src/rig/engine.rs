//! Per-tick orchestration.
//!
//! One [`RigEngine::tick`] per rendered frame. The rig transform and the rest
//! controller run every tick; landmark processing only happens when the source
//! has a new frame. A tick never fails: every error degrades to the last known
//! state or a rest transform.

use anyhow::bail;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{Calibration, Config};
use crate::pose::{FrameGate, LandmarkFrame, LandmarkSource};
use crate::tracker::JointStore;

use super::asset::{AssetEvent, BoundAsset};
use super::compositor::rig_transform;
use super::mapping::MappingTable;
use super::rest::RestPoseController;
use super::retarget::{rest_poses, retarget_asset, SegmentPose};
use super::segment::{AssetSlot, AssetSlots};
use super::skeleton::{pose_skeleton, SkeletonFrame};
use super::solver::{ConstraintTable, RotationSolver, RotationStrategy};
use super::transform::Transform;

/// 表示・リターゲットするアセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// 合成スケルトンのみ
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "asset")]
    Primary,
    #[serde(rename = "asset-alt")]
    Alternate,
}

impl RenderMode {
    pub fn slot(self) -> Option<AssetSlot> {
        match self {
            Self::None => None,
            Self::Primary => Some(AssetSlot::Primary),
            Self::Alternate => Some(AssetSlot::Alternate),
        }
    }
}

impl FromStr for RenderMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "asset" => Ok(Self::Primary),
            "asset-alt" => Ok(Self::Alternate),
            other => bail!("Unknown render mode: {}", other),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Primary => "asset",
            Self::Alternate => "asset-alt",
        };
        f.write_str(name)
    }
}

/// tick の結果の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    /// まだ tick していない
    #[default]
    Idle,
    Resting,
    /// ソース未準備（描画のみ）
    NotReady,
    /// 新フレームなし（描画のみ）
    Duplicate,
    Tracked,
    NoPose,
    /// 検出エラー（描画のみ）
    SourceError,
}

impl TickStatus {
    /// 前回の状態をそのまま描画する tick
    pub fn is_render_only(self) -> bool {
        matches!(self, Self::NotReady | Self::Duplicate | Self::SourceError)
    }
}

/// 表示中アセットの 1 フレーム分
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetFrame {
    pub slot: AssetSlot,
    /// アセットグループの変換（リグコンテナ内）
    pub group: Transform,
    /// ピボットを原点に合わせるルートの位置
    pub root_position: Vector3<f32>,
    pub visible: bool,
    /// `SEGMENTS` と同じ順。未束縛は None
    pub segments: Vec<Option<SegmentPose>>,
}

/// 描画側へ渡す最終結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameOutput {
    pub status: TickStatus,
    pub timestamp_ms: f64,
    /// リグコンテナの変換
    pub rig: Transform,
    pub skeleton: SkeletonFrame,
    pub asset: Option<AssetFrame>,
}

/// リターゲットエンジン本体
pub struct RigEngine {
    calibration: Calibration,
    rest: RestPoseController,
    joints: JointStore,
    constraints: ConstraintTable,
    strategy: RotationStrategy,
    render_mode: RenderMode,
    show_rig: bool,
    markers: bool,
    mapping: MappingTable,
    assets: AssetSlots<BoundAsset>,
    disabled: AssetSlots<String>,
    gate: FrameGate,
    output: FrameOutput,
}

impl RigEngine {
    pub fn new(config: &Config) -> Self {
        let mut mapping = MappingTable::new();
        mapping.set_preview(config.debug.preview);
        Self {
            calibration: config.calibration,
            rest: RestPoseController::new(config.calibration),
            joints: JointStore::new(),
            constraints: ConstraintTable::default(),
            strategy: config.tracking.strategy,
            render_mode: config.tracking.render_mode,
            show_rig: config.tracking.show_rig,
            markers: config.debug.markers,
            mapping,
            assets: AssetSlots::new(),
            disabled: AssetSlots::new(),
            gate: FrameGate::new(),
            output: FrameOutput::default(),
        }
    }

    // --- 状態参照 ---

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// 外部コントロール用。書き換えは次の tick から反映される
    pub fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    pub fn joints(&self) -> &JointStore {
        &self.joints
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn show_rig(&self) -> bool {
        self.show_rig
    }

    pub fn markers(&self) -> bool {
        self.markers
    }

    pub fn is_resting(&self) -> bool {
        self.rest.is_resting()
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut MappingTable {
        &mut self.mapping
    }

    pub fn constraints_mut(&mut self) -> &mut ConstraintTable {
        &mut self.constraints
    }

    pub fn asset(&self, slot: AssetSlot) -> Option<&BoundAsset> {
        self.assets.get(slot)
    }

    /// 表示モードで選ばれていて読み込み済みのアセット
    pub fn active_asset(&self) -> Option<&BoundAsset> {
        self.render_mode.slot().and_then(|slot| self.assets.get(slot))
    }

    pub fn is_disabled(&self, slot: AssetSlot) -> bool {
        self.disabled.is_loaded(slot)
    }

    pub fn output(&self) -> &FrameOutput {
        &self.output
    }

    /// 選択中セグメントのインスペクタ表示
    pub fn describe_selected(&self) -> Vec<String> {
        self.mapping.describe(self.active_asset(), &self.joints)
    }

    // --- コントロール ---

    pub fn set_strategy(&mut self, strategy: RotationStrategy) {
        if self.strategy != strategy {
            log::info!("Bone rotation strategy changed to: {}", strategy);
        }
        self.strategy = strategy;
    }

    /// 読み込みに失敗したアセットのモードは選べない
    pub fn set_render_mode(&mut self, mode: RenderMode) -> anyhow::Result<()> {
        if let Some(slot) = mode.slot() {
            if let Some(error) = self.disabled.get(slot) {
                bail!("Render mode {} is unavailable: {}", mode, error);
            }
        }
        if self.render_mode != mode {
            log::info!("Render mode changed to: {}", mode);
        }
        self.render_mode = mode;
        Ok(())
    }

    pub fn set_show_rig(&mut self, show: bool) {
        self.show_rig = show;
    }

    pub fn set_markers(&mut self, markers: bool) {
        self.markers = markers;
    }

    /// レスト姿勢の切り替え
    pub fn set_rest(&mut self, resting: bool) {
        if resting == self.rest.is_resting() {
            return;
        }
        self.rest.set(resting, &mut self.calibration);
        if resting {
            self.joints.clear_visibility();
            log::info!("Pose tracking paused (rest pose)");
        } else {
            log::info!("Tracking pose");
        }
    }

    pub fn toggle_rest(&mut self) -> bool {
        let resting = !self.rest.is_resting();
        self.set_rest(resting);
        resting
    }

    /// ワーカースレッドからのアセット通知を反映
    pub fn handle_asset_event(&mut self, event: AssetEvent) {
        match event {
            AssetEvent::Loaded(asset) => {
                let slot = asset.slot;
                log::info!(
                    "{} skeleton asset loaded: {} ({} segments bound, original height {:.3})",
                    slot,
                    asset.id,
                    asset.bound_count(),
                    asset.rest.original_height
                );
                self.disabled.remove(slot);
                self.assets.insert(slot, asset);
            }
            AssetEvent::Failed { slot, error } => {
                log::error!("Failed to load {} skeleton asset: {}", slot, error);
                self.assets.remove(slot);
                self.disabled.insert(slot, error);
                if slot == AssetSlot::Primary {
                    self.render_mode = RenderMode::None;
                    log::warn!("Render mode switched to none");
                }
            }
        }
    }

    // --- tick ---

    /// 1 フレーム分の処理
    pub fn tick(&mut self, source: &mut dyn LandmarkSource, timestamp_ms: f64) -> &FrameOutput {
        self.output.timestamp_ms = timestamp_ms;
        self.output.rig = rig_transform(&self.calibration);

        if self.rest.is_resting() {
            self.apply_rest();
            return &self.output;
        }

        if !source.is_ready() {
            self.output.status = TickStatus::NotReady;
            return &self.output;
        }

        let Some(frame_time) = source.frame_time(timestamp_ms) else {
            self.output.status = TickStatus::NotReady;
            return &self.output;
        };
        if !self.gate.accept(frame_time) {
            self.output.status = TickStatus::Duplicate;
            return &self.output;
        }

        match source.detect(timestamp_ms) {
            Ok(frame) => {
                self.process(frame.as_ref());
            }
            Err(e) => {
                log::warn!("Landmark detection failed: {:#}", e);
                self.output.status = TickStatus::SourceError;
            }
        }
        &self.output
    }

    /// 検出結果 1 件を反映（None はポーズ未検出）
    pub fn process(&mut self, frame: Option<&LandmarkFrame>) -> &FrameOutput {
        self.output.rig = rig_transform(&self.calibration);
        match frame {
            Some(frame) => self.apply_pose(frame),
            None => self.apply_no_pose(),
        }
        &self.output
    }

    fn solver(&self) -> RotationSolver<'_> {
        RotationSolver::new(self.strategy, &self.constraints)
    }

    fn skeleton(&self) -> SkeletonFrame {
        pose_skeleton(&self.joints, &self.solver()).with_overlay(self.show_rig)
    }

    fn apply_pose(&mut self, frame: &LandmarkFrame) {
        self.joints.update(frame, &self.calibration);
        let skeleton = self.skeleton();
        let solver = self.solver();
        let asset = self.active_asset().map(|asset| AssetFrame {
            slot: asset.slot,
            group: Transform::identity(),
            root_position: asset.rest.root_position(),
            visible: true,
            segments: retarget_asset(asset, &self.mapping, &solver, &self.joints, self.markers),
        });
        self.output.status = TickStatus::Tracked;
        self.output.skeleton = skeleton;
        self.output.asset = asset;
    }

    fn apply_no_pose(&mut self) {
        self.joints.clear_visibility();
        self.output.status = TickStatus::NoPose;
        self.output.skeleton = self.skeleton();
        // 最後の姿勢は保持したまま非表示
        if let Some(asset) = self.output.asset.as_mut() {
            asset.visible = false;
            for pose in asset.segments.iter_mut().flatten() {
                pose.marker.visible = false;
            }
        }
    }

    fn apply_rest(&mut self) {
        self.joints.clear_visibility();
        self.output.status = TickStatus::Resting;
        self.output.skeleton = self.skeleton();
        self.output.asset = self.active_asset().map(|asset| AssetFrame {
            slot: asset.slot,
            group: asset.rest.transform,
            root_position: asset.rest.root_position(),
            visible: true,
            segments: rest_poses(asset, self.markers),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetConfig;
    use crate::pose::Landmark;
    use crate::rig::asset::{MeshHierarchy, SubMesh};
    use crate::rig::segment::SEGMENTS;
    use crate::rig::transform::Aabb;
    use anyhow::Result;

    /// 固定フレーム列を返すテスト用ソース
    struct ScriptedSource {
        ready: bool,
        frames: Vec<(f64, Option<LandmarkFrame>)>,
        fail: bool,
        closed: bool,
    }

    impl ScriptedSource {
        fn new(frames: Vec<(f64, Option<LandmarkFrame>)>) -> Self {
            Self {
                ready: true,
                frames,
                fail: false,
                closed: false,
            }
        }
    }

    impl LandmarkSource for ScriptedSource {
        fn is_ready(&self) -> bool {
            self.ready && !self.closed
        }

        fn detect(&mut self, timestamp_ms: f64) -> Result<Option<LandmarkFrame>> {
            if self.fail {
                bail!("detector crashed");
            }
            Ok(self
                .frames
                .iter()
                .rev()
                .find(|(t, _)| *t <= timestamp_ms)
                .and_then(|(_, f)| f.clone()))
        }

        fn frame_time(&self, now_ms: f64) -> Option<f64> {
            self.frames.iter().rev().map(|(t, _)| *t).find(|t| *t <= now_ms)
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn arm_frame() -> LandmarkFrame {
        let mut frame = LandmarkFrame::default();
        frame.landmarks[11] = Some(Landmark::new(0.5, 0.5, 0.0));
        frame.landmarks[13] = Some(Landmark::new(0.5, 0.8, 0.0));
        frame.landmarks[15] = Some(Landmark::new(0.6, 0.9, 0.0));
        frame
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.calibration.smoothing = 0.0;
        config.tracking.show_rig = true;
        config
    }

    fn loaded_asset(slot: AssetSlot) -> BoundAsset {
        let meshes = SEGMENTS
            .iter()
            .take(4)
            .map(|def| SubMesh {
                name: def.name.to_string(),
                transform: Transform::identity(),
                bounds: Aabb::new(Vector3::new(-0.05, -0.05, -0.3), Vector3::new(0.05, 0.05, 0.3)),
            })
            .collect();
        BoundAsset::bind(slot, &AssetConfig::new(slot, "mem"), &MeshHierarchy { meshes })
    }

    #[test]
    fn test_render_mode_names() {
        assert_eq!("asset-alt".parse::<RenderMode>().unwrap(), RenderMode::Alternate);
        assert_eq!(RenderMode::Primary.to_string(), "asset");
        assert!("both".parse::<RenderMode>().is_err());
        assert_eq!(RenderMode::None.slot(), None);
    }

    #[test]
    fn test_tick_tracks_and_rejects_duplicates() {
        let mut engine = RigEngine::new(&config());
        engine.handle_asset_event(AssetEvent::Loaded(loaded_asset(AssetSlot::Primary)));
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame()))]);

        let out = engine.tick(&mut source, 0.0);
        assert_eq!(out.status, TickStatus::Tracked);
        assert!(out.skeleton.visible_bones() >= 2);
        let asset = out.asset.as_ref().unwrap();
        assert!(asset.visible);
        assert!(asset.segments[0].unwrap().tracked);

        // 同じフレーム時刻 → 描画のみ
        let out = engine.tick(&mut source, 16.0);
        assert_eq!(out.status, TickStatus::Duplicate);
        assert!(out.asset.as_ref().unwrap().visible);
    }

    #[test]
    fn test_tick_returns_current_output_after_detect() {
        let mut engine = RigEngine::new(&config());
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame())), (20.0, None)]);

        let tracked = engine.tick(&mut source, 0.0).clone();
        assert_eq!(tracked.status, TickStatus::Tracked);
        assert_eq!(tracked.timestamp_ms, 0.0);
        assert_eq!(&tracked, engine.output());

        source.fail = true;
        let failed = engine.tick(&mut source, 20.0).clone();
        assert_eq!(failed.status, TickStatus::SourceError);
        assert_eq!(failed.timestamp_ms, 20.0);
        assert_eq!(&failed, engine.output());
    }

    #[test]
    fn test_not_ready_source_renders_only() {
        let mut engine = RigEngine::new(&config());
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame()))]);
        source.ready = false;
        let out = engine.tick(&mut source, 0.0);
        assert_eq!(out.status, TickStatus::NotReady);
        assert!(!engine.joints().any_visible());
    }

    #[test]
    fn test_source_error_keeps_state() {
        let mut engine = RigEngine::new(&config());
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame())), (10.0, None)]);
        engine.tick(&mut source, 0.0);
        source.fail = true;
        let out = engine.tick(&mut source, 10.0);
        assert_eq!(out.status, TickStatus::SourceError);
        assert!(engine.joints().is_visible(11));
    }

    #[test]
    fn test_no_pose_hides_asset_and_overlay() {
        let mut engine = RigEngine::new(&config());
        engine.handle_asset_event(AssetEvent::Loaded(loaded_asset(AssetSlot::Primary)));
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame())), (33.0, None)]);
        engine.tick(&mut source, 0.0);
        let out = engine.tick(&mut source, 33.0);
        assert_eq!(out.status, TickStatus::NoPose);
        assert!(!out.asset.as_ref().unwrap().visible);
        assert_eq!(out.skeleton.visible_bones(), 0);
        assert!(!engine.joints().any_visible());
    }

    #[test]
    fn test_rest_pose_uses_rest_transforms_and_restores_calibration() {
        let mut engine = RigEngine::new(&config());
        engine.handle_asset_event(AssetEvent::Loaded(loaded_asset(AssetSlot::Primary)));
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame()))]);
        engine.tick(&mut source, 0.0);

        engine.calibration_mut().position = [3.0, 2.0, 1.0];
        engine.calibration_mut().rotation_deg = [0.0, 45.0, 0.0];
        let before = *engine.calibration();
        assert!(engine.toggle_rest());

        let out = engine.tick(&mut source, 16.0).clone();
        assert_eq!(out.status, TickStatus::Resting);
        assert_eq!(out.rig.position, Vector3::new(0.0, 1.2, 0.0));
        let asset = out.asset.as_ref().unwrap();
        assert!(asset.visible);
        let rest = engine.asset(AssetSlot::Primary).unwrap().segment(0).unwrap();
        assert_eq!(asset.segments[0].unwrap().transform, rest.transform);
        assert!(!engine.joints().any_visible());

        assert!(!engine.toggle_rest());
        assert_eq!(*engine.calibration(), before);
    }

    #[test]
    fn test_primary_failure_switches_to_none() {
        let mut engine = RigEngine::new(&config());
        engine.handle_asset_event(AssetEvent::Failed {
            slot: AssetSlot::Primary,
            error: "missing file".to_string(),
        });
        assert_eq!(engine.render_mode(), RenderMode::None);
        assert!(engine.set_render_mode(RenderMode::Primary).is_err());
        assert!(engine.set_render_mode(RenderMode::Alternate).is_ok());

        // スケルトンはそのまま動く
        let mut source = ScriptedSource::new(vec![(0.0, Some(arm_frame()))]);
        let out = engine.tick(&mut source, 0.0);
        assert_eq!(out.status, TickStatus::Tracked);
        assert!(out.asset.is_none());
        assert!(out.skeleton.visible_bones() > 0);
    }

    #[test]
    fn test_alternate_failure_keeps_mode() {
        let mut engine = RigEngine::new(&config());
        engine.handle_asset_event(AssetEvent::Failed {
            slot: AssetSlot::Alternate,
            error: "bad".to_string(),
        });
        assert_eq!(engine.render_mode(), RenderMode::Primary);
        assert!(engine.is_disabled(AssetSlot::Alternate));
        assert!(engine.set_render_mode(RenderMode::Alternate).is_err());
    }

    #[test]
    fn test_only_selected_asset_is_posed() {
        let mut engine = RigEngine::new(&config());
        engine.handle_asset_event(AssetEvent::Loaded(loaded_asset(AssetSlot::Primary)));
        engine.handle_asset_event(AssetEvent::Loaded(loaded_asset(AssetSlot::Alternate)));
        engine.set_render_mode(RenderMode::Alternate).unwrap();
        let out = engine.process(Some(&arm_frame()));
        assert_eq!(out.asset.as_ref().unwrap().slot, AssetSlot::Alternate);
        engine.set_render_mode(RenderMode::None).unwrap();
        assert!(engine.process(Some(&arm_frame())).asset.is_none());
    }

    #[test]
    fn test_rig_transform_applied_without_pose() {
        let mut config = config();
        config.calibration.position = [1.0, 2.0, 3.0];
        let mut engine = RigEngine::new(&config);
        let mut source = ScriptedSource::new(Vec::new());
        let out = engine.tick(&mut source, 0.0);
        assert_eq!(out.status, TickStatus::NotReady);
        assert_eq!(out.rig.position, Vector3::new(1.0, 2.0, 3.0));
    }
}
