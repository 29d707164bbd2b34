//! Asset loading and segment binding.
//!
//! Mesh import runs on a worker thread. The frame loop only ever sees a
//! [`BoundAsset`] whose every segment is fully initialised: it arrives whole in a
//! single [`AssetEvent::Loaded`] message.

use anyhow::{bail, Context, Result};
use nalgebra::Vector3;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::config::AssetConfig;

use super::segment::{geometry_correction, AssetSlot, SegmentDef, SegmentRest, SEGMENTS};
use super::transform::{Aabb, Transform};

/// ピボットを置く高さ（バウンディングボックス高さに対する比率）
const PIVOT_HEIGHT_RATIO: f32 = 0.53;

const MIN_HEIGHT: f32 = 1e-3;

/// 名前付きサブメッシュ
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubMesh {
    pub name: String,
    /// 親空間でのレスト変換
    #[serde(default)]
    pub transform: Transform,
    /// ジオメトリのローカル境界
    pub bounds: Aabb,
}

impl SubMesh {
    /// 親空間での境界
    pub fn placed_bounds(&self) -> Aabb {
        self.bounds.map_corners(|p| self.transform.transform_point(p))
    }
}

/// ローダーが返すメッシュ階層
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MeshHierarchy {
    pub meshes: Vec<SubMesh>,
}

impl MeshHierarchy {
    pub fn find(&self, name: &str) -> Option<&SubMesh> {
        self.meshes.iter().find(|m| m.name == name)
    }

    /// 全サブメッシュを包む境界
    pub fn bounds(&self) -> Option<Aabb> {
        let placed: Vec<Aabb> = self.meshes.iter().map(SubMesh::placed_bounds).collect();
        let corners: Vec<Vector3<f32>> = placed.iter().flat_map(|b| [b.min, b.max]).collect();
        Aabb::from_points(corners.iter())
    }
}

/// アセット識別子からメッシュ階層を読み込む
pub trait AssetLoader: Send + Sync {
    fn load(&self, id: &str) -> Result<MeshHierarchy>;
}

/// JSON で書き出したメッシュ階層を読むローダー
///
/// ```text
/// { "meshes": [ { "name": "object_1", "transform": {...},
///                 "bounds": { "min": [..], "max": [..] } } ] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonMeshLoader;

impl JsonMeshLoader {
    pub fn parse(content: &str) -> Result<MeshHierarchy> {
        let hierarchy: MeshHierarchy =
            serde_json::from_str(content).context("Failed to parse mesh hierarchy")?;
        if hierarchy.meshes.is_empty() {
            bail!("Mesh hierarchy contains no sub-meshes");
        }
        Ok(hierarchy)
    }
}

impl AssetLoader for JsonMeshLoader {
    fn load(&self, id: &str) -> Result<MeshHierarchy> {
        let content = fs::read_to_string(Path::new(id))
            .with_context(|| format!("Failed to read asset {}", id))?;
        Self::parse(&content).with_context(|| format!("Invalid asset {}", id))
    }
}

/// アセット全体のレスト配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetRest {
    /// アセットグループのレスト変換
    pub transform: Transform,
    /// ルートから差し引いたピボット（水平中心、高さ 53%）
    pub pivot_offset: Vector3<f32>,
    pub original_height: f32,
    /// ピボットから足元までの高さ
    pub foot_offset: f32,
}

impl AssetRest {
    pub fn from_bounds(bounds: &Aabb) -> Self {
        let size = bounds.size();
        let center = bounds.center();
        let pivot_y = bounds.min.y + size.y * PIVOT_HEIGHT_RATIO;
        Self {
            transform: Transform::identity(),
            pivot_offset: Vector3::new(center.x, pivot_y, center.z),
            original_height: size.y.max(MIN_HEIGHT),
            foot_offset: (pivot_y - bounds.min.y).max(MIN_HEIGHT),
        }
    }

    /// ルートオブジェクトの位置（ピボットを原点へ）
    pub fn root_position(&self) -> Vector3<f32> {
        -self.pivot_offset
    }
}

/// 初期化済みのセグメントバインディング一式
#[derive(Debug, Clone)]
pub struct BoundAsset {
    pub slot: AssetSlot,
    pub id: String,
    pub rest: AssetRest,
    /// `SEGMENTS` と同じ順。見つからなかった名前は None
    pub segments: Vec<Option<SegmentRest>>,
}

impl BoundAsset {
    /// メッシュ階層をセグメントテーブルに名前で束縛
    ///
    /// 見つからない名前は 1 回だけ警告し、以後アニメーションしない。
    pub fn bind(slot: AssetSlot, profile: &AssetConfig, hierarchy: &MeshHierarchy) -> Self {
        let bounds = hierarchy
            .bounds()
            .unwrap_or_else(|| Aabb::new(Vector3::zeros(), Vector3::zeros()));
        let rest = AssetRest::from_bounds(&bounds);

        let segments = SEGMENTS
            .iter()
            .map(|def| match hierarchy.find(def.name) {
                Some(mesh) => Some(SegmentRest::capture(
                    mesh.transform,
                    &mesh.bounds,
                    geometry_correction(profile, def.name),
                )),
                None => {
                    log::warn!(
                        "Segment mesh \"{}\" not found in {} asset {}",
                        def.name,
                        slot,
                        profile.id
                    );
                    None
                }
            })
            .collect();

        Self {
            slot,
            id: profile.id.clone(),
            rest,
            segments,
        }
    }

    pub fn segment(&self, index: usize) -> Option<&SegmentRest> {
        self.segments.get(index).and_then(|s| s.as_ref())
    }

    pub fn bound_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_some()).count()
    }

    /// 定義と束縛済みレストの組
    pub fn bindings(&self) -> impl Iterator<Item = (usize, &SegmentDef, Option<&SegmentRest>)> {
        SEGMENTS
            .iter()
            .enumerate()
            .map(move |(i, def)| (i, def, self.segment(i)))
    }
}

/// ワーカースレッドからフレームループへの通知
#[derive(Debug)]
pub enum AssetEvent {
    Loaded(BoundAsset),
    Failed { slot: AssetSlot, error: String },
}

impl AssetEvent {
    pub fn slot(&self) -> AssetSlot {
        match self {
            Self::Loaded(asset) => asset.slot,
            Self::Failed { slot, .. } => *slot,
        }
    }
}

/// 同期的に読み込んで束縛する
pub fn load_asset(loader: &dyn AssetLoader, profile: &AssetConfig) -> Result<BoundAsset> {
    let hierarchy = loader.load(&profile.id)?;
    Ok(BoundAsset::bind(profile.slot, profile, &hierarchy))
}

/// ワーカースレッドで読み込み、完了時に 1 回だけイベントを送る
pub fn spawn_asset_load(
    loader: Arc<dyn AssetLoader>,
    profile: AssetConfig,
    tx: mpsc::Sender<AssetEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let slot = profile.slot;
        let event = match load_asset(loader.as_ref(), &profile) {
            Ok(asset) => AssetEvent::Loaded(asset),
            Err(e) => AssetEvent::Failed {
                slot,
                error: format!("{:#}", e),
            },
        };
        // 受信側が先に終了していても問題ない
        let _ = tx.send(event);
    })
}
