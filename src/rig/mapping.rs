use anyhow::bail;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::pose::{format_landmark, LandmarkIndex};
use crate::tracker::JointStore;

use super::asset::BoundAsset;
use super::segment::{SegmentDef, SEGMENTS, SEGMENT_COUNT};

/// セグメント軸の手動指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisChoice {
    /// バウンディングボックスから自動検出した軸
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "+x")]
    PosX,
    #[serde(rename = "-x")]
    NegX,
    #[serde(rename = "+y")]
    PosY,
    #[serde(rename = "-y")]
    NegY,
    #[serde(rename = "+z")]
    PosZ,
    #[serde(rename = "-z")]
    NegZ,
}

impl AxisChoice {
    /// 固定軸の単位ベクトル。Auto は None
    pub fn vector(self) -> Option<Vector3<f32>> {
        match self {
            Self::Auto => None,
            Self::PosX => Some(Vector3::x()),
            Self::NegX => Some(-Vector3::x()),
            Self::PosY => Some(Vector3::y()),
            Self::NegY => Some(-Vector3::y()),
            Self::PosZ => Some(Vector3::z()),
            Self::NegZ => Some(-Vector3::z()),
        }
    }
}

impl FromStr for AxisChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "+x" | "x" => Ok(Self::PosX),
            "-x" => Ok(Self::NegX),
            "+y" | "y" => Ok(Self::PosY),
            "-y" => Ok(Self::NegY),
            "+z" | "z" => Ok(Self::PosZ),
            "-z" => Ok(Self::NegZ),
            other => bail!("Unknown axis choice: {}", other),
        }
    }
}

impl fmt::Display for AxisChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::PosX => "+x",
            Self::NegX => "-x",
            Self::PosY => "+y",
            Self::NegY => "-y",
            Self::PosZ => "+z",
            Self::NegZ => "-z",
        };
        f.write_str(name)
    }
}

/// セグメント 1 つ分のユーザー上書き
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentOverride {
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub axis: AxisChoice,
    pub notes: String,
}

/// リターゲットで実際に使うマッピング
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveMapping {
    pub start: usize,
    pub end: usize,
    /// None なら自動検出軸
    pub axis: Option<Vector3<f32>>,
}

/// デフォルト・上書き・プレビューフラグから有効マッピングを求める
///
/// プレビューが無効なら上書きは無視される。
pub fn effective_mapping(
    default: &SegmentDef,
    user: &SegmentOverride,
    preview: bool,
) -> EffectiveMapping {
    let (start, end) = (default.start as usize, default.end as usize);
    if !preview {
        return EffectiveMapping {
            start,
            end,
            axis: None,
        };
    }
    EffectiveMapping {
        start: user.start.unwrap_or(start),
        end: user.end.unwrap_or(end),
        axis: user.axis.vector(),
    }
}

/// エクスポート 1 行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRow {
    pub mesh: &'static str,
    pub label: &'static str,
    pub default_start: usize,
    pub default_end: usize,
    pub selected_start: Option<usize>,
    pub selected_end: Option<usize>,
    pub axis: AxisChoice,
    pub notes: String,
}

/// `[x, y, z]`（小数 3 桁）
pub fn format_vector(v: &Vector3<f32>) -> String {
    format!("[{:.3}, {:.3}, {:.3}]", v.x, v.y, v.z)
}

/// ジョイント→セグメント対応のインスペクタ状態
#[derive(Debug, Clone)]
pub struct MappingTable {
    overrides: Vec<SegmentOverride>,
    preview: bool,
    selected: usize,
    open: bool,
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            overrides: vec![SegmentOverride::default(); SEGMENT_COUNT],
            preview: false,
            selected: 0,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    /// 閉じるとプレビューも解除される
    pub fn close(&mut self) {
        self.open = false;
        self.preview = false;
    }

    pub fn preview(&self) -> bool {
        self.preview
    }

    pub fn set_preview(&mut self, preview: bool) {
        self.preview = preview;
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_def(&self) -> &'static SegmentDef {
        &SEGMENTS[self.selected]
    }

    pub fn select(&mut self, index: usize) {
        if index < SEGMENT_COUNT {
            self.selected = index;
        }
    }

    pub fn next(&mut self) -> usize {
        self.selected = (self.selected + 1) % SEGMENT_COUNT;
        self.selected
    }

    pub fn prev(&mut self) -> usize {
        self.selected = (self.selected + SEGMENT_COUNT - 1) % SEGMENT_COUNT;
        self.selected
    }

    pub fn user(&self, index: usize) -> Option<&SegmentOverride> {
        self.overrides.get(index)
    }

    /// 選択中セグメントの始点・終点ジョイントを上書き
    pub fn set_mapping(&mut self, start: usize, end: usize) -> anyhow::Result<()> {
        if start >= LandmarkIndex::COUNT || end >= LandmarkIndex::COUNT {
            bail!("Landmark index out of range: {} -> {}", start, end);
        }
        let user = &mut self.overrides[self.selected];
        user.start = Some(start);
        user.end = Some(end);
        Ok(())
    }

    pub fn set_axis(&mut self, axis: AxisChoice) {
        self.overrides[self.selected].axis = axis;
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.overrides[self.selected].notes = notes.to_string();
    }

    pub fn effective(&self, index: usize) -> EffectiveMapping {
        let default = &SEGMENTS[index % SEGMENT_COUNT];
        match self.overrides.get(index) {
            Some(user) => effective_mapping(default, user, self.preview),
            None => effective_mapping(default, &SegmentOverride::default(), false),
        }
    }

    /// 全セグメントの現在の状態
    pub fn export(&self) -> Vec<MappingRow> {
        SEGMENTS
            .iter()
            .zip(&self.overrides)
            .map(|(def, user)| MappingRow {
                mesh: def.name,
                label: def.label,
                default_start: def.start as usize,
                default_end: def.end as usize,
                selected_start: user.start,
                selected_end: user.end,
                axis: user.axis,
                notes: user.notes.clone(),
            })
            .collect()
    }

    /// 選択中セグメントの情報表示
    pub fn describe(&self, asset: Option<&BoundAsset>, joints: &JointStore) -> Vec<String> {
        let index = self.selected;
        let def = &SEGMENTS[index];
        let user = &self.overrides[index];
        let selected_start = user.start.unwrap_or(def.start as usize);
        let selected_end = user.end.unwrap_or(def.end as usize);
        let mapping = self.effective(index);
        let rest = asset.and_then(|a| a.segment(index));

        let mut lines = vec![
            format!("Segment {} / {}: {} ({})", index + 1, SEGMENT_COUNT, def.name, def.label),
            format!(
                "Default mapping: {} -> {}",
                format_landmark(def.start as usize),
                format_landmark(def.end as usize)
            ),
            format!(
                "Selected mapping: {} -> {}, {}",
                format_landmark(selected_start),
                format_landmark(selected_end),
                if self.preview { "applied" } else { "not applied" }
            ),
        ];

        match rest {
            Some(rest) => {
                let axis = mapping.axis.unwrap_or(rest.axis);
                lines.push(format!(
                    "Axis (current): {}, selection: {}",
                    format_vector(&axis),
                    user.axis
                ));
                lines.push(format!("Rest length: {:.3} units", rest.rest_length));
                let pivot = format_vector(&rest.transform.position);
                lines.push(format!("Rest pivot (loaded): {}", pivot));
                lines.push(format!("Rest bbox size: {}", format_vector(&rest.bounds_size)));
            }
            None => {
                lines.push(format!("Axis selection: {}", user.axis));
                lines.push("Mesh handle missing, confirm name in asset.".to_string());
            }
        }

        match (joints.visible_position(selected_start), joints.visible_position(selected_end)) {
            (Some(start), Some(end)) => {
                lines.push(format!("Live joint delta: {}", format_vector(&(end - start))));
            }
            _ => lines.push(
                "Live joint delta: unavailable (pose not detected for both joints)".to_string(),
            ),
        }

        if !user.notes.is_empty() {
            lines.push(format!("Notes: {}", user.notes));
        }
        lines
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_off_ignores_overrides() {
        let def = &SEGMENTS[0];
        let user = SegmentOverride {
            start: Some(12),
            end: Some(14),
            axis: AxisChoice::NegZ,
            notes: String::new(),
        };
        let m = effective_mapping(def, &user, false);
        assert_eq!((m.start, m.end), (def.start as usize, def.end as usize));
        assert!(m.axis.is_none());

        let m = effective_mapping(def, &user, true);
        assert_eq!((m.start, m.end), (12, 14));
        assert_eq!(m.axis, Some(-Vector3::z()));
    }

    #[test]
    fn test_partial_override_keeps_default_end() {
        let def = &SEGMENTS[3];
        let user = SegmentOverride {
            start: Some(0),
            ..Default::default()
        };
        let m = effective_mapping(def, &user, true);
        assert_eq!(m.start, 0);
        assert_eq!(m.end, def.end as usize);
        assert!(m.axis.is_none());
    }

    #[test]
    fn test_navigation_wraps() {
        let mut table = MappingTable::new();
        assert_eq!(table.prev(), SEGMENT_COUNT - 1);
        assert_eq!(table.next(), 0);
        assert_eq!(table.next(), 1);
        table.select(SEGMENT_COUNT);
        assert_eq!(table.selected(), 1);
    }

    #[test]
    fn test_close_clears_preview() {
        let mut table = MappingTable::new();
        table.open();
        table.set_preview(true);
        table.close();
        assert!(!table.is_open());
        assert!(!table.preview());
    }

    #[test]
    fn test_set_mapping_validates() {
        let mut table = MappingTable::new();
        assert!(table.set_mapping(11, 40).is_err());
        table.set_mapping(12, 14).unwrap();
        assert_eq!(table.user(0).unwrap().start, Some(12));
        // プレビュー無効の間は反映されない
        assert_eq!(table.effective(0).start, SEGMENTS[0].start as usize);
        table.set_preview(true);
        assert_eq!(table.effective(0).start, 12);
    }

    #[test]
    fn test_export_rows() {
        let mut table = MappingTable::new();
        table.select(2);
        table.set_axis(AxisChoice::PosX);
        table.set_notes("palm faces inward");
        let rows = table.export();
        assert_eq!(rows.len(), SEGMENT_COUNT);
        assert_eq!(rows[2].mesh, SEGMENTS[2].name);
        assert_eq!(rows[2].axis, AxisChoice::PosX);
        assert_eq!(rows[2].notes, "palm faces inward");
        assert_eq!(rows[0].selected_start, None);

        let json = serde_json::to_string(&rows[2]).unwrap();
        assert!(json.contains("\"axis\":\"+x\""));
    }

    #[test]
    fn test_axis_choice_parse() {
        assert_eq!("auto".parse::<AxisChoice>().unwrap(), AxisChoice::Auto);
        assert_eq!("-y".parse::<AxisChoice>().unwrap(), AxisChoice::NegY);
        assert_eq!("z".parse::<AxisChoice>().unwrap(), AxisChoice::PosZ);
        assert!("w".parse::<AxisChoice>().is_err());
        assert_eq!(AxisChoice::NegX.to_string(), "-x");
    }

    #[test]
    fn test_describe_without_asset_or_pose() {
        let table = MappingTable::new();
        let lines = table.describe(None, &JointStore::new());
        assert!(lines[1].starts_with("Default mapping: 11 Left shoulder -> 13 Left elbow"));
        assert!(lines.iter().any(|l| l.contains("Mesh handle missing")));
        assert!(lines.iter().any(|l| l.contains("unavailable")));
    }

    #[test]
    fn test_describe_live_delta() {
        let mut joints = JointStore::new();
        joints.set(11, Vector3::new(0.0, 0.0, 0.0), true);
        joints.set(13, Vector3::new(0.0, -1.0, 0.0), true);
        let lines = MappingTable::new().describe(None, &joints);
        assert!(lines.contains(&"Live joint delta: [0.000, -1.000, 0.000]".to_string()));
    }
}
