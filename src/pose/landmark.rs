use serde::{Deserialize, Serialize};

/// ポーズランドマーク検出器の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// 表示用ラベル（インデックス順）
const LABELS: [&str; LandmarkIndex::COUNT] = [
    "Nose",
    "Left eye inner",
    "Left eye",
    "Left eye outer",
    "Right eye inner",
    "Right eye",
    "Right eye outer",
    "Left ear",
    "Right ear",
    "Mouth left",
    "Mouth right",
    "Left shoulder",
    "Right shoulder",
    "Left elbow",
    "Right elbow",
    "Left wrist",
    "Right wrist",
    "Left pinky",
    "Right pinky",
    "Left index",
    "Right index",
    "Left thumb",
    "Right thumb",
    "Left hip",
    "Right hip",
    "Left knee",
    "Right knee",
    "Left ankle",
    "Right ankle",
    "Left heel",
    "Right heel",
    "Left foot index",
    "Right foot index",
];

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkIndex; LandmarkIndex::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        LABELS[self as usize]
    }
}

/// インデックスを "11 Left shoulder" 形式で表示。範囲外は "Unknown"
pub fn format_landmark(index: usize) -> String {
    match LandmarkIndex::from_index(index) {
        Some(lm) => format!("{} {}", index, lm.label()),
        None => format!("{} Unknown", index),
    }
}

/// 単一ランドマーク
///
/// x, y は画像正規化座標 (0.0〜1.0、y は下向き)、z は相対深度（範囲なし）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Landmark {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Landmark> for [f32; 3] {
    fn from(lm: Landmark) -> Self {
        [lm.x, lm.y, lm.z]
    }
}

/// 1フレーム分の 33 ランドマーク。未検出のスロットは None
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub landmarks: [Option<Landmark>; LandmarkIndex::COUNT],
}

impl LandmarkFrame {
    pub fn new(landmarks: [Option<Landmark>; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// 可変長の入力から構築。不足分は未検出、超過分は無視
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = Option<Landmark>>,
    {
        let mut landmarks = [None; LandmarkIndex::COUNT];
        for (slot, sample) in landmarks.iter_mut().zip(samples) {
            *slot = sample;
        }
        Self { landmarks }
    }

    /// インデックスでランドマークを取得
    pub fn get(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.landmarks[index as usize].as_ref()
    }

    /// 検出されたランドマーク数
    pub fn present_count(&self) -> usize {
        self.landmarks.iter().filter(|l| l.is_some()).count()
    }
}

impl Default for LandmarkFrame {
    fn default() -> Self {
        Self {
            landmarks: [None; LandmarkIndex::COUNT],
        }
    }
}
