use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::landmark::{Landmark, LandmarkFrame};

/// ランドマーク検出器の抽象化
///
/// フレームループから 1 tick に 1 回だけ、単調増加のタイムスタンプで呼ばれる。
pub trait LandmarkSource {
    /// 検出器とキャプチャの準備ができているか
    fn is_ready(&self) -> bool;

    /// 指定タイムスタンプのフレームを検出する。
    /// Ok(None) はポーズ未検出（0人）。
    fn detect(&mut self, timestamp_ms: f64) -> Result<Option<LandmarkFrame>>;

    /// `now_ms` 時点で取得できる最新フレームのタイムスタンプ。
    /// 前回と同じ値なら新フレームなし、None ならまだ 1 フレームもない
    fn frame_time(&self, now_ms: f64) -> Option<f64>;

    /// 検出器とキャプチャを解放する。何度呼んでもよい
    fn close(&mut self);
}

/// 重複タイムスタンプを「新フレームなし」として弾くゲート
#[derive(Debug, Default)]
pub struct FrameGate {
    last: Option<f64>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// 新しいフレームなら true を返して記録する
    pub fn accept(&mut self, timestamp: f64) -> bool {
        match self.last {
            Some(last) if timestamp <= last => false,
            _ => {
                self.last = Some(timestamp);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    t: f64,
    landmarks: Option<Vec<Option<Landmark>>>,
}

/// JSON Lines 形式の記録を再生するソース
///
/// 1行 = `{"t": <ms>, "landmarks": [[x, y, z] | null, ...] | null}`
#[derive(Debug)]
pub struct ReplaySource {
    frames: Vec<RecordedFrame>,
    cursor: usize,
    closed: bool,
}

impl ReplaySource {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read replay {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: RecordedFrame = serde_json::from_str(line)
                .with_context(|| format!("Invalid replay frame at line {}", line_no + 1))?;
            frames.push(frame);
        }
        Ok(Self {
            frames,
            cursor: 0,
            closed: false,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 全フレームを消費したか
    pub fn is_finished(&self) -> bool {
        self.closed || self.cursor >= self.frames.len()
    }
}

impl LandmarkSource for ReplaySource {
    fn is_ready(&self) -> bool {
        !self.closed
    }

    fn detect(&mut self, timestamp_ms: f64) -> Result<Option<LandmarkFrame>> {
        if self.closed {
            anyhow::bail!("replay source is closed");
        }
        // timestamp以下の最新フレームまで進める
        let mut result = None;
        while let Some(frame) = self.frames.get(self.cursor) {
            if frame.t > timestamp_ms {
                break;
            }
            result = Some(
                frame
                    .landmarks
                    .as_ref()
                    .map(|lms| LandmarkFrame::from_samples(lms.iter().copied())),
            );
            self.cursor += 1;
        }
        Ok(result.flatten())
    }

    fn frame_time(&self, now_ms: f64) -> Option<f64> {
        if self.closed {
            return None;
        }
        let consumed = self.cursor.checked_sub(1).and_then(|i| self.frames.get(i)).map(|f| f.t);
        self.frames[self.cursor..]
            .iter()
            .take_while(|f| f.t <= now_ms)
            .last()
            .map(|f| f.t)
            .or(consumed)
    }

    fn close(&mut self) {
        self.closed = true;
        self.frames.clear();
        self.cursor = 0;
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.close();
    }
}
