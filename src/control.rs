//! Calibration and inspector controls.
//!
//! Commands arrive as text lines (console or any other front end), are parsed
//! off the frame loop and applied at the start of the next tick.

use anyhow::{bail, Context, Result};
use std::str::FromStr;

use crate::rig::{AxisChoice, RenderMode, RigEngine, RotationStrategy};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// レスト姿勢の切り替え
    Rest,
    Smoothing(f32),
    Scale([f32; 3]),
    Mirror(bool),
    Position([f32; 3]),
    Rotation([f32; 3]),
    Strategy(RotationStrategy),
    Mode(RenderMode),
    /// 合成スケルトンの重ね表示
    Rig(bool),
    Markers(bool),
    /// 選択中セグメントの始点・終点
    Map(usize, usize),
    Axis(AxisChoice),
    Note(String),
    Next,
    Prev,
    Preview(bool),
    /// インスペクタの開閉（閉じるとプレビュー解除）
    Inspect(bool),
    Dump,
    Quit,
}

fn parse_switch(arg: Option<&str>) -> Result<bool> {
    match arg {
        Some("on") | Some("true") | Some("1") => Ok(true),
        Some("off") | Some("false") | Some("0") => Ok(false),
        Some(other) => bail!("Expected on/off, got: {}", other),
        None => bail!("Expected on/off"),
    }
}

fn parse_f32(arg: Option<&str>) -> Result<f32> {
    let s = arg.context("Missing number")?;
    s.parse::<f32>().with_context(|| format!("Invalid number: {}", s))
}

fn parse_vec3<'a, I: Iterator<Item = &'a str>>(args: &mut I) -> Result<[f32; 3]> {
    Ok([parse_f32(args.next())?, parse_f32(args.next())?, parse_f32(args.next())?])
}

fn parse_index(arg: Option<&str>) -> Result<usize> {
    let s = arg.context("Missing landmark index")?;
    s.parse::<usize>().with_context(|| format!("Invalid landmark index: {}", s))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let mut args = rest.split_whitespace();
        let command = match name {
            "rest" => Self::Rest,
            "smoothing" => Self::Smoothing(parse_f32(args.next())?),
            "scale" => Self::Scale(parse_vec3(&mut args)?),
            "mirror" => Self::Mirror(parse_switch(args.next())?),
            "position" => Self::Position(parse_vec3(&mut args)?),
            "rotation" => Self::Rotation(parse_vec3(&mut args)?),
            "strategy" => Self::Strategy(args.next().context("Missing strategy")?.parse()?),
            "mode" => Self::Mode(args.next().context("Missing render mode")?.parse()?),
            "rig" => Self::Rig(parse_switch(args.next())?),
            "markers" => Self::Markers(parse_switch(args.next())?),
            "map" => Self::Map(parse_index(args.next())?, parse_index(args.next())?),
            "axis" => Self::Axis(args.next().context("Missing axis")?.parse()?),
            "note" => Self::Note(rest.trim().to_string()),
            "next" => Self::Next,
            "prev" => Self::Prev,
            "preview" => Self::Preview(parse_switch(args.next())?),
            "inspect" => Self::Inspect(parse_switch(args.next())?),
            "dump" => Self::Dump,
            "quit" | "exit" => Self::Quit,
            "" => bail!("Empty command"),
            other => bail!("Unknown command: {}", other),
        };
        Ok(command)
    }
}

impl Command {
    /// エンジンに適用し、表示用メッセージを返す
    pub fn apply(&self, engine: &mut RigEngine) -> Result<Option<String>> {
        let message = match self {
            Self::Rest => {
                let resting = engine.toggle_rest();
                Some(format!("Rest pose: {}", if resting { "on" } else { "off" }))
            }
            Self::Smoothing(v) => {
                engine.calibration_mut().smoothing = *v;
                Some(format!("Smoothing: {:.2}", engine.calibration().clamped_smoothing()))
            }
            Self::Scale(v) => {
                engine.calibration_mut().scale = *v;
                None
            }
            Self::Mirror(on) => {
                engine.calibration_mut().mirror = *on;
                None
            }
            Self::Position(v) => {
                engine.calibration_mut().position = *v;
                None
            }
            Self::Rotation(v) => {
                engine.calibration_mut().rotation_deg = *v;
                None
            }
            Self::Strategy(s) => {
                engine.set_strategy(*s);
                None
            }
            Self::Mode(m) => {
                engine.set_render_mode(*m)?;
                None
            }
            Self::Rig(on) => {
                engine.set_show_rig(*on);
                None
            }
            Self::Markers(on) => {
                engine.set_markers(*on);
                None
            }
            Self::Map(start, end) => {
                engine.mapping_mut().open();
                engine.mapping_mut().set_mapping(*start, *end)?;
                Some(engine.describe_selected().join("\n"))
            }
            Self::Axis(axis) => {
                engine.mapping_mut().open();
                engine.mapping_mut().set_axis(*axis);
                Some(engine.describe_selected().join("\n"))
            }
            Self::Note(text) => {
                engine.mapping_mut().set_notes(text);
                None
            }
            Self::Next => {
                engine.mapping_mut().open();
                engine.mapping_mut().next();
                Some(engine.describe_selected().join("\n"))
            }
            Self::Prev => {
                engine.mapping_mut().open();
                engine.mapping_mut().prev();
                Some(engine.describe_selected().join("\n"))
            }
            Self::Preview(on) => {
                engine.mapping_mut().set_preview(*on);
                Some(format!("Mapping preview: {}", if *on { "applied" } else { "not applied" }))
            }
            Self::Inspect(true) => {
                engine.mapping_mut().open();
                Some(engine.describe_selected().join("\n"))
            }
            Self::Inspect(false) => {
                engine.mapping_mut().close();
                Some("Inspector closed".to_string())
            }
            Self::Dump => Some(
                serde_json::to_string_pretty(&engine.mapping().export())
                    .context("Failed to export mapping")?,
            ),
            Self::Quit => None,
        };
        Ok(message)
    }
}
