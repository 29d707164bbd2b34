use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use crate::render::skeleton::{
    bone_segments, joint_points, segment_points, Projection, BONE_COLOR, JOINT_COLOR, MARKER_COLOR,
    SEGMENT_COLOR,
};
use crate::rig::FrameOutput;

/// 背景色 (RGB)
const BACKGROUND: u32 = 0x101418;

/// minifbを使用したデバッグビュー
pub struct MinifbRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    projection: Projection,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![BACKGROUND; width * height],
            width,
            height,
            projection: Projection::new(width, height),
        })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn clear(&mut self) {
        self.buffer.fill(BACKGROUND);
    }

    /// エンジンの出力を描画
    pub fn draw_output(&mut self, output: &FrameOutput) {
        let projection = self.projection;

        for (origin, tip, marker) in segment_points(output) {
            let (x0, y0) = projection.to_pixel(&origin);
            let (x1, y1) = projection.to_pixel(&tip);
            self.draw_line(x0, y0, x1, y1, SEGMENT_COLOR);
            if marker {
                self.draw_circle(x0, y0, 3, MARKER_COLOR);
            }
        }

        // 骨格線
        for (start, end) in bone_segments(output) {
            let (x1, y1) = projection.to_pixel(&start);
            let (x2, y2) = projection.to_pixel(&end);
            self.draw_line(x1, y1, x2, y2, BONE_COLOR);
        }

        for joint in joint_points(output) {
            let (px, py) = projection.to_pixel(&joint);
            self.draw_circle(px, py, 3, JOINT_COLOR);
        }
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    /// Bresenhamのアルゴリズムで線を描画
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        // 画面から大きく外れた線は描かない
        if !self.near_view(x0, y0) || !self.near_view(x1, y1) {
            return;
        }
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn near_view(&self, x: i32, y: i32) -> bool {
        let (w, h) = (self.width as i32, self.height as i32);
        x > -w && x < 2 * w && y > -h && y < 2 * h
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}
