//! PNG rendering of the ROC and calibration diagnostics.
//!
//! Both charts share one layout: a unit square plot area, a dashed
//! reference diagonal, light gridlines every 0.1, and the curve drawn as a
//! polyline with square markers at each point.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use std::path::Path;

use super::metrics::{CalibrationBin, RocPoint};

pub mod colors {
    use image::Rgb;

    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    pub const GRID: Rgb<u8> = Rgb([225, 225, 225]);
    pub const REFERENCE: Rgb<u8> = Rgb([120, 120, 120]);
    pub const BLUE: Rgb<u8> = Rgb([33, 150, 243]);
    pub const ORANGE: Rgb<u8> = Rgb([255, 152, 0]);
}

#[derive(Debug, Clone)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub background: Rgb<u8>,
    pub line_color: Rgb<u8>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            margin: 48,
            background: colors::WHITE,
            line_color: colors::BLUE,
        }
    }
}

struct Chart {
    img: RgbImage,
    config: ChartConfig,
}

impl Chart {
    fn new(config: ChartConfig) -> Self {
        let img = RgbImage::from_pixel(config.width, config.height, config.background);
        let mut chart = Chart { img, config };
        chart.draw_frame();
        chart
    }

    /// Map unit-square coordinates to pixel coordinates (y grows upward).
    fn to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let m = self.config.margin as f64;
        let w = self.config.width as f64 - 2.0 * m;
        let h = self.config.height as f64 - 2.0 * m;
        let px = m + x.clamp(0.0, 1.0) * w;
        let py = self.config.height as f64 - m - y.clamp(0.0, 1.0) * h;
        (px.round() as i64, py.round() as i64)
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Bresenham line; `dash` > 0 skips alternating runs of that many pixels.
    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Rgb<u8>, dash: u32) {
        let (mut x0, mut y0) = self.to_pixel(from.0, from.1);
        let (x1, y1) = self.to_pixel(to.0, to.1);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut step = 0u32;
        loop {
            if dash == 0 || (step / dash) % 2 == 0 {
                self.put(x0, y0, color);
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
            step += 1;
        }
    }

    fn marker(&mut self, at: (f64, f64), color: Rgb<u8>) {
        let (cx, cy) = self.to_pixel(at.0, at.1);
        for dy in -3..=3 {
            for dx in -3..=3 {
                self.put(cx + dx, cy + dy, color);
            }
        }
    }

    fn draw_frame(&mut self) {
        for k in 1..10 {
            let t = k as f64 / 10.0;
            self.line((t, 0.0), (t, 1.0), colors::GRID, 0);
            self.line((0.0, t), (1.0, t), colors::GRID, 0);
        }
        self.line((0.0, 0.0), (1.0, 0.0), colors::BLACK, 0);
        self.line((0.0, 0.0), (0.0, 1.0), colors::BLACK, 0);
        self.line((1.0, 0.0), (1.0, 1.0), colors::BLACK, 0);
        self.line((0.0, 1.0), (1.0, 1.0), colors::BLACK, 0);
        self.line((0.0, 0.0), (1.0, 1.0), colors::REFERENCE, 6);
    }

    fn polyline(&mut self, points: &[(f64, f64)], markers: bool) {
        let color = self.config.line_color;
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color, 0);
        }
        if markers {
            for &pt in points {
                self.marker(pt, color);
            }
        }
    }
}

/// ROC curve: false positive rate on x, true positive rate on y.
pub fn render_roc(points: &[RocPoint], config: ChartConfig) -> RgbImage {
    let mut chart = Chart::new(config);
    let pts: Vec<(f64, f64)> = points.iter().map(|p| (p.fpr, p.tpr)).collect();
    chart.polyline(&pts, false);
    chart.img
}

/// Reliability curve: mean predicted probability on x, observed frequency on y.
pub fn render_calibration(bins: &[CalibrationBin], config: ChartConfig) -> RgbImage {
    let mut chart = Chart::new(ChartConfig {
        line_color: colors::ORANGE,
        ..config
    });
    let pts: Vec<(f64, f64)> = bins
        .iter()
        .map(|b| (b.mean_predicted, b.fraction_positive))
        .collect();
    chart.polyline(&pts, true);
    chart.img
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("failed to write image {}", path.display()))
}
