//! Freehand ink layer: a raster surface composited above the base image but
//! independent of the percentage-positioned elements.
//!
//! The backing buffer is allocated at the on-screen size of the rendered base
//! image the moment the first stroke starts, and is never re-sized afterwards
//! (ink is resolution-coupled). Each segment is painted eagerly as the gesture
//! proceeds; there is no commit/replay step. Committed strokes are kept as an
//! ordered list but are immutable: "clear" is the only way to remove ink.

use image::{Rgba, RgbaImage};

use crate::model::{Color4, InkStroke};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum PenState {
    #[default]
    Up,
    Down,
}

#[derive(Debug)]
pub struct InkSurface {
    raster: Option<RgbaImage>,
    strokes: Vec<InkStroke>,
    pen: PenState,
    current: Vec<(f32, f32)>,
    pub color: Color4,
    pub width: f32,
    dirty: bool,
}

impl Default for InkSurface {
    fn default() -> Self {
        Self {
            raster: None,
            strokes: Vec::new(),
            pen: PenState::Up,
            current: Vec::new(),
            color: Color4::default(),
            width: 4.0,
            dirty: false,
        }
    }
}

impl InkSurface {
    pub fn new(color: Color4, width: f32) -> Self {
        Self {
            color,
            width,
            ..Self::default()
        }
    }

    pub fn raster(&self) -> Option<&RgbaImage> {
        self.raster.as_ref()
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn strokes(&self) -> &[InkStroke] {
        &self.strokes
    }

    pub fn pen_down(&self) -> bool {
        self.pen == PenState::Down
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.pen == PenState::Up
    }

    /// True once since the last call if the raster changed and any cached
    /// texture needs refreshing.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Pen-down. `surface_size` is the current on-screen pixel size of the
    /// rendered base image; it is only honored for the very first stroke,
    /// when the raster gets allocated.
    pub fn begin_stroke(&mut self, pos: (f32, f32), surface_size: (u32, u32)) {
        if self.raster.is_none() {
            let (w, h) = (surface_size.0.max(1), surface_size.1.max(1));
            self.raster = Some(RgbaImage::new(w, h));
        }
        self.pen = PenState::Down;
        self.current.clear();
        self.current.push(pos);
        // A single point still leaves a dot.
        self.paint_segment(pos, pos);
    }

    /// Pen-move: paints the segment from the previous point immediately.
    /// Without a pen down this is a stray event and ignored.
    pub fn extend_stroke(&mut self, pos: (f32, f32)) {
        if self.pen != PenState::Down {
            return;
        }
        let prev = *self.current.last().unwrap_or(&pos);
        self.paint_segment(prev, pos);
        self.current.push(pos);
    }

    /// Pen-up: commits the gesture's points to the stroke list.
    pub fn end_stroke(&mut self) {
        if self.pen != PenState::Down {
            return;
        }
        self.pen = PenState::Up;
        let points = std::mem::take(&mut self.current);
        self.strokes.push(InkStroke {
            points,
            color: self.color,
            width: self.width,
        });
    }

    /// Wipes the raster to transparent and discards the stroke list.
    pub fn clear(&mut self) {
        if let Some(raster) = &mut self.raster {
            for px in raster.pixels_mut() {
                *px = Rgba([0, 0, 0, 0]);
            }
        }
        self.strokes.clear();
        self.current.clear();
        self.pen = PenState::Up;
        self.dirty = true;
    }

    fn paint_segment(&mut self, a: (f32, f32), b: (f32, f32)) {
        let color = self.color.to_rgba8();
        let width = self.width;
        if let Some(raster) = &mut self.raster {
            stamp_line(raster, a.0, a.1, b.0, b.1, width, color);
            self.dirty = true;
        }
    }
}

/// Stamps a thick line segment into the raster with square caps. Pixels that
/// fall outside the buffer are skipped.
fn stamp_line(img: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, thickness: f32, color: Rgba<u8>) {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let len = (dx * dx + dy * dy).sqrt();
    let steps = (len * 2.0) as i32;
    let half_t = (thickness / 2.0).max(0.5) as i32;
    let (w, h) = (img.width() as i32, img.height() as i32);

    for i in 0..=steps {
        let t = i as f32 / steps.max(1) as f32;
        let cx = (x0 + dx * t) as i32;
        let cy = (y0 + dy * t) as i32;
        for oy in -half_t..=half_t {
            for ox in -half_t..=half_t {
                let px = cx + ox;
                let py = cy + oy;
                if px >= 0 && px < w && py >= 0 && py < h {
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}
