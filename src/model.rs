use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ── Colors ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    pub fn to_egui(&self) -> egui::Color32 {
        egui::Color32::from_rgba_unmultiplied(
            (self.r * 255.0) as u8,
            (self.g * 255.0) as u8,
            (self.b * 255.0) as u8,
            (self.a * 255.0) as u8,
        )
    }

    pub fn to_rgba8(&self) -> image::Rgba<u8> {
        image::Rgba([
            (self.r * 255.0) as u8,
            (self.g * 255.0) as u8,
            (self.b * 255.0) as u8,
            (self.a * 255.0) as u8,
        ])
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array(c: [f32; 4]) -> Self {
        Self {
            r: c[0],
            g: c[1],
            b: c[2],
            a: c[3],
        }
    }
}

impl Default for Color4 {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        }
    }
}

// ── Image data ──────────────────────────────────────────────────────────────

/// A decoded raster shared between the store, the texture cache, and the
/// export pipeline. Cloning is cheap (pixel buffer is behind an `Arc`).
#[derive(Clone)]
pub struct ImageData {
    pub name: String,
    pub pixels: Arc<RgbaImage>,
}

impl ImageData {
    pub fn new(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("name", &self.name)
            .field("size", &(self.width(), self.height()))
            .finish()
    }
}

// ── Elements ────────────────────────────────────────────────────────────────

pub type ElementId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontChoice {
    Proportional,
    Monospace,
}

impl FontChoice {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proportional => "Sans",
            Self::Monospace => "Mono",
        }
    }

    pub fn to_egui(&self) -> egui::FontFamily {
        match self {
            Self::Proportional => egui::FontFamily::Proportional,
            Self::Monospace => egui::FontFamily::Monospace,
        }
    }

    pub fn all() -> &'static [FontChoice] {
        &[Self::Proportional, Self::Monospace]
    }
}

#[derive(Clone, Debug)]
pub enum ElementKind {
    Text {
        content: String,
        font_size: f32,
        font: FontChoice,
        fill: Color4,
        outline: Color4,
    },
    Overlay {
        image: ImageData,
        width: f32,
        height: f32,
        rotation: f32,
    },
    Sticker {
        glyph: String,
        size: f32,
        rotation: f32,
    },
}

/// One placeable element. `(x, y)` is in percentage space: 0–100 of the
/// rendered base-image box on each axis, independent of display resolution.
#[derive(Clone, Debug)]
pub struct Element {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub kind: ElementKind,
}

impl Element {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ElementKind::Text { .. })
    }

    pub fn is_overlay(&self) -> bool {
        matches!(self.kind, ElementKind::Overlay { .. })
    }

    pub fn is_sticker(&self) -> bool {
        matches!(self.kind, ElementKind::Sticker { .. })
    }
}

/// Partial update applied by unified id lookup. Callers never need to know the
/// element's kind; fields that do not apply to it are ignored. Style values
/// are stored as-is (no range validation; only x/y are clamped by the store).
#[derive(Clone, Debug, Default)]
pub struct ElementPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub content: Option<String>,
    pub font_size: Option<f32>,
    pub font: Option<FontChoice>,
    pub fill: Option<Color4>,
    pub outline: Option<Color4>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub rotation: Option<f32>,
    pub size: Option<f32>,
    pub glyph: Option<String>,
}

impl ElementPatch {
    pub fn position(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }
}

// ── Ink ─────────────────────────────────────────────────────────────────────

/// One committed pen-down-to-up gesture. Points are raw pixels in the drawing
/// surface's own space; strokes are immutable once committed.
#[derive(Clone, Debug)]
pub struct InkStroke {
    pub points: Vec<(f32, f32)>,
    pub color: Color4,
    pub width: f32,
}

// ── Tools ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tool {
    #[default]
    Text,
    Image,
    Sticker,
    Draw,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Sticker => "Sticker",
            Self::Draw => "Draw",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Self::Text, Self::Image, Self::Sticker, Self::Draw]
    }
}

// ── Composition store ───────────────────────────────────────────────────────

pub const DEFAULT_TEXT: &str = "YOUR TEXT";
pub const DEFAULT_FONT_SIZE: f32 = 32.0;
pub const DEFAULT_OVERLAY_WIDTH: f32 = 160.0;
pub const DEFAULT_STICKER_SIZE: f32 = 64.0;

/// The authoritative in-memory state of one editing session: base image,
/// all positioned elements in stacking order, the active selection, and the
/// active tool. All elements live in a single id-keyed collection; Vec order
/// is the live paint order (later entries draw on top).
#[derive(Debug, Default)]
pub struct Composition {
    pub base_image: Option<ImageData>,
    pub active_tool: Tool,
    elements: Vec<Element>,
    selected: Option<ElementId>,
    next_id: ElementId,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_base_image(&mut self, image: ImageData) {
        self.base_image = Some(image);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn texts(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.is_text())
    }

    pub fn overlays(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.is_overlay())
    }

    pub fn stickers(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.is_sticker())
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }

    fn push(&mut self, kind: ElementKind) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        self.elements.push(Element {
            id,
            x: 50.0,
            y: 50.0,
            kind,
        });
        id
    }

    pub fn add_text(&mut self) -> ElementId {
        self.push(ElementKind::Text {
            content: DEFAULT_TEXT.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            font: FontChoice::Proportional,
            fill: Color4::WHITE,
            outline: Color4::BLACK,
        })
    }

    pub fn add_overlay(&mut self, image: ImageData) -> ElementId {
        let (w, h) = (image.width() as f32, image.height() as f32);
        let width = DEFAULT_OVERLAY_WIDTH;
        let height = if w > 0.0 { width * h / w } else { width };
        self.push(ElementKind::Overlay {
            image,
            width,
            height,
            rotation: 0.0,
        })
    }

    pub fn add_sticker(&mut self, glyph: &str) -> ElementId {
        self.push(ElementKind::Sticker {
            glyph: glyph.to_string(),
            size: DEFAULT_STICKER_SIZE,
            rotation: 0.0,
        })
    }

    /// Applies a partial patch to whichever element owns `id`. Position is
    /// clamped into [0, 100]; everything else is stored as provided.
    /// Returns false if the id resolves to nothing.
    pub fn update_element(&mut self, id: ElementId, patch: ElementPatch) -> bool {
        let Some(el) = self.elements.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        if let Some(x) = patch.x {
            el.x = x.clamp(0.0, 100.0);
        }
        if let Some(y) = patch.y {
            el.y = y.clamp(0.0, 100.0);
        }
        match &mut el.kind {
            ElementKind::Text {
                content,
                font_size,
                font,
                fill,
                outline,
            } => {
                if let Some(c) = patch.content {
                    *content = c;
                }
                if let Some(s) = patch.font_size {
                    *font_size = s;
                }
                if let Some(f) = patch.font {
                    *font = f;
                }
                if let Some(c) = patch.fill {
                    *fill = c;
                }
                if let Some(c) = patch.outline {
                    *outline = c;
                }
            }
            ElementKind::Overlay {
                width,
                height,
                rotation,
                ..
            } => {
                if let Some(w) = patch.width {
                    *width = w;
                }
                if let Some(h) = patch.height {
                    *height = h;
                }
                if let Some(r) = patch.rotation {
                    *rotation = r;
                }
            }
            ElementKind::Sticker {
                glyph,
                size,
                rotation,
            } => {
                if let Some(g) = patch.glyph {
                    *glyph = g;
                }
                if let Some(s) = patch.size {
                    *size = s;
                }
                if let Some(r) = patch.rotation {
                    *rotation = r;
                }
            }
        }
        true
    }

    /// Removes an element. Clears the selection if it pointed at the removed
    /// element; removing an unknown id is a no-op.
    pub fn remove_element(&mut self, id: ElementId) {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        if self.elements.len() != before && self.selected == Some(id) {
            self.selected = None;
        }
    }

    /// Sets the selection. Selecting an element also raises it to the top of
    /// the stacking order; selecting an id that no longer exists clears the
    /// selection instead.
    pub fn select_element(&mut self, id: Option<ElementId>) {
        match id {
            Some(id) => {
                let Some(pos) = self.elements.iter().position(|e| e.id == id) else {
                    self.selected = None;
                    return;
                };
                let el = self.elements.remove(pos);
                self.elements.push(el);
                self.selected = Some(id);
            }
            None => self.selected = None,
        }
    }

    /// "Start over": back to the empty state. The caller clears the ink
    /// surface alongside.
    pub fn reset(&mut self) {
        self.base_image = None;
        self.elements.clear();
        self.selected = None;
        self.active_tool = Tool::default();
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
