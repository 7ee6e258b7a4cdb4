use eframe::egui;
use egui::{Color32, Pos2, Rect, Vec2};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::EditorSettings;
use crate::coords;
use crate::drag::DragSession;
use crate::export;
use crate::ink::InkSurface;
use crate::model::{
    Composition, Element, ElementId, ElementKind, ElementPatch, FontChoice, ImageData, Tool,
};

const STICKER_CHOICES: &[&str] = &["😂", "🔥", "💀", "😎", "🤡", "💯", "🥶", "👍", "😱", "🗿"];
const TEXT_OUTLINE_OFFSET: f32 = 2.0;

pub struct MemeApp {
    comp: Composition,
    ink: InkSurface,
    drag: DragSession,
    settings: EditorSettings,

    base_texture: Option<egui::TextureHandle>,
    overlay_textures: HashMap<ElementId, egui::TextureHandle>,
    ink_texture: Option<egui::TextureHandle>,

    last_image_rect: Option<Rect>,
    status: Option<String>,
    settings_dirty: bool,
}

impl MemeApp {
    pub fn new(image_path: Option<PathBuf>) -> Self {
        let settings = EditorSettings::load();
        let mut comp = Composition::new();
        if let Some(path) = image_path {
            match load_image(&path) {
                Some(image) => comp.set_base_image(image),
                None => log::warn!("could not load {}", path.display()),
            }
        }
        let ink = InkSurface::new(settings.ink_color, settings.ink_width);
        Self {
            comp,
            ink,
            drag: DragSession::default(),
            settings,
            base_texture: None,
            overlay_textures: HashMap::new(),
            ink_texture: None,
            last_image_rect: None,
            status: None,
            settings_dirty: false,
        }
    }

    // ── Textures ────────────────────────────────────────────────────────────

    fn ensure_textures(&mut self, ctx: &egui::Context) {
        if self.base_texture.is_none() {
            if let Some(base) = &self.comp.base_image {
                self.base_texture = Some(ctx.load_texture(
                    "base",
                    color_image(&base.pixels),
                    egui::TextureOptions::LINEAR,
                ));
            }
        }

        let Self {
            comp,
            overlay_textures,
            ..
        } = &mut *self;
        overlay_textures.retain(|id, _| comp.element(*id).is_some());
        for el in comp.elements() {
            if let ElementKind::Overlay { image, .. } = &el.kind {
                overlay_textures.entry(el.id).or_insert_with(|| {
                    ctx.load_texture(
                        format!("overlay-{}", el.id),
                        color_image(&image.pixels),
                        egui::TextureOptions::LINEAR,
                    )
                });
            }
        }

        let ink_dirty = self.ink.take_dirty();
        if let Some(raster) = self.ink.raster() {
            if ink_dirty || self.ink_texture.is_none() {
                let ci = color_image(raster);
                match &mut self.ink_texture {
                    Some(tex) => tex.set(ci, egui::TextureOptions::LINEAR),
                    None => {
                        self.ink_texture =
                            Some(ctx.load_texture("ink", ci, egui::TextureOptions::LINEAR))
                    }
                }
            }
        } else {
            self.ink_texture = None;
        }
    }

    // ── Geometry / hit testing ──────────────────────────────────────────────

    fn element_screen_rect(&self, el: &Element, image_rect: Rect) -> Rect {
        let center = coords::percent_to_point(el.x, el.y, image_rect);
        let size = match &el.kind {
            ElementKind::Text {
                content, font_size, ..
            } => {
                let longest = content.lines().map(str::len).max().unwrap_or(1) as f32;
                let lines = content.lines().count().max(1) as f32;
                Vec2::new(longest * font_size * 0.6, lines * font_size * 1.2)
            }
            ElementKind::Overlay { width, height, .. } => Vec2::new(width.abs(), height.abs()),
            ElementKind::Sticker { size, .. } => Vec2::splat(size.abs()),
        };
        Rect::from_center_size(center, size.max(Vec2::splat(8.0)))
    }

    /// Topmost element under the pointer: walk the stacking order in reverse.
    fn hit_test(&self, pos: Pos2, image_rect: Rect) -> Option<ElementId> {
        self.comp
            .elements()
            .iter()
            .rev()
            .find(|el| self.element_screen_rect(el, image_rect).contains(pos))
            .map(|el| el.id)
    }

    /// Maps a screen point into the ink raster's own pixel space (the raster
    /// keeps its allocation size even after the image box reflows).
    fn ink_point(&self, pos: Pos2, image_rect: Rect) -> (f32, f32) {
        let local = pos - image_rect.min;
        match self.ink.raster() {
            Some(raster) => (
                local.x * raster.width() as f32 / image_rect.width().max(1.0),
                local.y * raster.height() as f32 / image_rect.height().max(1.0),
            ),
            None => (local.x, local.y),
        }
    }

    // ── Actions ─────────────────────────────────────────────────────────────

    fn open_base_image(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp", "bmp"])
            .pick_file()
        else {
            return;
        };
        match load_image(&path) {
            Some(image) => {
                log::info!("loaded base image {} ({}x{})", path.display(), image.width(), image.height());
                self.comp.set_base_image(image);
                self.base_texture = None;
                self.status = None;
            }
            None => {
                self.status = Some(format!("Could not load {}", path.display()));
            }
        }
    }

    fn add_overlay_image(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp", "bmp"])
            .pick_file()
        else {
            return;
        };
        match load_image(&path) {
            Some(image) => {
                let id = self.comp.add_overlay(image);
                self.comp.select_element(Some(id));
            }
            None => {
                self.status = Some(format!("Could not load {}", path.display()));
            }
        }
    }

    fn do_export(&mut self) {
        if !self.drag.is_idle() || self.ink.pen_down() {
            self.status = Some("Finish the current gesture before exporting".to_string());
            return;
        }
        let display = self
            .last_image_rect
            .map(|r| r.size())
            .or_else(|| {
                self.comp
                    .base_image
                    .as_ref()
                    .map(|b| Vec2::new(b.width() as f32, b.height() as f32))
            })
            .unwrap_or(Vec2::ZERO);

        let Some(path) = rfd::FileDialog::new()
            .add_filter("PNG image", &["png"])
            .set_file_name(export::export_filename())
            .save_file()
        else {
            return;
        };

        match export::export_to_file(&self.comp, &self.ink, display, &path) {
            Ok(written) => {
                self.status = Some(format!("Exported to {}", written.display()));
            }
            Err(err) => {
                log::error!("export failed: {err}");
                let msg = err.to_string();
                rfd::MessageDialog::new()
                    .set_level(rfd::MessageLevel::Error)
                    .set_title("Export failed")
                    .set_description(&msg)
                    .show();
                self.status = Some(format!("Export failed: {msg}"));
            }
        }
    }

    /// Settings writes are deferred until the gesture ends, so dragging a
    /// slider does not rewrite the file once per frame.
    fn settings_flush_due(&self, pointer_down: bool) -> bool {
        self.settings_dirty && !pointer_down
    }

    /// Global shortcuts. Skipped entirely while a text field owns the
    /// keyboard, so editing a caption never deletes the element underneath.
    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let delete = ctx
            .input(|i| i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace));
        if delete {
            if let Some(sel) = self.comp.selected() {
                self.comp.remove_element(sel);
            }
        }
    }

    fn start_over(&mut self) {
        log::info!("start over: clearing composition and ink");
        self.comp.reset();
        self.ink = InkSurface::new(self.settings.ink_color, self.settings.ink_width);
        self.drag = DragSession::default();
        self.base_texture = None;
        self.overlay_textures.clear();
        self.ink_texture = None;
        self.last_image_rect = None;
        self.status = None;
    }

    // ── Panels ──────────────────────────────────────────────────────────────

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open image…").clicked() {
                self.open_base_image();
            }
            ui.separator();
            for tool in Tool::all() {
                ui.selectable_value(&mut self.comp.active_tool, *tool, tool.label());
            }
            ui.separator();
            if ui.button("Export").clicked() {
                self.do_export();
            }
            if ui.button("Start over").clicked() {
                self.start_over();
            }
        });
    }

    fn properties_panel(&mut self, ui: &mut egui::Ui) {
        if self.comp.base_image.is_none() {
            ui.label("Open a base image to start editing.");
            return;
        }

        if let Some(sel) = self.comp.selected() {
            if ui.button("Delete selected").clicked() {
                self.comp.remove_element(sel);
            }
            ui.separator();
        }

        match self.comp.active_tool {
            Tool::Text => self.text_panel(ui),
            Tool::Image => self.image_panel(ui),
            Tool::Sticker => self.sticker_panel(ui),
            Tool::Draw => self.draw_panel(ui),
        }
    }

    fn text_panel(&mut self, ui: &mut egui::Ui) {
        if ui.button("Add text").clicked() {
            let id = self.comp.add_text();
            self.comp.update_element(
                id,
                ElementPatch {
                    font_size: Some(self.settings.default_font_size),
                    ..ElementPatch::default()
                },
            );
            self.comp.select_element(Some(id));
        }

        let Some(sel) = self.comp.selected() else {
            return;
        };
        let Some(el) = self.comp.element(sel) else {
            return;
        };
        let ElementKind::Text {
            content,
            font_size,
            font,
            fill,
            outline,
        } = &el.kind
        else {
            return;
        };

        let mut content = content.clone();
        let mut font_size = *font_size;
        let mut font = *font;
        let mut fill = fill.as_array();
        let mut outline = outline.as_array();
        let mut changed = false;

        ui.separator();
        ui.label("Caption:");
        changed |= ui.text_edit_multiline(&mut content).changed();
        ui.horizontal(|ui| {
            ui.label("Size:");
            changed |= ui.add(egui::DragValue::new(&mut font_size).speed(1.0)).changed();
        });
        egui::ComboBox::from_label("Font")
            .selected_text(font.label())
            .show_ui(ui, |ui| {
                for choice in FontChoice::all() {
                    changed |= ui
                        .selectable_value(&mut font, *choice, choice.label())
                        .changed();
                }
            });
        ui.horizontal(|ui| {
            ui.label("Fill:");
            changed |= ui.color_edit_button_rgba_unmultiplied(&mut fill).changed();
            ui.label("Outline:");
            changed |= ui.color_edit_button_rgba_unmultiplied(&mut outline).changed();
        });

        if changed {
            self.comp.update_element(
                sel,
                ElementPatch {
                    content: Some(content),
                    font_size: Some(font_size),
                    font: Some(font),
                    fill: Some(crate::model::Color4::from_array(fill)),
                    outline: Some(crate::model::Color4::from_array(outline)),
                    ..ElementPatch::default()
                },
            );
            // The last used caption size becomes the default for new ones.
            if self.settings.default_font_size != font_size {
                self.settings.default_font_size = font_size;
                self.settings_dirty = true;
            }
        }
    }

    fn image_panel(&mut self, ui: &mut egui::Ui) {
        if ui.button("Add overlay…").clicked() {
            self.add_overlay_image();
        }

        let Some(sel) = self.comp.selected() else {
            return;
        };
        let Some(el) = self.comp.element(sel) else {
            return;
        };
        let ElementKind::Overlay {
            width,
            height,
            rotation,
            ..
        } = el.kind
        else {
            return;
        };

        let mut width = width;
        let mut height = height;
        let mut rotation = rotation;
        let mut changed = false;

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Width:");
            changed |= ui.add(egui::DragValue::new(&mut width).speed(1.0)).changed();
            ui.label("Height:");
            changed |= ui.add(egui::DragValue::new(&mut height).speed(1.0)).changed();
        });
        ui.horizontal(|ui| {
            ui.label("Rotation:");
            changed |= ui
                .add(egui::DragValue::new(&mut rotation).speed(1.0).suffix("°"))
                .changed();
        });

        if changed {
            self.comp.update_element(
                sel,
                ElementPatch {
                    width: Some(width),
                    height: Some(height),
                    rotation: Some(rotation),
                    ..ElementPatch::default()
                },
            );
        }
    }

    fn sticker_panel(&mut self, ui: &mut egui::Ui) {
        ui.label("Add sticker:");
        ui.horizontal_wrapped(|ui| {
            for glyph in STICKER_CHOICES {
                if ui.button(*glyph).clicked() {
                    let id = self.comp.add_sticker(glyph);
                    self.comp.select_element(Some(id));
                }
            }
        });

        let Some(sel) = self.comp.selected() else {
            return;
        };
        let Some(el) = self.comp.element(sel) else {
            return;
        };
        let ElementKind::Sticker { size, rotation, .. } = el.kind else {
            return;
        };

        let mut size = size;
        let mut rotation = rotation;
        let mut changed = false;

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Size:");
            changed |= ui.add(egui::DragValue::new(&mut size).speed(1.0)).changed();
            ui.label("Rotation:");
            changed |= ui
                .add(egui::DragValue::new(&mut rotation).speed(1.0).suffix("°"))
                .changed();
        });

        if changed {
            self.comp.update_element(
                sel,
                ElementPatch {
                    size: Some(size),
                    rotation: Some(rotation),
                    ..ElementPatch::default()
                },
            );
        }
    }

    fn draw_panel(&mut self, ui: &mut egui::Ui) {
        let mut color = self.settings.ink_color.as_array();
        let mut changed = false;
        ui.horizontal(|ui| {
            ui.label("Ink:");
            changed |= ui.color_edit_button_rgba_unmultiplied(&mut color).changed();
        });
        ui.horizontal(|ui| {
            ui.label("Width:");
            changed |= ui
                .add(egui::Slider::new(&mut self.settings.ink_width, 1.0..=30.0))
                .changed();
        });
        if changed {
            self.settings.ink_color = crate::model::Color4::from_array(color);
            self.ink.color = self.settings.ink_color;
            self.ink.width = self.settings.ink_width;
            self.settings_dirty = true;
        }

        ui.label(format!("{} stroke(s)", self.ink.stroke_count()));
        if ui.button("Clear ink").clicked() {
            self.ink.clear();
        }
    }

    // ── Canvas ──────────────────────────────────────────────────────────────

    fn draw_element(&self, painter: &egui::Painter, el: &Element, image_rect: Rect) {
        let center = coords::percent_to_point(el.x, el.y, image_rect);
        match &el.kind {
            ElementKind::Overlay {
                width,
                height,
                rotation,
                ..
            } => {
                if *width <= 0.0 || *height <= 0.0 {
                    return;
                }
                let Some(tex) = self.overlay_textures.get(&el.id) else {
                    return;
                };
                let rect = Rect::from_center_size(center, Vec2::new(*width, *height));
                let uv = Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0));
                let mut mesh = egui::Mesh::with_texture(tex.id());
                mesh.add_rect_with_uv(rect, uv, Color32::WHITE);
                mesh.rotate(egui::emath::Rot2::from_angle(rotation.to_radians()), center);
                painter.add(egui::Shape::mesh(mesh));
            }
            ElementKind::Text {
                content,
                font_size,
                font,
                fill,
                outline,
            } => {
                if content.is_empty() || *font_size <= 0.0 {
                    return;
                }
                let font_id = egui::FontId::new(*font_size, font.to_egui());
                let galley =
                    painter.layout_no_wrap(content.clone(), font_id, Color32::PLACEHOLDER);
                let top_left = center - galley.size() / 2.0;
                let o = TEXT_OUTLINE_OFFSET;
                for (ox, oy) in [(-o, 0.0), (o, 0.0), (0.0, -o), (0.0, o)] {
                    painter.galley(
                        top_left + Vec2::new(ox, oy),
                        galley.clone(),
                        outline.to_egui(),
                    );
                }
                painter.galley(top_left, galley, fill.to_egui());
            }
            ElementKind::Sticker {
                glyph,
                size,
                rotation,
            } => {
                if *size <= 0.0 {
                    return;
                }
                let galley = painter.layout_no_wrap(
                    glyph.clone(),
                    egui::FontId::proportional(*size),
                    Color32::BLACK,
                );
                let angle = rotation.to_radians();
                let rot = egui::emath::Rot2::from_angle(angle);
                let pos = center - rot * (galley.size() / 2.0);
                painter.add(
                    egui::epaint::TextShape::new(pos, galley, Color32::BLACK).with_angle(angle),
                );
            }
        }
    }

    fn draw_selection_indicator(&self, painter: &egui::Painter, rect: Rect) {
        painter.rect_stroke(
            rect.expand(4.0),
            2.0,
            egui::Stroke::new(1.5, Color32::from_rgb(0, 120, 255)),
            egui::StrokeKind::Middle,
        );
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let canvas_rect = response.rect;
        painter.rect_filled(canvas_rect, 0.0, Color32::from_gray(40));

        let Some(base) = &self.comp.base_image else {
            painter.text(
                canvas_rect.center(),
                egui::Align2::CENTER_CENTER,
                "Open an image to start",
                egui::FontId::proportional(20.0),
                Color32::GRAY,
            );
            self.last_image_rect = None;
            return;
        };

        let image_rect = fit_rect(canvas_rect, base.width() as f32, base.height() as f32);
        self.last_image_rect = Some(image_rect);

        if let Some(tex) = &self.base_texture {
            painter.image(
                tex.id(),
                image_rect,
                Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        for el in self.comp.elements() {
            self.draw_element(&painter, el, image_rect);
        }

        if let Some(tex) = &self.ink_texture {
            painter.image(
                tex.id(),
                image_rect,
                Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        // Above the ink layer, so the drag affordance stays visible.
        if let Some(sel) = self.comp.selected() {
            if let Some(el) = self.comp.element(sel) {
                let rect = self.element_screen_rect(el, image_rect);
                self.draw_selection_indicator(&painter, rect);
            }
        }

        // Input routing: the Draw tool owns the pointer, otherwise gestures
        // go to the drag session.
        if self.comp.active_tool == Tool::Draw {
            if response.drag_started_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    if image_rect.contains(pos) {
                        let size = (image_rect.width() as u32, image_rect.height() as u32);
                        let point = self.ink_point(pos, image_rect);
                        self.ink.begin_stroke(point, size);
                    }
                }
            }
            if response.dragged_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    let point = self.ink_point(pos, image_rect);
                    self.ink.extend_stroke(point);
                }
            }
            if response.drag_stopped_by(egui::PointerButton::Primary) {
                self.ink.end_stroke();
            }
        } else {
            if response.drag_started_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    match self.hit_test(pos, image_rect) {
                        Some(id) => self.drag.begin(&mut self.comp, id, pos),
                        None => self.comp.select_element(None),
                    }
                }
            }
            if response.dragged_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    // Bounds are re-read every frame so a mid-drag reflow
                    // keeps the mapping honest.
                    self.drag.update(&mut self.comp, pos, image_rect);
                }
            }
            if response.drag_stopped_by(egui::PointerButton::Primary) {
                self.drag.end();
            }
            if response.clicked() {
                if let Some(pos) = response.interact_pointer_pos() {
                    self.comp.select_element(self.hit_test(pos, image_rect));
                }
            }
        }
    }
}

impl eframe::App for MemeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ensure_textures(ctx);
        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            match &self.status {
                Some(status) => ui.label(status.clone()),
                None => ui.label(""),
            };
        });

        egui::SidePanel::right("properties")
            .default_width(230.0)
            .show(ctx, |ui| {
                self.properties_panel(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.canvas(ui);
        });

        if self.settings_flush_due(ctx.input(|i| i.pointer.any_down())) {
            self.settings.save();
            self.settings_dirty = false;
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn load_image(path: &Path) -> Option<ImageData> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    match image::open(path) {
        Ok(img) => Some(ImageData::new(name, img.to_rgba8())),
        Err(err) => {
            log::error!("failed to decode {}: {err}", path.display());
            None
        }
    }
}

fn color_image(img: &image::RgbaImage) -> egui::ColorImage {
    let size = [img.width() as usize, img.height() as usize];
    let pixels = img.as_flat_samples();
    egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice())
}

/// Fits the base image into the available canvas, preserving aspect ratio,
/// centered.
fn fit_rect(avail: Rect, img_w: f32, img_h: f32) -> Rect {
    let (img_w, img_h) = (img_w.max(1.0), img_h.max(1.0));
    let scale = (avail.width() / img_w).min(avail.height() / img_h).max(0.0);
    let size = Vec2::new(img_w * scale, img_h * scale);
    Rect::from_center_size(avail.center(), size)
}
