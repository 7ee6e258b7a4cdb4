//! Export pipeline: flattens the live composite (base image, positioned
//! elements in stacking order, ink layer) into a single PNG.
//!
//! Flattening happens at the base image's native resolution. Element sizes
//! are stored in on-screen pixels, so they are scaled by the ratio between
//! the native width and the on-screen width of the rendered image box at
//! export time. The ink raster keeps its capture size and is scaled up during
//! compositing. A failed export leaves the composition untouched.

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use std::path::{Path, PathBuf};
use thiserror::Error;
use twemoji_assets::svg::SvgTwemojiAsset;

use crate::ink::InkSurface;
use crate::model::{Color4, Composition, ElementKind, FontChoice};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no base image loaded")]
    NoBaseImage,
    #[error("canvas has zero size")]
    ZeroCanvas,
    #[error("no usable font for text rendering")]
    MissingFont,
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Timestamped artifact name; second resolution is enough to avoid collisions
/// for a by-hand export action.
pub fn export_filename() -> String {
    chrono::Local::now()
        .format("meme-%Y%m%d-%H%M%S.png")
        .to_string()
}

/// Renders the composite and writes it to `path` as PNG.
pub fn export_to_file(
    comp: &Composition,
    ink: &InkSurface,
    display: egui::Vec2,
    path: &Path,
) -> Result<PathBuf, ExportError> {
    let img = render_composite(comp, ink, display)?;
    img.save(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("exported {}x{} composite to {}", img.width(), img.height(), path.display());
    Ok(path.to_path_buf())
}

/// Walks the settled composition and produces the flattened raster:
/// base image, then every element in stacking order, then the ink layer.
pub fn render_composite(
    comp: &Composition,
    ink: &InkSurface,
    display: egui::Vec2,
) -> Result<RgbaImage, ExportError> {
    let base = comp.base_image.as_ref().ok_or(ExportError::NoBaseImage)?;
    let (native_w, native_h) = (base.width(), base.height());
    if native_w == 0 || native_h == 0 || display.x <= 0.0 || display.y <= 0.0 {
        return Err(ExportError::ZeroCanvas);
    }
    let scale = native_w as f32 / display.x;

    let mut canvas: RgbaImage = (*base.pixels).clone();

    for el in comp.elements() {
        let cx = el.x / 100.0 * native_w as f32;
        let cy = el.y / 100.0 * native_h as f32;
        match &el.kind {
            ElementKind::Overlay {
                image,
                width,
                height,
                rotation,
            } => {
                let w = (width * scale).round();
                let h = (height * scale).round();
                if w < 1.0 || h < 1.0 {
                    log::debug!("skipping overlay {} with degenerate size", el.id);
                    continue;
                }
                let resized =
                    image::imageops::resize(&*image.pixels, w as u32, h as u32, FilterType::Triangle);
                composite_rotated(&mut canvas, &resized, cx, cy, *rotation);
            }
            ElementKind::Text {
                content,
                font_size,
                font,
                fill,
                outline,
            } => {
                let Some(font) = export_font(*font) else {
                    return Err(ExportError::MissingFont);
                };
                let px = font_size * scale;
                if px <= 0.0 || content.is_empty() {
                    continue;
                }
                let offset = (2.0 * scale).max(1.0);
                draw_outlined_text(&mut canvas, content, cx, cy, px, &font, *fill, *outline, offset);
            }
            ElementKind::Sticker {
                glyph,
                size,
                rotation,
            } => {
                let px = size * scale;
                if px < 1.0 {
                    continue;
                }
                match render_emoji(glyph, px.round() as u32) {
                    Some(sticker) => composite_rotated(&mut canvas, &sticker, cx, cy, *rotation),
                    None => {
                        // Not in the Twemoji set; fall back to the glyph as
                        // plain text, matching what the live canvas shows.
                        let Some(font) = export_font(FontChoice::Proportional) else {
                            return Err(ExportError::MissingFont);
                        };
                        draw_outlined_text(
                            &mut canvas,
                            glyph,
                            cx,
                            cy,
                            px,
                            &font,
                            Color4::BLACK,
                            Color4::BLACK,
                            0.0,
                        );
                    }
                }
            }
        }
    }

    if let Some(raster) = ink.raster() {
        if raster.dimensions() == (native_w, native_h) {
            composite_over(&mut canvas, raster, 0, 0);
        } else {
            let scaled = image::imageops::resize(raster, native_w, native_h, FilterType::Triangle);
            composite_over(&mut canvas, &scaled, 0, 0);
        }
    }

    Ok(canvas)
}

// ── Fonts & text ────────────────────────────────────────────────────────────

/// Pulls the bytes of the first face egui maps to the requested family, so
/// exported text uses the same font the live canvas renders with.
pub fn export_font(choice: FontChoice) -> Option<FontArc> {
    let defs = egui::FontDefinitions::default();
    let name = defs.families.get(&choice.to_egui())?.first()?.clone();
    let data = defs.font_data.get(&name)?;
    FontArc::try_from_vec(data.font.to_vec()).ok()
}

/// Comic-style caption: the outline is four offset passes of the same glyphs
/// (left/right/up/down), not a true path stroke, with the fill on top.
#[allow(clippy::too_many_arguments)]
fn draw_outlined_text(
    canvas: &mut RgbaImage,
    content: &str,
    cx: f32,
    cy: f32,
    px: f32,
    font: &FontArc,
    fill: Color4,
    outline: Color4,
    offset: f32,
) {
    if offset > 0.0 && outline.a > 0.0 {
        for (ox, oy) in [(-offset, 0.0), (offset, 0.0), (0.0, -offset), (0.0, offset)] {
            draw_text_pass(canvas, content, cx + ox, cy + oy, px, font, outline);
        }
    }
    draw_text_pass(canvas, content, cx, cy, px, font, fill);
}

/// Lays out `content` centered on `(cx, cy)` (each line centered on its own)
/// and blends the glyph coverage into the canvas.
fn draw_text_pass(
    canvas: &mut RgbaImage,
    content: &str,
    cx: f32,
    cy: f32,
    px: f32,
    font: &FontArc,
    color: Color4,
) {
    let scaled = font.as_scaled(PxScale::from(px));
    let line_height = scaled.height();
    let lines: Vec<&str> = content.split('\n').collect();
    let total_h = lines.len() as f32 * line_height;
    let top = cy - total_h / 2.0;

    for (i, line) in lines.iter().enumerate() {
        let line_w = line_width(font, px, line);
        let mut pen_x = cx - line_w / 2.0;
        let baseline = top + scaled.ascent() + i as f32 * line_height;
        let mut prev = None;
        for ch in line.chars() {
            let gid = font.glyph_id(ch);
            if let Some(prev_id) = prev {
                pen_x += scaled.kern(prev_id, gid);
            }
            let glyph = gid.with_scale_and_position(px, point(pen_x, baseline));
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, cov| {
                    if cov > 0.0 {
                        let x = (bounds.min.x + gx as f32) as i32;
                        let y = (bounds.min.y + gy as f32) as i32;
                        let a = (cov * color.a * 255.0).round().min(255.0) as u8;
                        let src = Rgba([
                            (color.r * 255.0) as u8,
                            (color.g * 255.0) as u8,
                            (color.b * 255.0) as u8,
                            a,
                        ]);
                        blend_pixel(canvas, x, y, src);
                    }
                });
            }
            pen_x += scaled.h_advance(gid);
            prev = Some(gid);
        }
    }
}

fn line_width(font: &FontArc, px: f32, line: &str) -> f32 {
    let scaled = font.as_scaled(PxScale::from(px));
    let mut w = 0.0f32;
    let mut prev = None;
    for ch in line.chars() {
        let gid = font.glyph_id(ch);
        if let Some(prev_id) = prev {
            w += scaled.kern(prev_id, gid);
        }
        w += scaled.h_advance(gid);
        prev = Some(gid);
    }
    w
}

// ── Emoji ───────────────────────────────────────────────────────────────────

/// Resolves an emoji glyph through the Twemoji asset set and rasterizes its
/// SVG at the requested size. Returns `None` for glyphs outside the set.
pub fn render_emoji(glyph: &str, size: u32) -> Option<RgbaImage> {
    let asset = SvgTwemojiAsset::from_emoji(glyph)?;
    let svg_data: &str = asset.as_ref();

    let opts = Options::default();
    let tree = Tree::from_str(svg_data, &opts).ok()?;

    let svg_size = tree.size();
    let scale = size as f32 / svg_size.width().max(svg_size.height());
    let width = (svg_size.width() * scale).ceil() as u32;
    let height = (svg_size.height() * scale).ceil() as u32;

    let mut pixmap = Pixmap::new(width.max(1), height.max(1))?;
    let transform = Transform::from_scale(scale, scale);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    Some(pixmap_to_rgba_image(&pixmap))
}

fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let height = pixmap.height();
    let mut img = RgbaImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            if let Some(pixel) = pixmap.pixel(x, y) {
                // tiny_skia stores premultiplied alpha.
                let (r, g, b, a) =
                    unpremultiply(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha());
                img.put_pixel(x, y, Rgba([r, g, b, a]));
            }
        }
    }

    img
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ── Compositing ─────────────────────────────────────────────────────────────

/// Source-over composite of `src` onto `dest` with its top-left at `(x, y)`.
pub fn composite_over(dest: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    for sy in 0..src.height() {
        for sx in 0..src.width() {
            let src_pixel = *src.get_pixel(sx, sy);
            if src_pixel[3] == 0 {
                continue;
            }
            blend_pixel(dest, x + sx as i32, y + sy as i32, src_pixel);
        }
    }
}

/// Composites `src` centered on `(cx, cy)`, rotated clockwise by `degrees`.
/// Each destination pixel inside the rotated bounding box is inverse-mapped
/// into source space and bilinearly sampled.
pub fn composite_rotated(dest: &mut RgbaImage, src: &RgbaImage, cx: f32, cy: f32, degrees: f32) {
    if degrees.rem_euclid(360.0) == 0.0 {
        let x = (cx - src.width() as f32 / 2.0).round() as i32;
        let y = (cy - src.height() as f32 / 2.0).round() as i32;
        composite_over(dest, src, x, y);
        return;
    }

    let rad = degrees.to_radians();
    let (sin, cos) = rad.sin_cos();
    let (sw, sh) = (src.width() as f32, src.height() as f32);
    let half_w = (sw * cos.abs() + sh * sin.abs()) / 2.0;
    let half_h = (sw * sin.abs() + sh * cos.abs()) / 2.0;

    let x0 = (cx - half_w).floor().max(0.0) as i32;
    let x1 = ((cx + half_w).ceil() as i32).min(dest.width() as i32);
    let y0 = (cy - half_h).floor().max(0.0) as i32;
    let y1 = ((cy + half_h).ceil() as i32).min(dest.height() as i32);

    for dy in y0..y1 {
        for dx in x0..x1 {
            let vx = dx as f32 + 0.5 - cx;
            let vy = dy as f32 + 0.5 - cy;
            // Undo the rotation to land in source-local coordinates.
            let lx = vx * cos + vy * sin + sw / 2.0 - 0.5;
            let ly = -vx * sin + vy * cos + sh / 2.0 - 0.5;
            if let Some(sampled) = sample_bilinear(src, lx, ly) {
                if sampled[3] > 0 {
                    blend_pixel(dest, dx, dy, sampled);
                }
            }
        }
    }
}

fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> Option<Rgba<u8>> {
    if x < -0.5 || y < -0.5 || x > src.width() as f32 - 0.5 || y > src.height() as f32 - 0.5 {
        return None;
    }
    let x0 = x.floor().max(0.0) as u32;
    let y0 = y.floor().max(0.0) as u32;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = (x - x0 as f32).clamp(0.0, 1.0);
    let fy = (y - y0 as f32).clamp(0.0, 1.0);

    let p00 = src.get_pixel(x0, y0);
    let p10 = src.get_pixel(x1, y0);
    let p01 = src.get_pixel(x0, y1);
    let p11 = src.get_pixel(x1, y1);

    let lerp2 = |c: usize| -> u8 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bot = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        (top * (1.0 - fy) + bot * fy).round() as u8
    };

    Some(Rgba([lerp2(0), lerp2(1), lerp2(2), lerp2(3)]))
}

fn blend_pixel(dest: &mut RgbaImage, x: i32, y: i32, src: Rgba<u8>) {
    if x < 0 || y < 0 || x >= dest.width() as i32 || y >= dest.height() as i32 {
        return;
    }
    let dst = *dest.get_pixel(x as u32, y as u32);
    dest.put_pixel(x as u32, y as u32, alpha_blend(src, dst));
}

/// Source-over blend of two straight-alpha RGBA pixels.
fn alpha_blend(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let sf = s as f32 / 255.0;
        let df = d as f32 / 255.0;
        let out = (sf * sa + df * da * (1.0 - sa)) / out_a;
        (out * 255.0).round() as u8
    };

    Rgba([
        blend(src[0], dst[0]),
        blend(src[1], dst[1]),
        blend(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementPatch, ImageData};

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    fn comp_with_base(w: u32, h: u32, rgba: [u8; 4]) -> Composition {
        let mut comp = Composition::new();
        comp.set_base_image(ImageData::new("base", solid(w, h, rgba)));
        comp
    }

    fn native_display(comp: &Composition) -> egui::Vec2 {
        let base = comp.base_image.as_ref().unwrap();
        egui::Vec2::new(base.width() as f32, base.height() as f32)
    }

    #[test]
    fn export_without_base_image_fails() {
        let comp = Composition::new();
        let ink = InkSurface::default();
        let err = render_composite(&comp, &ink, egui::Vec2::new(100.0, 100.0)).unwrap_err();
        assert!(matches!(err, ExportError::NoBaseImage));
    }

    #[test]
    fn zero_display_box_fails() {
        let comp = comp_with_base(8, 8, [255, 0, 0, 255]);
        let ink = InkSurface::default();
        let err = render_composite(&comp, &ink, egui::Vec2::ZERO).unwrap_err();
        assert!(matches!(err, ExportError::ZeroCanvas));
    }

    #[test]
    fn empty_composition_passes_base_through() {
        let comp = comp_with_base(8, 8, [255, 0, 0, 255]);
        let ink = InkSurface::default();
        let out = render_composite(&comp, &ink, native_display(&comp)).unwrap();
        assert_eq!(out.dimensions(), (8, 8));
        assert!(out.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn overlay_lands_at_its_percent_position() {
        let mut comp = comp_with_base(8, 8, [255, 0, 0, 255]);
        let id = comp.add_overlay(ImageData::new("blue", solid(2, 2, [0, 0, 255, 255])));
        comp.update_element(
            id,
            ElementPatch {
                width: Some(2.0),
                height: Some(2.0),
                ..ElementPatch::default()
            },
        );
        let ink = InkSurface::default();
        let out = render_composite(&comp, &ink, native_display(&comp)).unwrap();
        assert_eq!(out.get_pixel(4, 4).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn degenerate_overlay_is_skipped() {
        let mut comp = comp_with_base(8, 8, [255, 0, 0, 255]);
        let id = comp.add_overlay(ImageData::new("blue", solid(2, 2, [0, 0, 255, 255])));
        comp.update_element(
            id,
            ElementPatch {
                width: Some(-5.0),
                ..ElementPatch::default()
            },
        );
        let ink = InkSurface::default();
        let out = render_composite(&comp, &ink, native_display(&comp)).unwrap();
        assert!(out.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn text_marks_the_canvas() {
        let mut comp = comp_with_base(64, 64, [0, 0, 0, 255]);
        let id = comp.add_text();
        comp.update_element(
            id,
            ElementPatch {
                content: Some("I".to_string()),
                ..ElementPatch::default()
            },
        );
        let ink = InkSurface::default();
        let out = render_composite(&comp, &ink, native_display(&comp)).unwrap();
        let lit = out.pixels().filter(|p| p[0] > 200).count();
        assert!(lit > 0, "white fill should reach the canvas");
    }

    #[test]
    fn ink_paints_over_everything() {
        let comp = comp_with_base(16, 16, [255, 0, 0, 255]);
        let mut ink = InkSurface::new(
            Color4 {
                r: 0.0,
                g: 0.0,
                b: 1.0,
                a: 1.0,
            },
            2.0,
        );
        ink.begin_stroke((8.0, 8.0), (16, 16));
        ink.end_stroke();
        let out = render_composite(&comp, &ink, native_display(&comp)).unwrap();
        assert_eq!(out.get_pixel(8, 8).0, [0, 0, 255, 255]);
    }

    #[test]
    fn composite_over_blends_transparency() {
        let mut dest = solid(10, 10, [255, 0, 0, 255]);
        let src = solid(4, 4, [0, 0, 255, 128]);
        composite_over(&mut dest, &src, 0, 0);
        let px = dest.get_pixel(0, 0);
        assert!(px[0] > 0, "should keep some red");
        assert!(px[2] > 0, "should gain some blue");
        assert_eq!(dest.get_pixel(9, 9).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rotation_by_180_keeps_center_coverage() {
        let mut dest = solid(9, 9, [255, 255, 255, 255]);
        let src = solid(3, 3, [0, 0, 255, 255]);
        composite_rotated(&mut dest, &src, 4.5, 4.5, 180.0);
        assert_eq!(dest.get_pixel(4, 4).0, [0, 0, 255, 255]);
        assert_eq!(dest.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn emoji_renders_to_nonempty_raster() {
        let img = render_emoji("😂", 32).expect("joy emoji is in the Twemoji set");
        assert!(img.width() > 0 && img.height() > 0);
        assert!(img.pixels().any(|p| p[3] > 0));
    }

    #[test]
    fn unknown_glyph_resolves_to_none() {
        assert!(render_emoji("not-an-emoji", 32).is_none());
    }

    #[test]
    fn export_font_is_available() {
        assert!(export_font(FontChoice::Proportional).is_some());
        assert!(export_font(FontChoice::Monospace).is_some());
    }

    #[test]
    fn filename_is_timestamped_png() {
        let name = export_filename();
        assert!(name.starts_with("meme-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn export_to_file_writes_png() {
        let comp = comp_with_base(8, 8, [10, 20, 30, 255]);
        let ink = InkSurface::default();
        let path = std::env::temp_dir().join("meme-edit-export-test.png");
        let written = export_to_file(&comp, &ink, native_display(&comp), &path).unwrap();
        let back = image::open(&written).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (8, 8));
        assert_eq!(back.get_pixel(3, 3).0, [10, 20, 30, 255]);
        let _ = std::fs::remove_file(written);
    }

    #[test]
    fn failed_export_leaves_composition_untouched() {
        let mut comp = comp_with_base(8, 8, [255, 0, 0, 255]);
        comp.add_text();
        let ink = InkSurface::default();
        let before = comp.elements().len();
        let _ = render_composite(&comp, &ink, egui::Vec2::ZERO);
        assert_eq!(comp.elements().len(), before);
        assert!(comp.base_image.is_some());
    }
}
