//! Unified drag protocol for positioned elements.
//!
//! Mouse and single-touch input both arrive here through egui's pointer
//! abstraction (egui synthesizes pointer events from the first touch point,
//! extra simultaneous touches are dropped), so one begin/update/end session
//! covers both devices. The session is a standalone value with explicit
//! transitions rather than ambient flags, so the whole protocol is testable
//! with plain function calls.

use egui::{Pos2, Rect};

use crate::coords;
use crate::model::{Composition, ElementId, ElementPatch};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DragSession {
    #[default]
    Idle,
    Dragging {
        id: ElementId,
        pointer_anchor: Pos2,
        element_anchor: (f32, f32),
    },
}

impl DragSession {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The element currently being dragged, if any.
    pub fn dragging(&self) -> Option<ElementId> {
        match self {
            Self::Dragging { id, .. } => Some(*id),
            Self::Idle => None,
        }
    }

    /// Pointer-down over an element: record both anchors and make the grabbed
    /// element the selection (selection-on-grab). Grabbing an id the store no
    /// longer knows leaves the session idle.
    pub fn begin(&mut self, comp: &mut Composition, id: ElementId, pointer: Pos2) {
        let Some(el) = comp.element(id) else {
            log::debug!("drag begin on unknown element {id}, ignored");
            return;
        };
        let element_anchor = (el.x, el.y);
        comp.select_element(Some(id));
        *self = Self::Dragging {
            id,
            pointer_anchor: pointer,
            element_anchor,
        };
    }

    /// Pointer-move: displacement from the anchor is normalized against the
    /// *live* bounds of the rendered base image and written straight into the
    /// store, clamped into [0, 100]. Every move event commits synchronously;
    /// there is no debouncing. A move with no active drag is a no-op.
    pub fn update(&self, comp: &mut Composition, pointer: Pos2, bounds: Rect) {
        let Self::Dragging {
            id,
            pointer_anchor,
            element_anchor,
        } = *self
        else {
            return;
        };
        let delta = coords::delta_to_percent(pointer - pointer_anchor, bounds);
        let x = (element_anchor.0 + delta.x).clamp(0.0, 100.0);
        let y = (element_anchor.1 + delta.y).clamp(0.0, 100.0);
        comp.update_element(id, ElementPatch::position(x, y));
    }

    /// Pointer-up, unconditionally back to idle. The element stays wherever
    /// it was last clamped to; there is no drop-zone validation.
    pub fn end(&mut self) {
        *self = Self::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Vec2;

    fn bounds() -> Rect {
        Rect::from_min_size(Pos2::ZERO, Vec2::new(400.0, 200.0))
    }

    fn comp_with_text() -> (Composition, ElementId) {
        let mut comp = Composition::new();
        let id = comp.add_text();
        (comp, id)
    }

    #[test]
    fn grab_selects_the_element() {
        let (mut comp, id) = comp_with_text();
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::new(200.0, 100.0));
        assert_eq!(comp.selected(), Some(id));
        assert_eq!(session.dragging(), Some(id));
    }

    #[test]
    fn quarter_width_tenth_height_drag() {
        // (50, 50) dragged by +25% of width and +10% of height lands on (75, 60).
        let (mut comp, id) = comp_with_text();
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::new(200.0, 100.0));
        session.update(&mut comp, Pos2::new(300.0, 120.0), bounds());
        session.end();
        let el = comp.element(id).unwrap();
        assert_eq!((el.x, el.y), (75.0, 60.0));
        assert!(session.is_idle());
    }

    #[test]
    fn far_travel_is_clamped_to_canvas() {
        let (mut comp, id) = comp_with_text();
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::new(200.0, 100.0));
        session.update(&mut comp, Pos2::new(5000.0, -5000.0), bounds());
        let el = comp.element(id).unwrap();
        assert_eq!((el.x, el.y), (100.0, 0.0));
    }

    #[test]
    fn orphaned_move_is_a_no_op() {
        let (mut comp, id) = comp_with_text();
        let session = DragSession::default();
        session.update(&mut comp, Pos2::new(300.0, 120.0), bounds());
        let el = comp.element(id).unwrap();
        assert_eq!((el.x, el.y), (50.0, 50.0));
    }

    #[test]
    fn sequential_drags_do_not_cross_talk() {
        let mut comp = Composition::new();
        let a = comp.add_text();
        let b = comp.add_sticker("😂");
        let mut session = DragSession::default();

        session.begin(&mut comp, a, Pos2::new(200.0, 100.0));
        session.update(&mut comp, Pos2::new(240.0, 100.0), bounds());
        session.end();
        let a_pos = {
            let el = comp.element(a).unwrap();
            (el.x, el.y)
        };

        session.begin(&mut comp, b, Pos2::new(200.0, 100.0));
        session.update(&mut comp, Pos2::new(120.0, 140.0), bounds());
        session.end();

        let el_a = comp.element(a).unwrap();
        assert_eq!((el_a.x, el_a.y), a_pos);
        let el_b = comp.element(b).unwrap();
        assert_eq!((el_b.x, el_b.y), (30.0, 70.0));
    }

    #[test]
    fn rapid_moves_settle_on_the_last_event() {
        let (mut comp, id) = comp_with_text();
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::new(0.0, 0.0));
        for i in 0..100 {
            let p = Pos2::new(i as f32, (100 - i) as f32);
            session.update(&mut comp, p, bounds());
        }
        session.end();
        // Last event: pointer at (99, 1), delta (99, 1) px = (24.75, 0.5)%.
        let el = comp.element(id).unwrap();
        assert_eq!((el.x, el.y), (74.75, 50.5));
    }

    #[test]
    fn moves_track_live_bounds() {
        // The same pointer position maps differently after a reflow mid-drag.
        let (mut comp, id) = comp_with_text();
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::ZERO);
        session.update(&mut comp, Pos2::new(100.0, 0.0), bounds());
        assert_eq!(comp.element(id).unwrap().x, 75.0);
        let wide = Rect::from_min_size(Pos2::ZERO, Vec2::new(1000.0, 200.0));
        session.update(&mut comp, Pos2::new(100.0, 0.0), wide);
        assert_eq!(comp.element(id).unwrap().x, 60.0);
    }

    #[test]
    fn end_is_unconditional() {
        let (mut comp, id) = comp_with_text();
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::ZERO);
        session.end();
        assert!(session.is_idle());
        session.end();
        assert!(session.is_idle());
    }

    #[test]
    fn begin_on_removed_element_stays_idle() {
        let (mut comp, id) = comp_with_text();
        comp.remove_element(id);
        let mut session = DragSession::default();
        session.begin(&mut comp, id, Pos2::ZERO);
        assert!(session.is_idle());
    }
}
