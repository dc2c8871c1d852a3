//! Drawing operations submitted by clients.
//!
//! Wire format (JSON, `type` discriminator):
//! ```text
//! {"type":"pencil","position":{"x":1,"y":2},"previousPosition":{"x":0,"y":0},
//!  "color":"#ff0000","settings":{"brushSize":3,"brushShape":"Circle"}}
//! {"type":"rect","position":{..},"size":{"x":4,"y":2},"color":"#000","settings":{"isFilled":true}}
//! {"type":"wholeImage","url":"data:image/png;base64,..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::geometry::{Size, Vec2};

/// Largest brush accepted from a client.
pub const MAX_BRUSH_SIZE: u32 = 512;

/// How far outside the canvas a coordinate may lie before the operation is rejected.
pub const MAX_OFFCANVAS_MARGIN: i64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrushShape {
    Square,
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushSettings {
    pub brush_size: u32,
    pub brush_shape: BrushShape,
}

impl BrushSettings {
    pub const fn new(brush_size: u32, brush_shape: BrushShape) -> Self {
        Self { brush_size, brush_shape }
    }

    pub const fn square(brush_size: u32) -> Self {
        Self::new(brush_size, BrushShape::Square)
    }

    pub const fn circle(brush_size: u32) -> Self {
        Self::new(brush_size, BrushShape::Circle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeSettings {
    pub is_filled: bool,
}

/// One discrete drawing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    Pencil {
        position: Vec2,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_position: Option<Vec2>,
        color: Color,
        settings: BrushSettings,
    },
    Eraser {
        position: Vec2,
        settings: BrushSettings,
    },
    Rect {
        position: Vec2,
        size: Vec2,
        color: Color,
        settings: ShapeSettings,
    },
    Ellipse {
        position: Vec2,
        size: Vec2,
        color: Color,
        settings: ShapeSettings,
    },
    Line {
        position: Vec2,
        position2: Vec2,
        color: Color,
        settings: BrushSettings,
    },
    Fill {
        position: Vec2,
        color: Color,
    },
    /// Replaces the surface wholesale instead of drawing onto it.
    WholeImage { url: String },
}

impl Operation {
    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Pencil { .. } => "pencil",
            Operation::Eraser { .. } => "eraser",
            Operation::Rect { .. } => "rect",
            Operation::Ellipse { .. } => "ellipse",
            Operation::Line { .. } => "line",
            Operation::Fill { .. } => "fill",
            Operation::WholeImage { .. } => "wholeImage",
        }
    }

    /// Rejects operations whose rasterisation cost is unbounded by the canvas.
    ///
    /// In-limit operations that fall partly off canvas are still accepted and clipped.
    pub fn within_limits(&self, canvas: Size) -> bool {
        let point_ok = |p: &Vec2| {
            let x = i64::from(p.x);
            let y = i64::from(p.y);
            x >= -MAX_OFFCANVAS_MARGIN
                && y >= -MAX_OFFCANVAS_MARGIN
                && x <= i64::from(canvas.width) + MAX_OFFCANVAS_MARGIN
                && y <= i64::from(canvas.height) + MAX_OFFCANVAS_MARGIN
        };
        let extent_ok = |s: &Vec2| {
            i64::from(s.x).abs() <= i64::from(canvas.width) + 2 * MAX_OFFCANVAS_MARGIN
                && i64::from(s.y).abs() <= i64::from(canvas.height) + 2 * MAX_OFFCANVAS_MARGIN
        };
        let brush_ok = |b: &BrushSettings| b.brush_size <= MAX_BRUSH_SIZE;

        match self {
            Operation::Pencil { position, previous_position, settings, .. } => {
                point_ok(position) && previous_position.as_ref().map_or(true, point_ok) && brush_ok(settings)
            }
            Operation::Eraser { position, settings } => point_ok(position) && brush_ok(settings),
            Operation::Rect { position, size, .. } | Operation::Ellipse { position, size, .. } => {
                point_ok(position) && extent_ok(size)
            }
            Operation::Line { position, position2, settings, .. } => {
                point_ok(position) && point_ok(position2) && brush_ok(settings)
            }
            Operation::Fill { position, .. } => point_ok(position),
            Operation::WholeImage { .. } => true,
        }
    }
}
