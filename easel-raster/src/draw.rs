//! Rasterisation primitives.
//!
//! Everything here reduces to axis-aligned rectangle fills on a [`Canvas`],
//! except flood fill which needs to read pixels and works on the raw buffer.
//!
//! Lines use Bresenham's algorithm; ellipses use Zingl's four-way symmetric
//! midpoint variant (<https://zingl.github.io/bresenham.html>).

use crate::color::Color;
use crate::geometry::{Size, Vec2};
use crate::operation::{BrushSettings, BrushShape};

/// Largest coordinate magnitude or extent the iterative rasterisers accept.
///
/// Lines and ellipses touching anything beyond it paint nothing; this bounds
/// both their loop counts and their error terms.
pub const MAX_EXTENT: i64 = 1 << 16;

fn within_extent(values: &[i64]) -> bool {
    values.iter().all(|v| v.abs() <= MAX_EXTENT)
}

/// Target of the rectangle-based rasterisers.
///
/// Implementations clip to their own bounds. Negative extents are normalised
/// the way a 2D canvas `fillRect` does; zero extents paint nothing.
pub trait Canvas {
    /// Composite `color` over the rectangle.
    fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Color);

    /// Overwrite the rectangle with [`Color::TRANSPARENT`].
    fn clear_rect(&mut self, x: i64, y: i64, w: i64, h: i64);
}

/// Normalise a possibly negative rectangle to `(x, y, w, h)` with positive extents.
pub fn normalize_rect(x: i64, y: i64, w: i64, h: i64) -> Option<(i64, i64, i64, i64)> {
    if w == 0 || h == 0 {
        return None;
    }
    let (x, w) = if w < 0 { (x + w, -w) } else { (x, w) };
    let (y, h) = if h < 0 { (y + h, -h) } else { (y, h) };
    Some((x, y, w, h))
}

/// Stamp one brush-shaped point centred on `point`.
pub fn draw_point(canvas: &mut impl Canvas, point: Vec2, brush: BrushSettings, color: Color) {
    if brush.brush_size == 0 {
        return;
    }
    let size = i64::from(brush.brush_size);
    let offset = size / 2;
    let x = i64::from(point.x) - offset;
    let y = i64::from(point.y) - offset;
    match brush.brush_shape {
        BrushShape::Square => canvas.fill_rect(x, y, size, size, color),
        BrushShape::Circle => fill_ellipse(canvas, x, y, size, size, color),
    }
}

/// Clear a brush-sized square centred on `point`. Shape is ignored.
pub fn erase_point(canvas: &mut impl Canvas, point: Vec2, brush: BrushSettings) {
    let size = i64::from(brush.brush_size);
    let offset = size / 2;
    canvas.clear_rect(
        i64::from(point.x) - offset,
        i64::from(point.y) - offset,
        size,
        size,
    );
}

/// Bresenham line from `start` to `end`, stamping the brush at every sampled pixel.
pub fn draw_line(
    canvas: &mut impl Canvas,
    start: Vec2,
    end: Vec2,
    brush: BrushSettings,
    color: Color,
) {
    let (x0, y0) = (i64::from(start.x), i64::from(start.y));
    let (x1, y1) = (i64::from(end.x), i64::from(end.y));
    if !within_extent(&[x0, y0, x1, y1]) {
        return;
    }

    if (y1 - y0).abs() < (x1 - x0).abs() {
        if x0 > x1 {
            line_low(canvas, (x1, y1), (x0, y0), brush, color);
        } else {
            line_low(canvas, (x0, y0), (x1, y1), brush, color);
        }
    } else if y0 > y1 {
        line_high(canvas, (x1, y1), (x0, y0), brush, color);
    } else {
        line_high(canvas, (x0, y0), (x1, y1), brush, color);
    }
}

// Slopes in [-1, 1]; steps along x.
fn line_low(
    canvas: &mut impl Canvas,
    (x0, y0): (i64, i64),
    (x1, y1): (i64, i64),
    brush: BrushSettings,
    color: Color,
) {
    let dx = x1 - x0;
    let mut dy = y1 - y0;
    let mut yi = 1;
    if dy < 0 {
        yi = -1;
        dy = -dy;
    }
    let mut d = 2 * dy - dx;
    let mut y = y0;
    for x in x0..=x1 {
        stamp(canvas, x, y, brush, color);
        if d >= 0 {
            y += yi;
            d += 2 * (dy - dx);
        } else {
            d += 2 * dy;
        }
    }
}

// Slopes steeper than 1; steps along y.
fn line_high(
    canvas: &mut impl Canvas,
    (x0, y0): (i64, i64),
    (x1, y1): (i64, i64),
    brush: BrushSettings,
    color: Color,
) {
    let mut dx = x1 - x0;
    let dy = y1 - y0;
    let mut xi = 1;
    if dx < 0 {
        xi = -1;
        dx = -dx;
    }
    let mut d = 2 * dx - dy;
    let mut x = x0;
    for y in y0..=y1 {
        stamp(canvas, x, y, brush, color);
        if d > 0 {
            x += xi;
            d += 2 * (dx - dy);
        } else {
            d += 2 * dx;
        }
    }
}

fn stamp(canvas: &mut impl Canvas, x: i64, y: i64, brush: BrushSettings, color: Color) {
    // Line samples are within i32 range because both endpoints are.
    let point = Vec2::new(x as i32, y as i32);
    draw_point(canvas, point, brush, color);
}

pub fn draw_filled_rect(canvas: &mut impl Canvas, start: Vec2, size: Vec2, color: Color) {
    canvas.fill_rect(
        i64::from(start.x),
        i64::from(start.y),
        i64::from(size.x),
        i64::from(size.y),
        color,
    );
}

/// Four 1px edges: top, bottom, left, right.
pub fn draw_empty_rect(canvas: &mut impl Canvas, start: Vec2, size: Vec2, color: Color) {
    let (x, y) = (i64::from(start.x), i64::from(start.y));
    let (w, h) = (i64::from(size.x), i64::from(size.y));
    canvas.fill_rect(x, y, w, 1, color);
    canvas.fill_rect(x, y + h - 1, w, 1, color);
    canvas.fill_rect(x, y, 1, h, color);
    canvas.fill_rect(x + w - 1, y, 1, h, color);
}

pub fn draw_empty_ellipse(canvas: &mut impl Canvas, start: Vec2, size: Vec2, color: Color) {
    ellipse(
        canvas,
        i64::from(start.x),
        i64::from(start.y),
        i64::from(size.x),
        i64::from(size.y),
        color,
        false,
    );
}

pub fn draw_filled_ellipse(canvas: &mut impl Canvas, start: Vec2, size: Vec2, color: Color) {
    fill_ellipse(
        canvas,
        i64::from(start.x),
        i64::from(start.y),
        i64::from(size.x),
        i64::from(size.y),
        color,
    );
}

fn fill_ellipse(canvas: &mut impl Canvas, x: i64, y: i64, w: i64, h: i64, color: Color) {
    ellipse(canvas, x, y, w, h, color, true);
}

/// Ellipse inscribed in the box at `(x, y)` with extent `(w, h)`.
fn ellipse(canvas: &mut impl Canvas, x: i64, y: i64, w: i64, h: i64, color: Color, filled: bool) {
    if !within_extent(&[x, y, w, h]) {
        return;
    }
    let mut x0 = x;
    let mut y0 = y;
    let mut x1 = x + w - 1;
    let mut y1 = y + h - 1;

    // Diameters.
    let mut a = (x1 - x0).abs();
    let b = (y1 - y0).abs();
    let mut b1 = b & 1;
    // Error increments.
    let mut dx = 4 * (1 - a) * b * b;
    let mut dy = 4 * (b1 + 1) * a * a;
    // Error of the first step.
    let mut err = dx + dy + b1 * a * a;

    if x0 > x1 {
        x0 = x1;
        x1 += a;
    }
    if y0 > y1 {
        y0 = y1;
    }

    y0 += (b + 1) >> 1;
    y1 = y0 - b1;
    a *= 8 * a;
    b1 = 8 * b * b;

    loop {
        if filled {
            canvas.fill_rect(x0, y0, x1 - x0 + 1, 1, color);
            canvas.fill_rect(x0, y1, x1 - x0 + 1, 1, color);
        } else {
            canvas.fill_rect(x1, y0, 1, 1, color);
            canvas.fill_rect(x0, y0, 1, 1, color);
            canvas.fill_rect(x0, y1, 1, 1, color);
            canvas.fill_rect(x1, y1, 1, 1, color);
        }
        let e2 = 2 * err;
        if e2 <= dy {
            y0 += 1;
            y1 -= 1;
            dy += a;
            err += dy;
        }
        if e2 >= dx || 2 * err > dy {
            x0 += 1;
            x1 -= 1;
            dx += b1;
            err += dx;
        }
        if x0 > x1 {
            break;
        }
    }

    // Flat ellipses (a <= 1) stop early; finish the tips.
    while y0 - y1 <= b {
        if filled {
            canvas.fill_rect(x0 - 1, y0, x1 - x0 + 3, 1, color);
            y0 += 1;
            canvas.fill_rect(x0 - 1, y1, x1 - x0 + 3, 1, color);
            y1 -= 1;
        } else {
            canvas.fill_rect(x0 - 1, y0, 1, 1, color);
            canvas.fill_rect(x1 + 1, y0, 1, 1, color);
            y0 += 1;
            canvas.fill_rect(x0 - 1, y1, 1, 1, color);
            canvas.fill_rect(x1 + 1, y1, 1, 1, color);
            y1 -= 1;
        }
    }
}

/// 4-connected flood fill over a row-major RGBA8 buffer.
///
/// Replaces the region of pixels exactly matching the seed colour. No-op when
/// the seed is off canvas or already has `color`.
pub fn flood_fill(data: &mut [u8], size: Size, seed: Vec2, color: Color) {
    let (sx, sy) = (i64::from(seed.x), i64::from(seed.y));
    if !size.contains(sx, sy) || data.len() < size.area() * 4 {
        return;
    }
    let width = size.width as usize;
    let height = size.height as usize;
    let index = |x: usize, y: usize| (y * width + x) * 4;
    let read = |data: &[u8], x: usize, y: usize| -> [u8; 4] {
        let i = index(x, y);
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    };

    let target = read(data, sx as usize, sy as usize);
    let replacement = color.to_array();
    if target == replacement {
        return;
    }

    let mut stack = vec![(sx as usize, sy as usize)];
    while let Some((x, y)) = stack.pop() {
        if read(data, x, y) != target {
            continue;
        }
        let i = index(x, y);
        data[i..i + 4].copy_from_slice(&replacement);

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < width {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < height {
            stack.push((x, y + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Records every 1x1 fill as a point, expanding larger fills.
    #[derive(Default)]
    struct Recorder {
        fills: Vec<(i64, i64, i64, i64)>,
        cleared: Vec<(i64, i64, i64, i64)>,
    }

    impl Recorder {
        fn points(&self) -> BTreeSet<(i64, i64)> {
            let mut set = BTreeSet::new();
            for &(x, y, w, h) in &self.fills {
                if let Some((x, y, w, h)) = normalize_rect(x, y, w, h) {
                    for py in y..y + h {
                        for px in x..x + w {
                            set.insert((px, py));
                        }
                    }
                }
            }
            set
        }
    }

    impl Canvas for Recorder {
        fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, _color: Color) {
            self.fills.push((x, y, w, h));
        }

        fn clear_rect(&mut self, x: i64, y: i64, w: i64, h: i64) {
            self.cleared.push((x, y, w, h));
        }
    }

    const PX: BrushSettings = BrushSettings::square(1);

    #[test]
    fn test_bresenham_low_slope_sequence() {
        let mut rec = Recorder::default();
        draw_line(&mut rec, Vec2::new(0, 0), Vec2::new(5, 2), PX, Color::BLACK);
        let seq: Vec<(i64, i64)> = rec.fills.iter().map(|&(x, y, _, _)| (x, y)).collect();
        assert_eq!(seq, vec![(0, 0), (1, 0), (2, 1), (3, 1), (4, 2), (5, 2)]);
    }

    #[test]
    fn test_bresenham_reversed_endpoints_same_pixels() {
        let mut forward = Recorder::default();
        let mut backward = Recorder::default();
        draw_line(&mut forward, Vec2::new(0, 0), Vec2::new(5, 2), PX, Color::BLACK);
        draw_line(&mut backward, Vec2::new(5, 2), Vec2::new(0, 0), PX, Color::BLACK);
        assert_eq!(forward.points(), backward.points());
    }

    #[test]
    fn test_bresenham_high_slope_and_negative() {
        let mut rec = Recorder::default();
        draw_line(&mut rec, Vec2::new(0, 0), Vec2::new(-2, 5), PX, Color::BLACK);
        let seq: Vec<(i64, i64)> = rec.fills.iter().map(|&(x, y, _, _)| (x, y)).collect();
        // x only steps while the decision term is strictly positive
        assert_eq!(seq, vec![(0, 0), (0, 1), (-1, 2), (-1, 3), (-2, 4), (-2, 5)]);
    }

    #[test]
    fn test_far_endpoints_paint_nothing() {
        let mut rec = Recorder::default();
        draw_line(&mut rec, Vec2::new(0, 0), Vec2::new(i32::MAX, i32::MIN), PX, Color::BLACK);
        draw_empty_ellipse(&mut rec, Vec2::new(0, 0), Vec2::new(i32::MAX, 3_000_000), Color::BLACK);
        draw_filled_ellipse(&mut rec, Vec2::new(i32::MIN, 0), Vec2::new(4, 4), Color::BLACK);
        assert!(rec.fills.is_empty());

        draw_line(&mut rec, Vec2::new(0, 0), Vec2::new(MAX_EXTENT as i32, 0), PX, Color::BLACK);
        assert_eq!(rec.fills.len(), MAX_EXTENT as usize + 1);
    }

    #[test]
    fn test_line_single_point() {
        let mut rec = Recorder::default();
        draw_line(&mut rec, Vec2::new(3, 3), Vec2::new(3, 3), PX, Color::BLACK);
        assert_eq!(rec.fills, vec![(3, 3, 1, 1)]);
    }

    #[test]
    fn test_square_point_is_centred() {
        let mut rec = Recorder::default();
        draw_point(&mut rec, Vec2::new(10, 10), BrushSettings::square(4), Color::BLACK);
        assert_eq!(rec.fills, vec![(8, 8, 4, 4)]);
        let mut rec = Recorder::default();
        draw_point(&mut rec, Vec2::new(10, 10), BrushSettings::square(3), Color::BLACK);
        assert_eq!(rec.fills, vec![(9, 9, 3, 3)]);
    }

    #[test]
    fn test_zero_brush_draws_nothing() {
        let mut rec = Recorder::default();
        draw_point(&mut rec, Vec2::new(1, 1), BrushSettings::circle(0), Color::BLACK);
        assert!(rec.fills.is_empty());
    }

    #[test]
    fn test_circle_point_stays_in_box() {
        let mut rec = Recorder::default();
        draw_point(&mut rec, Vec2::new(10, 10), BrushSettings::circle(5), Color::BLACK);
        let points = rec.points();
        assert!(points.contains(&(10, 10)));
        for &(x, y) in &points {
            assert!((8..13).contains(&x) && (8..13).contains(&y), "({x},{y}) outside box");
        }
        // Corners of the box are outside the inscribed circle.
        assert!(!points.contains(&(8, 8)));
        assert!(!points.contains(&(12, 12)));
    }

    #[test]
    fn test_eraser_square_ignores_shape() {
        let mut rec = Recorder::default();
        erase_point(&mut rec, Vec2::new(5, 5), BrushSettings::circle(4));
        assert_eq!(rec.cleared, vec![(3, 3, 4, 4)]);
        assert!(rec.fills.is_empty());
    }

    #[test]
    fn test_empty_rect_border() {
        let mut rec = Recorder::default();
        draw_empty_rect(&mut rec, Vec2::new(0, 0), Vec2::new(4, 3), Color::BLACK);
        let points = rec.points();
        assert_eq!(points.len(), 10);
        assert!(!points.contains(&(1, 1)));
        assert!(!points.contains(&(2, 1)));
        assert!(points.contains(&(3, 2)));
    }

    #[test]
    fn test_empty_rect_one_by_one() {
        let mut rec = Recorder::default();
        draw_empty_rect(&mut rec, Vec2::new(2, 2), Vec2::new(1, 1), Color::BLACK);
        let points = rec.points();
        assert_eq!(points.into_iter().collect::<Vec<_>>(), vec![(2, 2)]);
    }

    #[test]
    fn test_empty_ellipse_symmetry_even_sizes() {
        for (w, h) in [(8, 6), (10, 10), (16, 4), (2, 2), (20, 2)] {
            let mut rec = Recorder::default();
            draw_empty_ellipse(&mut rec, Vec2::new(0, 0), Vec2::new(w, h), Color::BLACK);
            let points = rec.points();
            assert!(!points.is_empty());
            let (w, h) = (i64::from(w), i64::from(h));
            for &(x, y) in &points {
                assert!(points.contains(&(w - 1 - x, y)), "{w}x{h}: no horizontal mirror of ({x},{y})");
                assert!(points.contains(&(x, h - 1 - y)), "{w}x{h}: no vertical mirror of ({x},{y})");
                assert!((0..w).contains(&x) && (0..h).contains(&y));
            }
        }
    }

    #[test]
    fn test_filled_ellipse_covers_outline() {
        let mut outline = Recorder::default();
        let mut filled = Recorder::default();
        draw_empty_ellipse(&mut outline, Vec2::new(1, 1), Vec2::new(9, 7), Color::BLACK);
        draw_filled_ellipse(&mut filled, Vec2::new(1, 1), Vec2::new(9, 7), Color::BLACK);
        let outline = outline.points();
        let filled = filled.points();
        assert!(outline.is_subset(&filled));
        assert!(filled.contains(&(5, 4)));
        assert!(!outline.contains(&(5, 4)));
    }

    #[test]
    fn test_flat_ellipse_tips_finished() {
        let mut rec = Recorder::default();
        draw_filled_ellipse(&mut rec, Vec2::new(0, 0), Vec2::new(1, 5), Color::BLACK);
        let points = rec.points();
        // Every row of a 1-wide ellipse is covered.
        for y in 0..5 {
            assert!(points.iter().any(|&(_, py)| py == y), "row {y} missing");
        }
    }

    #[test]
    fn test_flat_empty_ellipse_tips_finished() {
        for (w, h) in [(1, 5), (2, 6), (1, 2), (2, 9)] {
            let mut rec = Recorder::default();
            draw_empty_ellipse(&mut rec, Vec2::new(0, 0), Vec2::new(w, h), Color::BLACK);
            let points = rec.points();
            for y in 0..i64::from(h) {
                assert!(points.iter().any(|&(_, py)| py == y), "{w}x{h}: row {y} missing");
            }
            for &(x, y) in &points {
                assert!((0..i64::from(w)).contains(&x), "{w}x{h}: ({x},{y}) outside box");
            }
        }
    }

    fn buffer(size: Size, fill: Color) -> Vec<u8> {
        fill.to_array().repeat(size.area())
    }

    #[test]
    fn test_flood_fill_bounded_by_wall() {
        let size = Size::new(5, 5);
        let mut data = buffer(size, Color::WHITE);
        // Vertical wall at x = 2.
        for y in 0..5 {
            let i = (y * 5 + 2) * 4;
            data[i..i + 4].copy_from_slice(&Color::BLACK.to_array());
        }
        flood_fill(&mut data, size, Vec2::new(0, 0), Color::rgb(255, 0, 0));
        let at = |x: usize, y: usize| Color::from_array(data[(y * 5 + x) * 4..(y * 5 + x) * 4 + 4].try_into().unwrap());
        assert_eq!(at(0, 4), Color::rgb(255, 0, 0));
        assert_eq!(at(1, 2), Color::rgb(255, 0, 0));
        assert_eq!(at(2, 2), Color::BLACK);
        assert_eq!(at(3, 0), Color::WHITE);
    }

    #[test]
    fn test_flood_fill_idempotent() {
        let size = Size::new(6, 4);
        let mut once = buffer(size, Color::TRANSPARENT);
        once[0..4].copy_from_slice(&Color::BLACK.to_array());
        let mut twice = once.clone();
        let red = Color::rgb(255, 0, 0);
        flood_fill(&mut once, size, Vec2::new(3, 3), red);
        flood_fill(&mut twice, size, Vec2::new(3, 3), red);
        flood_fill(&mut twice, size, Vec2::new(3, 3), red);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_flood_fill_off_canvas_noop() {
        let size = Size::new(3, 3);
        let mut data = buffer(size, Color::WHITE);
        let before = data.clone();
        flood_fill(&mut data, size, Vec2::new(-1, 0), Color::BLACK);
        flood_fill(&mut data, size, Vec2::new(3, 0), Color::BLACK);
        assert_eq!(data, before);
    }

    #[test]
    fn test_flood_fill_alpha_distinguishes() {
        let size = Size::new(2, 1);
        let mut data = buffer(size, Color::WHITE);
        data[4..8].copy_from_slice(&Color::rgba(255, 255, 255, 254).to_array());
        flood_fill(&mut data, size, Vec2::new(0, 0), Color::BLACK);
        assert_eq!(&data[0..4], &Color::BLACK.to_array());
        assert_eq!(&data[4..8], &[255, 255, 255, 254]);
    }

    #[test]
    fn test_normalize_rect() {
        assert_eq!(normalize_rect(5, 5, -2, 3), Some((3, 5, 2, 3)));
        assert_eq!(normalize_rect(0, 0, 0, 3), None);
    }
}
