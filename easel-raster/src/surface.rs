//! The authoritative pixel buffer of a room.

use std::fmt;
use std::sync::Arc;

use crate::codec::{CodecError, ImageCodec, RasterImage};
use crate::color::Color;
use crate::draw::{self, normalize_rect, Canvas};
use crate::geometry::Size;
use crate::operation::{Operation, ShapeSettings};

type DrawObserver = Box<dyn FnMut() + Send>;

/// RGBA8 raster that operations are applied to.
///
/// Every mutation notifies the registered draw observers once.
pub struct Surface {
    size: Size,
    data: Vec<u8>,
    codec: Arc<dyn ImageCodec>,
    observers: Vec<DrawObserver>,
}

impl Surface {
    /// Create a cleared surface.
    pub fn new(size: Size, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            size,
            data: Color::TRANSPARENT.to_array().repeat(size.area()),
            codec,
            observers: Vec::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Raw row-major RGBA8 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: i64, y: i64) -> Option<Color> {
        if !self.size.contains(x, y) {
            return None;
        }
        let i = self.index(x, y);
        Some(Color::from_array([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]))
    }

    /// Register a callback run after every mutation.
    pub fn subscribe_draw(&mut self, observer: impl FnMut() + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Reset every pixel to [`Color::TRANSPARENT`].
    pub fn clear(&mut self) {
        let background = Color::TRANSPARENT.to_array();
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&background);
        }
        self.notify_draw();
        log::trace!("cleared {}x{} surface", self.size.width, self.size.height);
    }

    /// Apply one operation.
    ///
    /// Only `WholeImage` can fail, when its payload does not decode; the
    /// surface is left unchanged in that case.
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<(), CodecError> {
        match operation {
            Operation::Pencil { position, previous_position, color, settings } => {
                match previous_position {
                    Some(previous) => draw::draw_line(self, *previous, *position, *settings, *color),
                    None => draw::draw_point(self, *position, *settings, *color),
                }
            }
            Operation::Eraser { position, settings } => {
                draw::erase_point(self, *position, *settings);
            }
            Operation::Rect { position, size, color, settings: ShapeSettings { is_filled } } => {
                if *is_filled {
                    draw::draw_filled_rect(self, *position, *size, *color);
                } else {
                    draw::draw_empty_rect(self, *position, *size, *color);
                }
            }
            Operation::Ellipse { position, size, color, settings: ShapeSettings { is_filled } } => {
                if *is_filled {
                    draw::draw_filled_ellipse(self, *position, *size, *color);
                } else {
                    draw::draw_empty_ellipse(self, *position, *size, *color);
                }
            }
            Operation::Line { position, position2, color, settings } => {
                draw::draw_line(self, *position, *position2, *settings, *color);
            }
            Operation::Fill { position, color } => {
                draw::flood_fill(&mut self.data, self.size, *position, *color);
            }
            Operation::WholeImage { url } => return self.replace_with_image(url),
        }
        self.notify_draw();
        Ok(())
    }

    /// Decode `encoded` and overwrite the whole buffer with it.
    ///
    /// An image of a different size is copied over the overlapping region and
    /// the remainder cleared.
    pub fn replace_with_image(&mut self, encoded: &str) -> Result<(), CodecError> {
        let image = self.codec.decode(encoded)?;
        self.replace_with_raster(&image);
        Ok(())
    }

    /// Overwrite the buffer with already decoded pixels.
    pub fn replace_with_raster(&mut self, image: &RasterImage) {
        if image.size == self.size {
            self.data.copy_from_slice(&image.data);
        } else {
            log::debug!(
                "replacing {}x{} surface with {}x{} image, clipping",
                self.size.width,
                self.size.height,
                image.size.width,
                image.size.height
            );
            self.data = Color::TRANSPARENT.to_array().repeat(self.size.area());
            let cols = self.size.width.min(image.size.width) as usize;
            let rows = self.size.height.min(image.size.height) as usize;
            let dst_stride = self.size.width as usize * 4;
            let src_stride = image.size.width as usize * 4;
            for row in 0..rows {
                let dst = row * dst_stride;
                let src = row * src_stride;
                self.data[dst..dst + cols * 4].copy_from_slice(&image.data[src..src + cols * 4]);
            }
        }
        self.notify_draw();
    }

    /// Copy of the current pixels.
    pub fn snapshot(&self) -> RasterImage {
        RasterImage {
            size: self.size,
            data: self.data.clone(),
        }
    }

    /// Transport encoding of the current pixels.
    pub fn encode(&self) -> Result<String, CodecError> {
        self.codec.encode(&self.snapshot())
    }

    fn index(&self, x: i64, y: i64) -> usize {
        (y as usize * self.size.width as usize + x as usize) * 4
    }

    fn notify_draw(&mut self) {
        for observer in &mut self.observers {
            observer();
        }
    }

    /// Clip a rectangle to the surface. Returns pixel ranges `(x0..x1, y0..y1)`.
    fn clip(&self, x: i64, y: i64, w: i64, h: i64) -> Option<(usize, usize, usize, usize)> {
        let (x, y, w, h) = normalize_rect(x, y, w, h)?;
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(i64::from(self.size.width));
        let y1 = (y + h).min(i64::from(self.size.height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as usize, x1 as usize, y0 as usize, y1 as usize))
    }
}

impl Canvas for Surface {
    fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Color) {
        let Some((x0, x1, y0, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        let width = self.size.width as usize;
        for py in y0..y1 {
            for px in x0..x1 {
                let i = (py * width + px) * 4;
                let dst = Color::from_array([
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ]);
                self.data[i..i + 4].copy_from_slice(&color.over(dst).to_array());
            }
        }
    }

    fn clear_rect(&mut self, x: i64, y: i64, w: i64, h: i64) {
        let Some((x0, x1, y0, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        let width = self.size.width as usize;
        let background = Color::TRANSPARENT.to_array();
        for py in y0..y1 {
            for px in x0..x1 {
                let i = (py * width + px) * 4;
                self.data[i..i + 4].copy_from_slice(&background);
            }
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("size", &self.size)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
