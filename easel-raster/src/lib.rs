//! # easel-raster: Pixel engine for shared drawing rooms
//!
//! Turns drawing operations into pixels on an RGBA8 buffer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   apply_operation   ┌─────────────┐
//! │ Operation   │ ──────────────────► │ Surface     │
//! │ (wire enum) │                     │ (RGBA8 buf) │
//! └─────────────┘                     └──────┬──────┘
//!                                            │ encode / replace
//!                                            ▼
//!                                     ┌─────────────┐
//!                                     │ ImageCodec  │
//!                                     │ (PNG + b64) │
//!                                     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`geometry`]: `Vec2` coordinates and canvas `Size`
//! - [`color`]: RGBA colour with CSS hex (de)serialisation
//! - [`operation`]: the tagged `Operation` enum clients submit
//! - [`draw`]: Bresenham line, Zingl ellipse, rect and flood-fill rasterisers
//! - [`surface`]: the authoritative pixel buffer
//! - [`codec`]: image encoding hook and the PNG data-URL codec

pub mod codec;
pub mod color;
pub mod draw;
pub mod geometry;
pub mod operation;
pub mod surface;

pub use codec::{CodecError, ImageCodec, PngDataUrlCodec, RasterImage};
pub use color::Color;
pub use geometry::{Size, Vec2};
pub use operation::{BrushSettings, BrushShape, Operation, ShapeSettings};
pub use surface::Surface;
