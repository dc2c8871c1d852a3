//! RGBA8 colour with CSS hex string (de)serialisation.
//!
//! Accepted forms: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`.
//! Opaque colours serialise as `#rrggbb`, everything else as `#rrggbbaa`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("colour must start with '#': {0:?}")]
    MissingHash(String),
    #[error("colour has {0} hex digits, expected 3, 4, 6 or 8")]
    BadLength(usize),
    #[error("invalid hex digit in colour {0:?}")]
    BadDigit(String),
}

/// Straight-alpha RGBA8 colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Background value written by `clear()` and by the eraser.
    pub const TRANSPARENT: Color = Color::rgba(255, 255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_array(px: [u8; 4]) -> Self {
        Self::rgba(px[0], px[1], px[2], px[3])
    }

    /// Composite `self` source-over onto `dst`.
    pub fn over(self, dst: Color) -> Color {
        match self.a {
            255 => return self,
            0 => return dst,
            _ => {}
        }
        let sa = u32::from(self.a);
        let da = u32::from(dst.a);
        let inv = 255 - sa;
        // Scaled by 255.
        let out_a = sa * 255 + da * inv;
        let channel = |s: u8, d: u8| -> u8 {
            let num = u32::from(s) * sa * 255 + u32::from(d) * da * inv;
            ((num + out_a / 2) / out_a) as u8
        };
        Color {
            r: channel(self.r, dst.r),
            g: channel(self.g, dst.g),
            b: channel(self.b, dst.b),
            a: ((out_a + 127) / 255) as u8,
        }
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(s.to_string()))?;
        if !hex.is_ascii() {
            return Err(ColorParseError::BadDigit(s.to_string()));
        }
        let digit = |i: usize, len: usize| -> Result<u8, ColorParseError> {
            u8::from_str_radix(&hex[i..i + len], 16)
                .map_err(|_| ColorParseError::BadDigit(s.to_string()))
        };
        match hex.len() {
            3 | 4 => {
                // Short forms double each nibble: #f80 == #ff8800.
                let nibble = |i| digit(i, 1).map(|v| v * 17);
                let a = if hex.len() == 4 { nibble(3)? } else { 255 };
                Ok(Color::rgba(nibble(0)?, nibble(1)?, nibble(2)?, a))
            }
            6 | 8 => {
                let a = if hex.len() == 8 { digit(6, 2)? } else { 255 };
                Ok(Color::rgba(digit(0, 2)?, digit(2, 2)?, digit(4, 2)?, a))
            }
            n => Err(ColorParseError::BadLength(n)),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("#ff8800".parse::<Color>().unwrap(), Color::rgb(255, 136, 0));
        assert_eq!("#F80".parse::<Color>().unwrap(), Color::rgb(255, 136, 0));
        assert_eq!("#f808".parse::<Color>().unwrap(), Color::rgba(255, 136, 0, 136));
        assert_eq!(
            "#FFFFFF00".parse::<Color>().unwrap(),
            Color::TRANSPARENT
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("ff0000".parse::<Color>(), Err(ColorParseError::MissingHash(_))));
        assert!(matches!("#ff00".parse::<Color>(), Ok(_)));
        assert!(matches!("#ff000".parse::<Color>(), Err(ColorParseError::BadLength(5))));
        assert!(matches!("#gg0000".parse::<Color>(), Err(ColorParseError::BadDigit(_))));
        assert!("#ééé".parse::<Color>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Color::rgb(1, 2, 255).to_string(), "#0102ff");
        assert_eq!(Color::TRANSPARENT.to_string(), "#ffffff00");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Color::rgb(255, 0, 0)).unwrap();
        assert_eq!(json, "\"#ff0000\"");
        let back: Color = serde_json::from_str("\"#00ff0080\"").unwrap();
        assert_eq!(back, Color::rgba(0, 255, 0, 128));
        assert!(serde_json::from_str::<Color>("\"red\"").is_err());
    }

    #[test]
    fn test_over_opaque_and_transparent() {
        let dst = Color::rgb(10, 20, 30);
        assert_eq!(Color::rgb(1, 2, 3).over(dst), Color::rgb(1, 2, 3));
        assert_eq!(Color::rgba(1, 2, 3, 0).over(dst), dst);
    }

    #[test]
    fn test_over_half_black_on_white() {
        let out = Color::rgba(0, 0, 0, 128).over(Color::WHITE);
        assert_eq!(out.a, 255);
        assert!(out.r > 120 && out.r < 135);
    }

    #[test]
    fn test_over_onto_transparent_keeps_source_colour() {
        let out = Color::rgba(200, 100, 50, 128).over(Color::TRANSPARENT);
        assert_eq!((out.r, out.g, out.b, out.a), (200, 100, 50, 128));
    }
}
