//! Color values: parsing from tokens, HSL/RGB conversion, the adjustment
//! functions and CSS rendering.
//!
//! A color remembers whether it was written as RGB or HSL. Adjustments
//! that work in HSL space (`lighten`, `spin`, ...) keep the input's notation,
//! so `saturate(hsl(90, 80%, 50%), 20%)` prints as `hsl(90,100%,50%)` rather
//! than a hex code. Blending (`mix`, `tint`, `shade`) always yields RGB.

use crate::error::ValueError;
use crate::math::{format_number, parse_number, Number};
use crate::token::{matching, render, split_top_level, trim, Token, TokenKind};

/// Channels in `0..=255`, alpha in `0..=1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// Hue in degrees `0..360`, saturation and lightness in percent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hsla {
    pub h: f64,
    pub s: f64,
    pub l: f64,
    pub a: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Color {
    Rgb(Rgba),
    Hsl(Hsla),
}

const NAMED: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x008000),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("orange", 0xffa500),
    ("purple", 0x800080),
    ("gray", 0x808080),
    ("grey", 0x808080),
    ("silver", 0xc0c0c0),
    ("maroon", 0x800000),
    ("olive", 0x808000),
    ("lime", 0x00ff00),
    ("aqua", 0x00ffff),
    ("cyan", 0x00ffff),
    ("teal", 0x008080),
    ("navy", 0x000080),
    ("fuchsia", 0xff00ff),
    ("magenta", 0xff00ff),
];

fn clamp(value: f64, max: f64) -> f64 {
    value.clamp(0.0, max)
}

impl Rgba {
    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    fn from_hex(value: u32) -> Self {
        Self::new(
            ((value >> 16) & 0xff) as f64,
            ((value >> 8) & 0xff) as f64,
            (value & 0xff) as f64,
            1.0,
        )
    }

    pub fn to_hsla(self) -> Hsla {
        let r = self.r / 255.0;
        let g = self.g / 255.0;
        let b = self.b / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let d = max - min;
        if d == 0.0 {
            return Hsla {
                h: 0.0,
                s: 0.0,
                l: l * 100.0,
                a: self.a,
            };
        }
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        Hsla {
            h: h * 60.0,
            s: s * 100.0,
            l: l * 100.0,
            a: self.a,
        }
    }
}

impl Hsla {
    pub fn to_rgba(self) -> Rgba {
        let h = self.h.rem_euclid(360.0) / 360.0;
        let s = clamp(self.s, 100.0) / 100.0;
        let l = clamp(self.l, 100.0) / 100.0;
        if s == 0.0 {
            let v = l * 255.0;
            return Rgba::new(v, v, v, self.a);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let channel = |t: f64| {
            let t = t.rem_euclid(1.0);
            let v = if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            };
            v * 255.0
        };
        Rgba::new(
            channel(h + 1.0 / 3.0),
            channel(h),
            channel(h - 1.0 / 3.0),
            self.a,
        )
    }
}

/// HSV with hue in degrees and saturation/value as fractions.
fn hsv_to_rgba(h: f64, s: f64, v: f64, a: f64) -> Rgba {
    let h = h.rem_euclid(360.0) / 60.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match i as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgba::new(r * 255.0, g * 255.0, b * 255.0, a)
}

impl Color {
    pub fn rgba(&self) -> Rgba {
        match self {
            Color::Rgb(c) => *c,
            Color::Hsl(c) => c.to_rgba(),
        }
    }

    pub fn hsla(&self) -> Hsla {
        match self {
            Color::Rgb(c) => c.to_hsla(),
            Color::Hsl(c) => *c,
        }
    }

    pub fn alpha(&self) -> f64 {
        match self {
            Color::Rgb(c) => c.a,
            Color::Hsl(c) => c.a,
        }
    }

    /// Apply an HSL-space change, keeping the original notation.
    pub fn adjust(&self, f: impl FnOnce(&mut Hsla)) -> Color {
        let mut hsla = self.hsla();
        f(&mut hsla);
        hsla.s = clamp(hsla.s, 100.0);
        hsla.l = clamp(hsla.l, 100.0);
        hsla.a = clamp(hsla.a, 1.0);
        match self {
            Color::Rgb(_) => Color::Rgb(hsla.to_rgba()),
            Color::Hsl(_) => Color::Hsl(hsla),
        }
    }

    pub fn with_alpha(&self, alpha: f64) -> Color {
        let a = clamp(alpha, 1.0);
        match *self {
            Color::Rgb(c) => Color::Rgb(Rgba { a, ..c }),
            Color::Hsl(c) => Color::Hsl(Hsla { a, ..c }),
        }
    }

    /// Blend two colors. `weight` is the share of `self` in `0..=1`.
    pub fn mix(&self, other: &Color, weight: f64) -> Color {
        let c1 = self.rgba();
        let c2 = other.rgba();
        let w = weight * 2.0 - 1.0;
        let a = c1.a - c2.a;
        let w1 = (if w * a == -1.0 {
            w
        } else {
            (w + a) / (1.0 + w * a)
        } + 1.0)
            / 2.0;
        let w2 = 1.0 - w1;
        Color::Rgb(Rgba::new(
            c1.r * w1 + c2.r * w2,
            c1.g * w1 + c2.g * w2,
            c1.b * w1 + c2.b * w2,
            c1.a * weight + c2.a * (1.0 - weight),
        ))
    }

    /// `#rgb` or `#rrggbb`; `text` excludes the `#`.
    pub fn from_hex(text: &str) -> Option<Color> {
        if !text.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = match text.len() {
            3 => {
                let expanded: String = text.chars().flat_map(|c| [c, c]).collect();
                u32::from_str_radix(&expanded, 16).ok()?
            }
            6 => u32::from_str_radix(text, 16).ok()?,
            _ => return None,
        };
        Some(Color::Rgb(Rgba::from_hex(value)))
    }

    pub fn named(name: &str) -> Option<Color> {
        let name = name.to_ascii_lowercase();
        if name == "transparent" {
            return Some(Color::Rgb(Rgba::new(0.0, 0.0, 0.0, 0.0)));
        }
        NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| Color::Rgb(Rgba::from_hex(*v)))
    }

    /// Build a color from a constructor call such as `rgb(255, 0, 0)`.
    /// Returns `Ok(None)` when the arguments are not plain numbers, so calls
    /// like `rgb(var(--x))` can pass through to the browser.
    pub fn construct(name: &str, args: &[&[Token]]) -> Result<Option<Color>, ValueError> {
        if name == "rgba" && args.len() == 2 {
            if let Some(color) = Color::parse(args[0]) {
                let Some(alpha) = parse_number(args[1]) else {
                    return Ok(None);
                };
                return Ok(Some(color.with_alpha(alpha_value(&alpha))));
            }
        }
        let Some(numbers) = args
            .iter()
            .map(|a| parse_number(a))
            .collect::<Option<Vec<Number>>>()
        else {
            return Ok(None);
        };
        let expected = match name {
            "rgb" | "hsl" | "hsv" => 3,
            _ => 4,
        };
        if numbers.len() != expected {
            return Err(ValueError::arity(name, &expected.to_string(), numbers.len()));
        }
        let alpha = numbers.get(3).map_or(1.0, alpha_value);
        let color = match name {
            "rgb" | "rgba" => Color::Rgb(Rgba::new(
                clamp(channel_value(&numbers[0]), 255.0),
                clamp(channel_value(&numbers[1]), 255.0),
                clamp(channel_value(&numbers[2]), 255.0),
                clamp(alpha, 1.0),
            )),
            "hsl" | "hsla" => Color::Hsl(Hsla {
                h: numbers[0].value.rem_euclid(360.0),
                s: clamp(percent_value(&numbers[1]), 100.0),
                l: clamp(percent_value(&numbers[2]), 100.0),
                a: clamp(alpha, 1.0),
            }),
            _ => Color::Rgb(hsv_to_rgba(
                numbers[0].value,
                clamp(percent_value(&numbers[1]), 100.0) / 100.0,
                clamp(percent_value(&numbers[2]), 100.0) / 100.0,
                clamp(alpha, 1.0),
            )),
        };
        Ok(Some(color))
    }

    /// Parse a color literal: hex, a named color, or a constructor call
    /// with numeric arguments.
    pub fn parse(tokens: &[Token]) -> Option<Color> {
        let tokens = trim(tokens);
        let first = tokens.first()?;
        match first.kind {
            TokenKind::Hash => Color::from_hex(&render(&tokens[1..])),
            TokenKind::Ident if tokens.len() == 1 => Color::named(&first.text),
            TokenKind::Ident if tokens.get(1).is_some_and(|t| t.is(TokenKind::LParen)) => {
                let close = matching(tokens, 1)?;
                if close != tokens.len() - 1 {
                    return None;
                }
                let name = first.text.to_ascii_lowercase();
                if !matches!(name.as_str(), "rgb" | "rgba" | "hsl" | "hsla" | "hsv" | "hsva") {
                    return None;
                }
                let args = split_top_level(&tokens[2..close], TokenKind::Comma);
                Color::construct(&name, &args).ok().flatten()
            }
            _ => None,
        }
    }
}

fn channel_value(n: &Number) -> f64 {
    if n.unit == "%" {
        n.value * 255.0 / 100.0
    } else {
        n.value
    }
}

/// Saturation or lightness in percent; bare fractions are scaled.
fn percent_value(n: &Number) -> f64 {
    if n.unit.is_empty() && n.value <= 1.0 {
        n.value * 100.0
    } else {
        n.value
    }
}

fn alpha_value(n: &Number) -> f64 {
    if n.unit == "%" {
        n.value / 100.0
    } else {
        n.value
    }
}

fn round_channel(v: f64) -> u8 {
    clamp(v, 255.0).round() as u8
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::Rgb(c) if c.a >= 1.0 => write!(
                f,
                "#{:02x}{:02x}{:02x}",
                round_channel(c.r),
                round_channel(c.g),
                round_channel(c.b)
            ),
            Color::Rgb(c) => write!(
                f,
                "rgba({},{},{},{})",
                round_channel(c.r),
                round_channel(c.g),
                round_channel(c.b),
                format_number(c.a)
            ),
            Color::Hsl(c) => {
                let h = c.h.round().rem_euclid(360.0);
                let (s, l) = (c.s.round(), c.l.round());
                if c.a >= 1.0 {
                    write!(f, "hsl({},{}%,{}%)", h, s, l)
                } else {
                    write!(f, "hsla({},{}%,{}%,{})", h, s, l, format_number(c.a))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn color(src: &str) -> Color {
        Color::parse(&Tokenizer::new().tokenize(src, "t.less")).unwrap()
    }

    #[test]
    fn parses_hex_and_names() {
        assert_eq!(color("#f00").to_string(), "#ff0000");
        assert_eq!(color("#336699").to_string(), "#336699");
        assert_eq!(color("navy").to_string(), "#000080");
        assert_eq!(color("transparent").to_string(), "rgba(0,0,0,0)");
        assert!(Color::from_hex("12345").is_none());
        assert!(Color::from_hex("ggg").is_none());
    }

    #[test]
    fn parses_constructors() {
        assert_eq!(color("rgb(255, 0, 0)").to_string(), "#ff0000");
        assert_eq!(color("rgba(0,0,0,.5)").to_string(), "rgba(0,0,0,0.5)");
        assert_eq!(color("hsl(90, 80%, 50%)").to_string(), "hsl(90,80%,50%)");
        assert_eq!(color("hsla(90, 80%, 50%, 0.25)").to_string(), "hsla(90,80%,50%,0.25)");
        assert_eq!(color("hsv(0, 100%, 100%)").to_string(), "#ff0000");
        assert_eq!(color("rgb(100%, 0%, 0%)").to_string(), "#ff0000");
    }

    #[test]
    fn hsl_round_trip() {
        let rgb = Rgba::new(51.0, 102.0, 153.0, 1.0);
        let back = rgb.to_hsla().to_rgba();
        assert_eq!(Color::Rgb(back).to_string(), "#336699");
        let hsl = color("#ff0000").hsla();
        assert_eq!((hsl.h, hsl.s, hsl.l), (0.0, 100.0, 50.0));
    }

    #[test]
    fn adjustments_keep_notation() {
        let saturated = color("hsl(90, 80%, 50%)").adjust(|c| c.s += 20.0);
        assert_eq!(saturated.to_string(), "hsl(90,100%,50%)");
        let spun = color("hsl(10, 90%, 50%)").adjust(|c| c.h = (c.h - 30.0).rem_euclid(360.0));
        assert_eq!(spun.to_string(), "hsl(340,90%,50%)");
        let darker = color("#ff0000").adjust(|c| c.l -= 10.0);
        assert_eq!(darker.to_string(), "#cc0000");
    }

    #[test]
    fn mixing() {
        assert_eq!(color("#f00").mix(&color("#00f"), 0.5).to_string(), "#800080");
        assert_eq!(color("#fff").mix(&color("#000"), 0.25).to_string(), "#404040");
        let faded = color("#000").with_alpha(0.5);
        assert_eq!(faded.to_string(), "rgba(0,0,0,0.5)");
    }
}
