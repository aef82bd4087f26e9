use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?([0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").unwrap());
static RGB_LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:rgb\s*\(\s*)?(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)?$").unwrap()
});

const NAMED_COLORS: [(&str, Rgb); 13] = [
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("purple", Rgb::new(128, 0, 128)),
    ("orange", Rgb::new(255, 165, 0)),
    ("gray", Rgb::new(128, 128, 128)),
    ("brown", Rgb::new(165, 42, 42)),
    ("pink", Rgb::new(255, 192, 203)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
];

/// WCAG AA threshold for normal text.
pub const CONTRAST_AA: f32 = 4.5;
/// WCAG AAA threshold for normal text.
pub const CONTRAST_AAA: f32 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Relative luminance of the color, channels linearized from sRGB.
    pub fn relative_luminance(self) -> f32 {
        fn linear(channel: u8) -> f32 {
            let c = channel as f32 / 255.0;
            if c <= 0.040_45 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }
}

/// Colors used when a component or text element leaves one unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub text_color: String,
    pub fill_color: String,
    pub line_color: String,
    pub background: String,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            text_color: "#000000".to_string(),
            fill_color: "#FFFFFF".to_string(),
            line_color: "#000000".to_string(),
            background: "#FFFFFF".to_string(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

/// Parses `#rgb`, `#rrggbb`, `r,g,b`, `rgb(r,g,b)` and a small set of HTML names.
pub fn parse_color(value: &str) -> Option<Rgb> {
    let trimmed = value.trim();
    if let Some(caps) = HEX_RE.captures(trimmed) {
        let hex = &caps[1];
        let expanded: String = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).collect()
        } else {
            hex.to_string()
        };
        let r = u8::from_str_radix(&expanded[0..2], 16).ok()?;
        let g = u8::from_str_radix(&expanded[2..4], 16).ok()?;
        let b = u8::from_str_radix(&expanded[4..6], 16).ok()?;
        return Some(Rgb::new(r, g, b));
    }
    if let Some(caps) = RGB_LIST_RE.captures(trimmed) {
        let r: u16 = caps[1].parse().ok()?;
        let g: u16 = caps[2].parse().ok()?;
        let b: u16 = caps[3].parse().ok()?;
        if r > 255 || g > 255 || b > 255 {
            return None;
        }
        return Some(Rgb::new(r as u8, g as u8, b as u8));
    }
    let lower = trimmed.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgb)| *rgb)
}

pub fn contrast_ratio(a: Rgb, b: Rgb) -> f32 {
    let la = a.relative_luminance();
    let lb = b.relative_luminance();
    let (lighter, darker) = if la >= lb { (la, lb) } else { (lb, la) };
    (lighter + 0.05) / (darker + 0.05)
}
