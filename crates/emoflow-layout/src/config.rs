//! Tunable layout constants.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

// ─── Color ───────────────────────────────────────────────────────────────────

/// An sRGB color, serialised as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl Rgb {
  pub const fn new(r: u8, g: u8, b: u8) -> Self { Self { r, g, b } }

  /// Channel-wise linear interpolation; `t` is clamped to `[0, 1]`.
  pub fn lerp(self, to: Rgb, t: f64) -> Rgb {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| -> u8 {
      (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8
    };
    Rgb::new(mix(self.r, to.r), mix(self.g, to.g), mix(self.b, to.b))
  }
}

impl fmt::Display for Rgb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
  }
}

impl FromStr for Rgb {
  type Err = LayoutError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let hex = s
      .strip_prefix('#')
      .filter(|h| h.len() == 6 && h.is_ascii())
      .ok_or_else(|| LayoutError::InvalidColor(s.to_owned()))?;
    let channel = |i: usize| {
      u8::from_str_radix(&hex[i..i + 2], 16)
        .map_err(|_| LayoutError::InvalidColor(s.to_owned()))
    };
    Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
  }
}

impl TryFrom<String> for Rgb {
  type Error = LayoutError;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Rgb> for String {
  fn from(c: Rgb) -> Self { c.to_string() }
}

// ─── LayoutConfig ────────────────────────────────────────────────────────────

/// Every knob of the layout pipeline. Missing fields take their defaults when
/// deserialised, so a config file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
  /// Width of a node with no outgoing middles.
  pub base_size:      f64,
  /// Growth per `ln(1 + out_degree)`.
  pub size_step:      f64,
  /// Cap on the size bonus, however connected a node is.
  pub max_size_bonus: f64,
  /// Node height as a fraction of its width.
  pub aspect:         f64,
  /// Horizontal gap between structural ranks.
  pub rank_gap:       f64,
  /// Vertical gap between nodes of the same rank.
  pub node_gap:       f64,
  /// Barycenter sweeps used to reduce crossings.
  pub sweeps:         usize,
  /// Lateral offset added per tier of the fan-out.
  pub tier_spread:    f64,
  /// Vertical drift per position in creation order.
  pub time_slope:     f64,
  /// Perpendicular distance between bundled edges from one source.
  pub bundle_spacing: f64,
  /// Minimum x and y of the laid-out nodes.
  pub padding:        f64,
  pub base_color:     Rgb,
  pub accent_color:   Rgb,
  /// Fraction of the accent reached by the most connected node.
  pub max_intensity:  f64,
  pub edge_width:     f64,
}

impl Default for LayoutConfig {
  fn default() -> Self {
    Self {
      base_size:      160.0,
      size_step:      28.0,
      max_size_bonus: 80.0,
      aspect:         0.5,
      rank_gap:       120.0,
      node_gap:       48.0,
      sweeps:         4,
      tier_spread:    40.0,
      time_slope:     24.0,
      bundle_spacing: 12.0,
      padding:        24.0,
      base_color:     Rgb::new(0xf4, 0xf4, 0xf5),
      accent_color:   Rgb::new(0x7c, 0x3a, 0xed),
      max_intensity:  0.75,
      edge_width:     1.5,
    }
  }
}
