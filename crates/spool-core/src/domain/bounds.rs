//! Bounds: a layer rectangle with change diffing.
//!
//! Raw coordinates come from the host as JSON numbers or strings (sometimes
//! with a unit suffix, e.g. `"12px"`). They are normalized to integers the
//! same way for every side.

use serde::{Deserialize, Serialize};

use crate::error::BoundsError;

/// Rectangle in document pixels. `right`/`bottom` are exclusive edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
}

/// A raw coordinate as sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawCoordinate {
    /// Normalize to an integer.
    ///
    /// - floats are truncated toward zero
    /// - strings use their leading integer (`" -3.5px"` -> `-3`)
    fn parse(&self, side: &'static str) -> Result<i64, BoundsError> {
        let invalid = || BoundsError::InvalidCoordinate {
            side,
            raw: self.to_string(),
        };
        match self {
            RawCoordinate::Int(v) => Ok(*v),
            RawCoordinate::Float(v) if v.is_finite() => Ok(v.trunc() as i64),
            RawCoordinate::Float(_) => Err(invalid()),
            RawCoordinate::Text(s) => leading_integer(s).ok_or_else(invalid),
        }
    }
}

impl std::fmt::Display for RawCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawCoordinate::Int(v) => write!(f, "{v}"),
            RawCoordinate::Float(v) => write!(f, "{v}"),
            RawCoordinate::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RawCoordinate {
    fn from(v: i64) -> Self {
        RawCoordinate::Int(v)
    }
}

impl From<&str> for RawCoordinate {
    fn from(s: &str) -> Self {
        RawCoordinate::Text(s.to_string())
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

/// Partial update of a [`Bounds`]. Absent sides are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<RawCoordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<RawCoordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<RawCoordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<RawCoordinate>,
}

/// Previous value of a side that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideChange {
    pub previous: i64,
}

/// Sides that actually changed when a [`BoundsChange`] was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<SideChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<SideChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<SideChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<SideChange>,
}

impl BoundsDiff {
    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.right.is_none() && self.bottom.is_none() && self.left.is_none()
    }
}

impl Bounds {
    pub fn new(top: i64, right: i64, bottom: i64, left: i64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Width, clamped at zero for inverted bounds.
    pub fn width(&self) -> u32 {
        clamp_extent(self.right.saturating_sub(self.left))
    }

    /// Height, clamped at zero for inverted bounds.
    pub fn height(&self) -> u32 {
        clamp_extent(self.bottom.saturating_sub(self.top))
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Apply a partial update and report which sides changed.
    ///
    /// Every present side is parsed before anything is written, so an
    /// invalid coordinate leaves `self` untouched. Returns `Ok(None)` when no
    /// side changed value.
    pub fn apply_change(&mut self, change: &BoundsChange) -> Result<Option<BoundsDiff>, BoundsError> {
        let parse = |raw: &Option<RawCoordinate>, side| raw.as_ref().map(|r| r.parse(side)).transpose();
        let top = parse(&change.top, "top")?;
        let right = parse(&change.right, "right")?;
        let bottom = parse(&change.bottom, "bottom")?;
        let left = parse(&change.left, "left")?;

        let diff = BoundsDiff {
            top: update_side(&mut self.top, top),
            right: update_side(&mut self.right, right),
            bottom: update_side(&mut self.bottom, bottom),
            left: update_side(&mut self.left, left),
        };

        Ok((!diff.is_empty()).then_some(diff))
    }

    /// Scale to new bounds positioned at the origin.
    ///
    /// Extents saturate at `i64::MAX`; a NaN factor gives empty bounds.
    pub fn scale(&self, factor: f64) -> Bounds {
        // f64 -> i64 の `as` は飽和する
        let scaled = |extent: i64| (extent as f64 * factor).round() as i64;
        Bounds {
            top: 0,
            left: 0,
            bottom: scaled(self.bottom.saturating_sub(self.top)),
            right: scaled(self.right.saturating_sub(self.left)),
        }
    }
}

fn clamp_extent(extent: i64) -> u32 {
    u32::try_from(extent.max(0)).unwrap_or(u32::MAX)
}

fn update_side(side: &mut i64, value: Option<i64>) -> Option<SideChange> {
    let value = value?;
    let previous = *side;
    *side = value;
    (previous != value).then_some(SideChange { previous })
}
