//! Parameter types for normalization.
//!
//! These structs describe *what* the normalizer should aim for, not *how* the
//! pixels get there. They sit between configuration (fractional qualities,
//! byte budgets read from TOML) and the [`normalize`](super::normalize) loop.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality held as an integer percent (1–100).
//!   Clamped on construction. Displayed on the 0.0–1.0 scale.
//! - [`QualitySchedule`]: Initial quality, step and floor of the retry loop.
//! - [`Limits`]: Pixel bounds and byte budget.

use std::fmt;

/// Quality setting for lossy image encoding, in percent (1-100).
///
/// Held as an integer so that stepping down by 10 from 90 lands exactly on
/// 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub fn new(percent: u32) -> Self {
        Self(percent.clamp(1, 100) as u8)
    }

    /// Build from the 0.0–1.0 scale, rounding to the nearest percent.
    pub fn from_fraction(fraction: f64) -> Self {
        Self::new((fraction * 100.0).round().max(0.0) as u32)
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.fraction())
    }
}

/// Serialized on the 0.0–1.0 scale used in configuration and manifests.
impl serde::Serialize for Quality {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.fraction())
    }
}

/// Descending sequence of qualities tried by the encode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySchedule {
    initial: Quality,
    step: u8,
    floor: Quality,
}

impl QualitySchedule {
    /// Returns `None` when the step is zero or the floor is above the initial
    /// quality; neither describes a terminating descent.
    pub fn new(initial: Quality, step: u8, floor: Quality) -> Option<Self> {
        if step == 0 || floor > initial {
            return None;
        }
        Some(Self {
            initial,
            step,
            floor,
        })
    }

    pub fn initial(&self) -> Quality {
        self.initial
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn floor(&self) -> Quality {
        self.floor
    }

    /// All qualities in the order they are tried.
    ///
    /// Starts at `initial`, subtracts `step` while above `floor`, and clamps
    /// the last step to `floor` so the floor is always the final attempt and
    /// never undercut.
    pub fn qualities(&self) -> Vec<Quality> {
        let mut out = vec![self.initial];
        let mut current = self.initial.percent();
        let floor = self.floor.percent();
        while current > floor {
            current = current.saturating_sub(self.step).max(floor);
            out.push(Quality(current));
        }
        out
    }
}

impl Default for QualitySchedule {
    fn default() -> Self {
        Self {
            initial: Quality(90),
            step: 10,
            floor: Quality(50),
        }
    }
}

/// Pixel bounds and byte budget for a normalized image.
///
/// The resize math treats a zero bound as one pixel; [`Limits::new`]
/// refuses zero outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_bytes: usize,
}

impl Limits {
    /// Returns `None` if any bound or the byte budget is zero.
    pub fn new(max_width: u32, max_height: u32, max_bytes: usize) -> Option<Self> {
        if max_width == 0 || max_height == 0 || max_bytes == 0 {
            return None;
        }
        Some(Self {
            max_width,
            max_height,
            max_bytes,
        })
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1920,
            max_bytes: 1024 * 1024,
        }
    }
}
