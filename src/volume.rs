//! Volume Conversion Module
//!
//! Every volume-bearing row stores a `(quantity, unit)` pair. All arithmetic
//! that combines or compares volumes goes through the canonical unit
//! (milliliters) first, so operands recorded in different units mix correctly.
//!
//! ## Internal Representation
//! - `quantity` is an IEEE double in the row's own unit
//! - `Unit::to_ml` is the factor to milliliters (e.g. `0.001` for microliters)
//! - No extra rounding is applied anywhere
//!
//! ## Usage
//! ```rust
//! use tubes::volume::{Unit, Volume};
//!
//! let ul = Unit::new(2, "ul", "Microlitres", 0.001);
//! let v = Volume::new(250.0, ul);
//! assert_eq!(v.to_ml(), 0.25);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core_types::UnitId;

// ============================================================================
// Error Types
// ============================================================================

/// Volume conversion errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VolumeError {
    #[error("Invalid unit {unit}: to_ml must be a positive finite number, got {to_ml}")]
    InvalidUnit { unit: String, to_ml: f64 },

    #[error("Invalid quantity {quantity}: must be a non-negative finite number")]
    InvalidQuantity { quantity: f64 },
}

// ============================================================================
// Unit
// ============================================================================

/// A unit keeps track of its size relative to 1ml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub short_name: String,
    pub long_name: String,
    pub to_ml: f64,
}

impl Unit {
    pub fn new(id: UnitId, short_name: &str, long_name: &str, to_ml: f64) -> Self {
        Self {
            id,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            to_ml,
        }
    }

    /// Reject factors that would make `from_ml` divide by zero or flip sign
    pub fn validate(&self) -> Result<(), VolumeError> {
        validate_factor(&self.short_name, self.to_ml)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.long_name)
    }
}

fn validate_factor(name: &str, to_ml: f64) -> Result<(), VolumeError> {
    if to_ml.is_finite() && to_ml > 0.0 {
        Ok(())
    } else {
        Err(VolumeError::InvalidUnit {
            unit: name.to_string(),
            to_ml,
        })
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Convert a quantity expressed in `unit` to milliliters
#[inline]
pub fn to_ml(quantity: f64, unit: &Unit) -> f64 {
    quantity * unit.to_ml
}

/// Convert milliliters to a quantity expressed in `unit`
///
/// # Errors
/// * `InvalidUnit` - if `unit.to_ml <= 0` (or not finite)
pub fn from_ml(ml: f64, unit: &Unit) -> Result<f64, VolumeError> {
    validate_factor(&unit.short_name, unit.to_ml)?;
    Ok(ml / unit.to_ml)
}

// ============================================================================
// Volume
// ============================================================================

/// A quantity together with the unit it was recorded in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub quantity: f64,
    pub unit: Unit,
}

impl Volume {
    pub fn new(quantity: f64, unit: Unit) -> Self {
        Self { quantity, unit }
    }

    /// The volume in milliliters
    #[inline]
    pub fn to_ml(&self) -> f64 {
        to_ml(self.quantity, &self.unit)
    }

    /// Set quantity such that `quantity * unit.to_ml == ml`, keeping the unit
    pub fn set_ml(&mut self, ml: f64) -> Result<(), VolumeError> {
        self.quantity = from_ml(ml, &self.unit)?;
        Ok(())
    }

    /// Check the row-level invariants: a valid unit and `quantity >= 0`
    pub fn validate(&self) -> Result<(), VolumeError> {
        self.unit.validate()?;
        if self.quantity.is_finite() && self.quantity >= 0.0 {
            Ok(())
        } else {
            Err(VolumeError::InvalidQuantity {
                quantity: self.quantity,
            })
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.unit.short_name)
    }
}
