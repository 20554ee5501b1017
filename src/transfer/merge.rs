//! Content merge
//!
//! Combines two content rows of the same substance into one, averaging the
//! concentration by volume. Pure: the caller writes the result back and
//! disposes of the incoming row.

use tracing::error;

use super::error::TransferError;
use crate::models::Content;

/// Merge `incoming` into `existing` and return the new state of `existing`.
///
/// The merged quantity is expressed in `existing`'s unit. Both operands are
/// normalized to ml before combining, so their units may differ.
///
/// Merging two empty rows yields concentration `0.0`.
///
/// Calling this twice for the same pair double-counts the incoming volume.
pub fn merge(existing: &Content, incoming: &Content) -> Result<Content, TransferError> {
    if existing.substance.id != incoming.substance.id {
        error!(
            existing_content = existing.id,
            incoming_content = incoming.id,
            existing = %existing.substance,
            incoming = %incoming.substance,
            "Merge invoked across different substances"
        );
        return Err(TransferError::SubstanceMismatch {
            existing: existing.substance.name.clone(),
            incoming: incoming.substance.name.clone(),
        });
    }

    let old_vol = existing.to_ml();
    let incoming_vol = incoming.to_ml();
    let new_vol = old_vol + incoming_vol;

    let concentration = if new_vol == 0.0 {
        0.0
    } else {
        (existing.concentration * old_vol + incoming.concentration * incoming_vol) / new_vol
    };

    let mut merged = existing.clone();
    merged.concentration = concentration;
    merged.volume.set_ml(new_vol)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Substance;
    use crate::volume::{Unit, Volume};

    fn ml() -> Unit {
        Unit::new(1, "ml", "Millilitres", 1.0)
    }

    fn ul() -> Unit {
        Unit::new(2, "ul", "Microlitres", 0.001)
    }

    fn cytarabine() -> Substance {
        Substance {
            id: 1,
            name: "Cytarabine".to_string(),
        }
    }

    fn content(id: i64, substance: Substance, conc: f64, quantity: f64, unit: Unit) -> Content {
        Content {
            id,
            substance,
            container_id: id,
            concentration: conc,
            volume: Volume::new(quantity, unit),
        }
    }

    #[test]
    fn test_concentration_averaging() {
        let existing = content(1, cytarabine(), 50.0, 0.25, ml());
        let incoming = content(2, cytarabine(), 25.0, 0.5, ml());

        let merged = merge(&existing, &incoming).unwrap();
        assert!((merged.to_ml() - 0.75).abs() < 1e-12);
        assert!((merged.concentration - 100.0 / 3.0).abs() < 1e-9);
        // identity of the existing row is preserved
        assert_eq!(merged.id, 1);
        assert_eq!(merged.container_id, 1);
    }

    #[test]
    fn test_unit_normalization() {
        // 250 ul == 0.25 ml; result stays in the existing row's unit
        let existing = content(1, cytarabine(), 50.0, 250.0, ul());
        let incoming = content(2, cytarabine(), 25.0, 0.5, ml());

        let merged = merge(&existing, &incoming).unwrap();
        assert_eq!(merged.volume.unit.short_name, "ul");
        assert!((merged.volume.quantity - 750.0).abs() < 1e-9);
        assert!((merged.to_ml() - 0.75).abs() < 1e-12);
        assert!((merged.concentration - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_incoming_untouched() {
        let existing = content(1, cytarabine(), 50.0, 0.25, ml());
        let incoming = content(2, cytarabine(), 25.0, 0.5, ml());
        let before = incoming.clone();

        merge(&existing, &incoming).unwrap();
        assert_eq!(incoming, before);
    }

    #[test]
    fn test_substance_mismatch() {
        let existing = content(1, cytarabine(), 50.0, 0.25, ml());
        let other = Substance {
            id: 2,
            name: "Bortezomib".to_string(),
        };
        let incoming = content(2, other, 25.0, 0.5, ml());

        let err = merge(&existing, &incoming).unwrap_err();
        assert_eq!(
            err,
            TransferError::SubstanceMismatch {
                existing: "Cytarabine".into(),
                incoming: "Bortezomib".into(),
            }
        );
    }

    #[test]
    fn test_zero_volume_merge_is_defined() {
        let existing = content(1, cytarabine(), 50.0, 0.0, ml());
        let incoming = content(2, cytarabine(), 25.0, 0.0, ul());

        let merged = merge(&existing, &incoming).unwrap();
        assert_eq!(merged.concentration, 0.0);
        assert_eq!(merged.volume.quantity, 0.0);
    }

    #[test]
    fn test_merge_into_empty_row_takes_incoming_concentration() {
        let existing = content(1, cytarabine(), 50.0, 0.0, ml());
        let incoming = content(2, cytarabine(), 25.0, 0.5, ml());

        let merged = merge(&existing, &incoming).unwrap();
        assert_eq!(merged.concentration, 25.0);
        assert_eq!(merged.volume.quantity, 0.5);
    }
}
