//! Container and content models
//!
//! These are the rows the transfer engine reads and writes. A `Container`
//! never carries its contents; the loaded "current state" of a vessel is a
//! [`ContainerState`], which is what capacity checks and the boundary layer
//! work from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{ContainerId, ContentId, KindId, SubstanceId, UnitId};
use crate::volume::Volume;

/// A named maximum capacity, e.g. "ScienceCorp's 1ml Test Tube"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerKind {
    pub id: KindId,
    pub name: String,
    pub capacity: Volume,
}

/// An instance of a real container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub kind: ContainerKind,
}

impl Container {
    /// Max volume of this container in ml
    #[inline]
    pub fn container_volume(&self) -> f64 {
        self.kind.capacity.to_ml()
    }

    pub fn to_ref(&self) -> ContainerRef {
        ContainerRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.kind.name)
    }
}

/// Identity of a container as recorded in audit rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: ContainerId,
    pub name: String,
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A named chemical identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Substance {
    pub id: SubstanceId,
    pub name: String,
}

impl fmt::Display for Substance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Quantity and concentration of one substance inside one container.
///
/// At most one row exists per `(substance, container)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub substance: Substance,
    pub container_id: ContainerId,
    /// Micromolar
    pub concentration: f64,
    pub volume: Volume,
}

impl Content {
    #[inline]
    pub fn to_ml(&self) -> f64 {
        self.volume.to_ml()
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.volume, self.substance)
    }
}

/// Fields for a content row that has not been inserted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewContent {
    pub container_id: ContainerId,
    pub substance_id: SubstanceId,
    pub concentration: f64,
    pub quantity: f64,
    pub unit_id: UnitId,
}

/// A container together with the content rows it currently holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub container: Container,
    pub contents: Vec<Content>,
}

impl ContainerState {
    pub fn new(container: Container, contents: Vec<Content>) -> Self {
        Self {
            container,
            contents,
        }
    }

    /// Sum of the canonical (ml) volumes of all current contents
    pub fn content_volume(&self) -> f64 {
        self.contents.iter().fold(0.0, |acc, c| acc + c.to_ml())
    }

    /// Capacity of the container in ml
    pub fn container_volume(&self) -> f64 {
        self.container.container_volume()
    }

    /// Remaining room in ml; negative if the container is already overfull
    pub fn free_volume(&self) -> f64 {
        self.container_volume() - self.content_volume()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Unit;

    fn ml() -> Unit {
        Unit::new(1, "ml", "Millilitres", 1.0)
    }

    fn ul() -> Unit {
        Unit::new(2, "ul", "Microlitres", 0.001)
    }

    fn tube(id: ContainerId, name: &str) -> Container {
        Container {
            id,
            name: name.to_string(),
            kind: ContainerKind {
                id: 1,
                name: "Tube".to_string(),
                capacity: Volume::new(1.0, ml()),
            },
        }
    }

    fn content(id: ContentId, substance: &str, quantity: f64, unit: Unit) -> Content {
        Content {
            id,
            substance: Substance {
                id,
                name: substance.to_string(),
            },
            container_id: 1,
            concentration: 25.0,
            volume: Volume::new(quantity, unit),
        }
    }

    #[test]
    fn test_empty_container_has_zero_content_volume() {
        let state = ContainerState::new(tube(1, "TubeA"), vec![]);
        assert_eq!(state.content_volume(), 0.0);
        assert_eq!(state.container_volume(), 1.0);
        assert_eq!(state.free_volume(), 1.0);
        assert!(state.is_empty());
    }

    #[test]
    fn test_content_volume_mixes_units() {
        let state = ContainerState::new(
            tube(1, "TubeA"),
            vec![content(1, "Cytarabine", 0.5, ml()), content(2, "Bortezomib", 250.0, ul())],
        );
        assert!((state.content_volume() - 0.75).abs() < 1e-12);
        // Reading twice without a write yields the same value
        assert_eq!(state.content_volume(), state.content_volume());
        assert_eq!(state.contents[1].to_ml(), 0.25);
    }

    #[test]
    fn test_display() {
        assert_eq!(tube(1, "TubeA").to_string(), "TubeA [Tube]");
        assert_eq!(
            content(1, "Cytarabine", 0.5, ml()).to_string(),
            "0.5 ml of Cytarabine"
        );
    }
}
