//! Reference descriptors: directed edges between entity types.

use super::{EntityTypeId, ReferenceId};
use crate::query::Filter;

/// Lower/upper bounds of a reference. `upper == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplicity {
    pub lower: u32,
    pub upper: Option<u32>,
}

impl Multiplicity {
    pub fn is_to_one(&self) -> bool {
        self.upper == Some(1)
    }

    pub fn is_many(&self) -> bool {
        !self.is_to_one()
    }

    /// True when `count` lies within the bounds.
    pub fn admits(&self, count: usize) -> bool {
        let lower_ok = count >= self.lower as usize;
        let upper_ok = self.upper.map_or(true, |u| count <= u as usize);
        lower_ok && upper_ok
    }
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub id: ReferenceId,
    pub name: String,
    /// Containing (declaring) entity type.
    pub owner: EntityTypeId,
    pub target: EntityTypeId,
    pub multiplicity: Multiplicity,
    pub containment: bool,
    pub derived: bool,
    pub opposite: Option<ReferenceId>,
    pub embedded: bool,
    /// Candidate filter for range queries.
    pub range: Option<Filter>,
}

impl Reference {
    pub fn is_to_one(&self) -> bool {
        self.multiplicity.is_to_one()
    }

    pub fn is_many(&self) -> bool {
        self.multiplicity.is_many()
    }

    pub fn lower(&self) -> u32 {
        self.multiplicity.lower
    }

    pub fn upper(&self) -> Option<u32> {
        self.multiplicity.upper
    }
}
