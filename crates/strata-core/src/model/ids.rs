//! Arena indices for model elements. Stable for the lifetime of a loaded model.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(EntityTypeId, "entity");
arena_id!(AttributeId, "attribute");
arena_id!(ReferenceId, "reference");
