//! Query customizer passed alongside DAO reads.

use serde::{Deserialize, Serialize};

use super::Filter;
use crate::constants::DEFAULT_PAGE_SIZE;

/// Optional filter, keyset seek, ordering and attribute mask for a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCustomizer {
    pub filter: Option<Filter>,
    pub seek: Option<Seek>,
    pub order_by: Option<OrderBy>,
    pub mask: Option<AttributeMask>,
}

impl QueryCustomizer {
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn with_seek(mut self, seek: Seek) -> Self {
        self.seek = Some(seek);
        self
    }

    pub fn with_order(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_mask(mut self, mask: AttributeMask) -> Self {
        self.mask = Some(mask);
        self
    }
}

/// Keyset pagination descriptor: no OFFSET, constant-time page retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seek {
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Encoded cursor from the previous page.
    #[serde(default)]
    pub after: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Seek {
    pub fn first(limit: usize) -> Self {
        Self { limit, after: None }
    }

    pub fn after(limit: usize, cursor: impl Into<String>) -> Self {
        Self {
            limit,
            after: Some(cursor.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub attribute: String,
    #[serde(default)]
    pub descending: bool,
}

/// Restricts which attributes and containments a read returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMask {
    pub attributes: Vec<String>,
    #[serde(default = "default_true")]
    pub include_containments: bool,
}

fn default_true() -> bool {
    true
}

impl AttributeMask {
    pub fn only(attributes: &[&str]) -> Self {
        Self {
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
            include_containments: true,
        }
    }

    pub fn admits(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}
