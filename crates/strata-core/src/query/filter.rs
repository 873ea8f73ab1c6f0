//! Resolved filter expressions.
//!
//! The expression DSL front end produces these trees; the query factory renders
//! them into parameterized SQL. Comparison values stay JSON until they are
//! coerced against the filtered attribute's datatype.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
    In,
}

impl Operator {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::In => "IN",
        }
    }

    /// Unary operators take no comparison value.
    pub fn is_unary(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// A single attribute comparison. `attribute` may be `__id` for the identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub op: Operator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Condition(Condition),
}

impl Filter {
    pub fn condition(attribute: &str, op: Operator, value: Option<serde_json::Value>) -> Self {
        Self::Condition(Condition {
            attribute: attribute.to_string(),
            op,
            value,
        })
    }

    pub fn eq(attribute: &str, value: impl Into<serde_json::Value>) -> Self {
        Self::condition(attribute, Operator::Eq, Some(value.into()))
    }

    /// Conjunction of two optional filters.
    pub fn both(left: Option<Filter>, right: Option<Filter>) -> Option<Filter> {
        match (left, right) {
            (Some(l), Some(r)) => Some(Self::And(vec![l, r])),
            (l, None) => l,
            (None, r) => r,
        }
    }

    /// Every attribute name the filter mentions.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_attributes(out);
                }
            }
            Self::Not(inner) => inner.collect_attributes(out),
            Self::Condition(c) => out.push(&c.attribute),
        }
    }
}
