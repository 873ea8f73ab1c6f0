//! Reference storage rule classification.

pub mod classifier;

pub use classifier::{EdgeLink, ReferenceRuleClassifier, StorageRule};
