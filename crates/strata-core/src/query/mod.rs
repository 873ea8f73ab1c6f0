//! Already-resolved query customizers: filters, keyset seek, attribute masks.

pub mod customizer;
pub mod cursor;
pub mod filter;

pub use customizer::{AttributeMask, OrderBy, QueryCustomizer, Seek};
pub use cursor::{Page, SeekCursor};
pub use filter::{Condition, Filter, Operator};
