//! Payloads: ordered key → value trees representing one instance and its nested instances.

pub mod coerce;
pub mod id;
pub mod json;
pub mod map;
pub mod value;

pub use id::Id;
pub use map::Payload;
pub use value::Value;
