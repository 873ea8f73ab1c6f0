//! Typed value → bindable SQL parameter conversion.

pub mod codec;
pub mod dialect;
pub mod mapper;
pub mod source;
pub mod sql_type;

pub use dialect::{Dialect, TypeNameRule};
pub use mapper::{Parameter, ParameterMapper};
pub use source::ParameterSource;
pub use sql_type::{SqlType, SqlValue, TargetClass};
