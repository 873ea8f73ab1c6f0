//! Physical name resolution over the mapping trace.

pub mod resolver;

pub use resolver::{
    ColumnRef, ForeignKeyMapping, JoinTableMapping, SchemaResolver, SchemaResolverConfig, TableInfo,
};
