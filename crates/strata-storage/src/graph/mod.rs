//! Select plan construction and instance graph collection.

pub mod collector;
pub mod links;
pub mod plan;

pub use collector::InstanceGraphCollector;
pub use plan::{PlanBuilder, PlanEdge, PlanId, PlanNode, SelectPlan, SubSelect, UnitSql};
