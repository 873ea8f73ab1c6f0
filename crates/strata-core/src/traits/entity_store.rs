use crate::errors::PersistenceResult;
use crate::graph::InstanceGraph;
use crate::payload::{Id, Payload};
use crate::query::{Filter, Page, QueryCustomizer};

/// CRUD + query + reference maintenance over model-mapped entities.
///
/// Entity types and references are addressed by model name; references by the
/// name declared on the owning type (or one of its supertypes).
pub trait EntityStore: Send + Sync {
    // --- Read ---
    fn get_by_identifier(
        &self,
        entity: &str,
        id: &Id,
        customizer: Option<&QueryCustomizer>,
    ) -> PersistenceResult<Option<Payload>>;
    fn search(&self, entity: &str, customizer: &QueryCustomizer) -> PersistenceResult<Page<Payload>>;
    fn count(&self, entity: &str, filter: Option<&Filter>) -> PersistenceResult<u64>;

    // --- Write ---
    fn create(&self, entity: &str, payload: Payload) -> PersistenceResult<Payload>;
    fn update(&self, entity: &str, payload: Payload) -> PersistenceResult<Payload>;
    fn delete(&self, entity: &str, ids: &[Id]) -> PersistenceResult<usize>;

    // --- References ---
    fn set_reference(
        &self,
        entity: &str,
        reference: &str,
        owner: &Id,
        targets: &[Id],
    ) -> PersistenceResult<()>;
    fn add_references(
        &self,
        entity: &str,
        reference: &str,
        owner: &Id,
        targets: &[Id],
    ) -> PersistenceResult<()>;
    fn remove_references(
        &self,
        entity: &str,
        reference: &str,
        owner: &Id,
        targets: &[Id],
    ) -> PersistenceResult<()>;

    // --- Ranges ---
    fn get_range_of(
        &self,
        entity: &str,
        reference: &str,
        customizer: &QueryCustomizer,
    ) -> PersistenceResult<Page<Payload>>;
    fn count_range_of(
        &self,
        entity: &str,
        reference: &str,
        filter: Option<&Filter>,
    ) -> PersistenceResult<u64>;

    // --- Misc ---
    fn template(&self, entity: &str) -> PersistenceResult<Payload>;
    fn collect_graph(&self, entity: &str, ids: &[Id]) -> PersistenceResult<InstanceGraph>;
}
