//! Query results: snapshots of matching entities and their payloads.
//!
//! A [`QueryResult`] pairs one entity with the payloads of exactly the
//! components its query signature requires. The set of components is fixed
//! when the result is built; the payloads themselves are shared, so a
//! payload with interior mutability shows later writes through old results.
//!
//! # Basic Usage
//!
//! ```ignore
//! for result in manager.query(signature![walk, talk]) {
//!     let walk = result.get(&walk).unwrap();
//!     let talk = result.get(&talk).unwrap();
//!     println!("{} walks {} and says {}", result.entity(), walk.distance, talk.message);
//! }
//! ```

use std::{any::Any, fmt, ops::Deref, sync::Arc};

use smallvec::SmallVec;

use crate::{
    component::{Component, ComponentId},
    entity::{Entity, EntityId},
};

/// Type-erased payload shared with the owning component.
pub(crate) type ErasedPayload = Arc<dyn Any + Send + Sync>;

/// One entity matched by a query, with its resolved payloads.
#[derive(Clone)]
pub struct QueryResult {
    entity: Entity,
    components: SmallVec<[(ComponentId, ErasedPayload); 4]>,
}

impl QueryResult {
    pub(crate) fn new(
        entity: Entity,
        components: SmallVec<[(ComponentId, ErasedPayload); 4]>,
    ) -> Self {
        Self { entity, components }
    }

    /// The matched entity.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// ID of the matched entity.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    /// Payload resolved for `component`.
    ///
    /// `None` if the component was not part of the query signature.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, component: &Component<T>) -> Option<Arc<T>> {
        let id = component.id();
        let (_, payload) = self.components.iter().find(|(c, _)| *c == id)?;
        Arc::clone(payload).downcast::<T>().ok()
    }

    /// Whether a payload was resolved for `component`.
    #[must_use]
    pub fn contains(&self, component: ComponentId) -> bool {
        self.components.iter().any(|(c, _)| *c == component)
    }

    /// IDs of the components resolved for this result, in registration order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.iter().map(|(c, _)| *c)
    }

    /// Number of resolved components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component was resolved (as for inverse signatures).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("entity", &self.entity)
            .field("components", &self.component_ids().collect::<Vec<_>>())
            .finish()
    }
}

/// Collection of query results.
#[derive(Clone, Debug, Default)]
pub struct QueryResults(Vec<QueryResult>);

impl QueryResults {
    /// Entities of every result, in result order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.0.iter().map(|r| r.entity.clone()).collect()
    }

    /// Entity IDs of every result, in result order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.0.iter().map(QueryResult::id).collect()
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<QueryResult> {
        self.0
    }
}

impl Deref for QueryResults {
    type Target = [QueryResult];

    fn deref(&self) -> &[QueryResult] {
        &self.0
    }
}

impl From<Vec<QueryResult>> for QueryResults {
    fn from(results: Vec<QueryResult>) -> Self {
        Self(results)
    }
}

impl FromIterator<QueryResult> for QueryResults {
    fn from_iter<I: IntoIterator<Item = QueryResult>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for QueryResults {
    type Item = QueryResult;
    type IntoIter = std::vec::IntoIter<QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
