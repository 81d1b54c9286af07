//! Views - live, incrementally maintained query results.
//!
//! A view caches the results of a query for one fixed signature. It is
//! seeded once when created and from then on only changes when an entity
//! crosses the match boundary of that signature: the manager adds the entity
//! on the edge into matching and removes it on the edge out, so there is
//! never a rescan of the entity set.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::trace;

use crate::{
    entity::EntityId,
    query::{QueryResult, QueryResults},
    signature::Signature,
};

struct ViewInner {
    signature: Signature,
    results: RwLock<Vec<QueryResult>>,
}

/// Handle to a registered view. Cheap to clone.
///
/// Created by [`Manager::create_view`](crate::Manager::create_view) and kept
/// up to date by the manager for the manager's lifetime.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    pub(crate) fn new(signature: Signature, results: Vec<QueryResult>) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                signature,
                results: RwLock::new(results),
            }),
        }
    }

    /// The signature this view tracks.
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.inner.signature
    }

    /// Snapshot of the current contents. Order is unspecified.
    #[must_use]
    pub fn get(&self) -> QueryResults {
        QueryResults::from(self.inner.results.read().clone())
    }

    /// Number of entities currently in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.results.read().len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.results.read().is_empty()
    }

    /// Whether the entity with `id` is currently in the view.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.inner.results.read().iter().any(|r| r.id() == id)
    }

    /// Append a result for an entity that just started matching.
    pub(crate) fn add(&self, result: QueryResult) {
        trace!("view {:?} gained entity {}", self.inner.signature, result.id());
        self.inner.results.write().push(result);
    }

    /// Remove the entity with `id`, if present.
    ///
    /// Finding the entity is a linear scan; the removal itself swaps the
    /// last result into its place.
    pub(crate) fn remove(&self, id: EntityId) -> bool {
        let mut results = self.inner.results.write();
        let Some(position) = results.iter().position(|r| r.id() == id) else {
            return false;
        };
        results.swap_remove(position);
        trace!("view {:?} lost entity {id}", self.inner.signature);
        true
    }

    /// Replace the cached result for an entity whose payload was swapped out
    /// while it kept matching.
    pub(crate) fn refresh(&self, result: QueryResult) {
        let mut results = self.inner.results.write();
        if let Some(slot) = results.iter_mut().find(|r| r.id() == result.id()) {
            *slot = result;
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("signature", &self.inner.signature)
            .field("len", &self.len())
            .finish()
    }
}
