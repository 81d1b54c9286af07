//! Entity identities and the manager's entity index.
//!
//! Entity IDs come from a strictly increasing counter and are never reused,
//! even after disposal. Each entity carries its aggregate signature: the OR
//! of the bits of every component currently attached to it.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{
    component::Component,
    manager::{Manager, ManagerShared},
    signature::Signature,
};

/// Unique identifier for an entity within one manager.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Create an entity ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and signature of an entity, shared by all its handles.
pub(crate) struct EntityRecord {
    id: EntityId,
    /// Written only by the manager while it holds its lock.
    signature: AtomicU64,
}

impl EntityRecord {
    pub(crate) const fn new(id: EntityId) -> Self {
        Self {
            id,
            signature: AtomicU64::new(0),
        }
    }

    pub(crate) const fn id(&self) -> EntityId {
        self.id
    }

    pub(crate) fn signature(&self) -> Signature {
        Signature::from_bits(self.signature.load(Ordering::Acquire))
    }

    pub(crate) fn set_signature(&self, signature: Signature) {
        self.signature.store(signature.bits(), Ordering::Release);
    }
}

/// Handle to an entity.
///
/// Cheap to clone. Equality and hashing go by [`EntityId`]. The handle keeps
/// only a weak reference to its manager: once the manager is dropped, the
/// mutating methods do nothing and lookups come back empty.
#[derive(Clone)]
pub struct Entity {
    record: Arc<EntityRecord>,
    manager: Weak<ManagerShared>,
}

impl Entity {
    pub(crate) fn new(record: Arc<EntityRecord>, manager: Weak<ManagerShared>) -> Self {
        Self { record, manager }
    }

    /// Get the entity's ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.record.id
    }

    /// Current aggregate signature.
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.record.signature()
    }

    /// Whether the current signature satisfies `required`.
    #[must_use]
    pub fn matches(&self, required: Signature) -> bool {
        self.record.signature().matches(required)
    }

    /// Attach `payload` under `component`, replacing any previous payload.
    ///
    /// Returns `self` so calls can be chained:
    ///
    /// ```ignore
    /// manager.new_entity()
    ///     .add_component(&walk, Walk { distance: 12.4 })
    ///     .add_component(&talk, Talk { message: "hi".into() });
    /// ```
    pub fn add_component<T: Send + Sync + 'static>(
        &self,
        component: &Component<T>,
        payload: T,
    ) -> &Self {
        if let Some(manager) = self.manager() {
            manager.attach_component(self, component, payload);
        }
        self
    }

    /// Detach `component`. No-op if it is not attached.
    pub fn remove_component<T: Send + Sync + 'static>(&self, component: &Component<T>) -> &Self {
        if let Some(manager) = self.manager() {
            manager.detach_component(self, component);
        }
        self
    }

    /// Whether `component`'s bit is set in the signature.
    ///
    /// Always `false` for a component registered with another manager.
    #[must_use]
    pub fn has_component<T: Send + Sync + 'static>(&self, component: &Component<T>) -> bool {
        component.shares_manager(&self.manager) && self.matches(component.signature())
    }

    /// Payload attached under `component`, if any.
    #[must_use]
    pub fn get_component_data<T: Send + Sync + 'static>(
        &self,
        component: &Component<T>,
    ) -> Option<Arc<T>> {
        if !component.shares_manager(&self.manager) {
            return None;
        }
        component.get(self)
    }

    /// Whether the entity is still registered with a live manager.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.manager()
            .is_some_and(|manager| manager.contains_entity(self.id()))
    }

    /// The manager this entity belongs to, if it still exists.
    #[must_use]
    pub fn manager(&self) -> Option<Manager> {
        self.manager.upgrade().map(Manager::from_shared)
    }

    pub(crate) fn belongs_to(&self, manager: &Arc<ManagerShared>) -> bool {
        std::ptr::eq(self.manager.as_ptr(), Arc::as_ptr(manager))
    }

    pub(crate) fn record(&self) -> &Arc<EntityRecord> {
        &self.record
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.record.id == other.record.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.record.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.record.id.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record.id.0)
    }
}

/// Dense list of live entities plus an index from ID to list position.
///
/// Removal swaps the last entity into the freed slot, so iteration order is
/// not stable across removals.
#[derive(Default)]
pub(crate) struct EntityIndex {
    entities: Vec<Arc<EntityRecord>>,
    positions: HashMap<EntityId, usize, FxBuildHasher>,
}

impl EntityIndex {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
        }
    }

    pub(crate) fn insert(&mut self, record: Arc<EntityRecord>) {
        self.positions.insert(record.id, self.entities.len());
        self.entities.push(record);
    }

    /// Remove an entity, returning its record if it was present.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<Arc<EntityRecord>> {
        let position = self.positions.remove(&id)?;
        let record = self.entities.swap_remove(position);

        // Update the swapped entity's position if needed
        if let Some(moved) = self.entities.get(position) {
            self.positions.insert(moved.id, position);
        }

        Some(record)
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&Arc<EntityRecord>> {
        let &position = self.positions.get(&id)?;
        self.entities.get(position)
    }

    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.positions.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<EntityRecord>> {
        self.entities.iter()
    }
}
