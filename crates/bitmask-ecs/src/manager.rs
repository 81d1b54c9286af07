//! Manager - the main container for all store data.
//!
//! The manager owns the entity index, the component registry and the view
//! registry. Structural changes (entity creation and disposal, component and
//! view registration) serialize through one manager lock. Attach and detach
//! write payloads under the component's own lock and only take the manager
//! lock for the signature update and view notification that follow.
//!
//! Lock order is always manager, then component, then view. No component
//! lock is held while the manager lock is acquired, and destructors run with
//! no lock held at all.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::{
    component::{Component, ComponentId, ErasedComponent, MAX_COMPONENTS},
    entity::{Entity, EntityId, EntityIndex, EntityRecord},
    error::{EcsError, EcsResult},
    query::{ErasedPayload, QueryResult, QueryResults},
    signature::Signature,
    view::View,
};

/// Payloads held by one entity: component, its bit, the payload.
type HeldPayloads = SmallVec<[(ComponentId, u64, ErasedPayload); 8]>;

/// State shared by every handle of one manager.
pub(crate) struct ManagerShared {
    state: RwLock<ManagerState>,
    next_entity: AtomicU64,
    next_component: AtomicU32,
}

/// Everything guarded by the manager lock.
struct ManagerState {
    entities: EntityIndex,
    /// Indexed by component ID.
    components: Vec<Arc<dyn ErasedComponent>>,
    views: Vec<View>,
}

impl ManagerState {
    /// Build the query result for `record` against `signature`.
    ///
    /// `None` if the entity does not match, or if a required component has
    /// no payload for it. The latter means the signature and payload maps
    /// disagree, which is logged and treated as no match.
    fn resolve(
        &self,
        this: &Weak<ManagerShared>,
        record: &Arc<EntityRecord>,
        signature: Signature,
    ) -> Option<QueryResult> {
        if !record.signature().matches(signature) {
            return None;
        }

        let required = signature.required_bits();
        let mut components = SmallVec::new();

        for component in &self.components {
            if required & component.signature().bits() == 0 {
                continue;
            }

            let Some(payload) = component.erased_payload(record.id()) else {
                warn!(
                    "entity {} claims {:?} but holds no payload for it",
                    record.id(),
                    component.id()
                );
                return None;
            };
            components.push((component.id(), payload));
        }

        Some(QueryResult::new(
            Entity::new(Arc::clone(record), this.clone()),
            components,
        ))
    }

    /// Every payload `record` currently holds, read once per component.
    fn held_payloads(&self, record: &EntityRecord) -> HeldPayloads {
        self.components
            .iter()
            .filter_map(|component| {
                let payload = component.erased_payload(record.id())?;
                Some((component.id(), component.signature().bits(), payload))
            })
            .collect()
    }

    /// Rebuild the entity signature from payload presence, then apply the
    /// resulting edges to every view.
    ///
    /// The signature and any view results built here come from the same
    /// payload snapshot, so an entity entering a view always resolves. A
    /// payload that changes after the snapshot is picked up by the sync of
    /// the call that changed it.
    ///
    /// `replaced` is set when an attach of the component owning `bit`
    /// overwrote a live payload; views that keep matching then get their
    /// cached result refreshed.
    fn sync_signature(
        &self,
        this: &Weak<ManagerShared>,
        record: &Arc<EntityRecord>,
        bit: u64,
        replaced: bool,
    ) {
        let held = self.held_payloads(record);
        let before = record.signature();
        let after = Signature::from_bits(held.iter().fold(0_u64, |bits, (_, b, _)| bits | b));
        record.set_signature(after);

        // Disposed entities may still leave views but never enter them.
        let alive = self.entities.contains(record.id());

        let result_for = |required: Signature| {
            let components = held
                .iter()
                .filter(|(_, b, _)| required.required_bits() & b != 0)
                .map(|(id, _, payload)| (*id, Arc::clone(payload)))
                .collect();
            QueryResult::new(Entity::new(Arc::clone(record), this.clone()), components)
        };

        for view in &self.views {
            let required = view.signature();
            match (before.matches(required), after.matches(required)) {
                (false, true) if alive => view.add(result_for(required)),
                (true, false) => {
                    view.remove(record.id());
                }
                (true, true) if replaced && required.required_bits() & bit != 0 => {
                    view.refresh(result_for(required));
                }
                _ => {}
            }
        }
    }
}

/// The store - container for all entities, components and views.
///
/// Cheap to clone; clones share the same store and can be used from any
/// number of threads.
///
/// # Example
///
/// ```ignore
/// let manager = Manager::new();
/// let walk = manager.new_component::<Walk>()?;
/// let talk = manager.new_component::<Talk>()?;
///
/// manager.new_entity()
///     .add_component(&walk, Walk { distance: 12.4 })
///     .add_component(&talk, Talk { message: "hi".into() });
///
/// let talkers = manager.create_view(signature![talk]);
/// for result in manager.query(signature![walk, talk]) {
///     let walk = result.get(&walk).unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct Manager {
    shared: Arc<ManagerShared>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a manager with room for `entity_capacity` entities before the
    /// entity index reallocates.
    #[must_use]
    pub fn with_capacity(entity_capacity: usize) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                state: RwLock::new(ManagerState {
                    entities: EntityIndex::with_capacity(entity_capacity),
                    components: Vec::new(),
                    views: Vec::new(),
                }),
                next_entity: AtomicU64::new(0),
                next_component: AtomicU32::new(0),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    fn downgrade(&self) -> Weak<ManagerShared> {
        Arc::downgrade(&self.shared)
    }

    // ==================== Entity Operations ====================

    /// Create a new entity with no components.
    pub fn new_entity(&self) -> Entity {
        let id = EntityId::from_raw(self.shared.next_entity.fetch_add(1, Ordering::Relaxed));
        let record = Arc::new(EntityRecord::new(id));
        let this = self.downgrade();

        let mut state = self.shared.state.write();
        state.entities.insert(Arc::clone(&record));

        // Coming into existence is an edge to the empty signature: views the
        // empty signature satisfies (inverse views) take the entity in now.
        for view in &state.views {
            let required = view.signature();
            if Signature::EMPTY.matches(required) {
                if let Some(result) = state.resolve(&this, &record, required) {
                    view.add(result);
                }
            }
        }
        drop(state);

        trace!("created entity {id}");
        Entity::new(record, this)
    }

    /// Look up a live entity by ID.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        let state = self.shared.state.read();
        let record = state.entities.get(id)?;
        Some(Entity::new(Arc::clone(record), self.downgrade()))
    }

    /// Whether an entity with this ID exists and has not been disposed.
    #[must_use]
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.shared.state.read().entities.contains(id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.shared.state.read().entities.len()
    }

    /// Dispose an entity: detach (and destruct) all its components, pull it
    /// out of every view and retire its ID.
    ///
    /// Returns `true` if the entity existed and was disposed.
    pub fn dispose_entity(&self, entity: &Entity) -> bool {
        if !entity.belongs_to(&self.shared) {
            return false;
        }

        // Leave the index first so no concurrent attach can revive the entity.
        let components = {
            let mut state = self.shared.state.write();
            if state.entities.remove(entity.id()).is_none() {
                trace!("dispose of unknown entity {} ignored", entity.id());
                return false;
            }
            state.components.clone()
        };

        let this = self.downgrade();
        for component in &components {
            if component.release(entity) {
                self.shared.state.write().sync_signature(
                    &this,
                    entity.record(),
                    component.signature().bits(),
                    false,
                );
            }
        }

        // Views the empty signature satisfies still hold the entity.
        let state = self.shared.state.write();
        for view in &state.views {
            view.remove(entity.id());
        }
        drop(state);

        debug!("disposed entity {}", entity.id());
        true
    }

    /// Dispose each entity independently, skipping ones already gone.
    ///
    /// Returns the number of entities actually disposed.
    pub fn dispose_entities<'a, I>(&self, entities: I) -> usize
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        entities
            .into_iter()
            .filter(|entity| self.dispose_entity(entity))
            .count()
    }

    // ==================== Component Operations ====================

    /// Register a new component holding payloads of type `T`.
    ///
    /// Each component claims the next free signature bit. Fails once all
    /// [`MAX_COMPONENTS`] bits are taken; components registered earlier
    /// remain usable.
    pub fn new_component<T: Send + Sync + 'static>(&self) -> EcsResult<Component<T>> {
        let mut state = self.shared.state.write();

        let index = self
            .shared
            .next_component
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_COMPONENTS).then_some(n + 1)
            })
            .map_err(|_| {
                error!("component overflow: all {MAX_COMPONENTS} signature bits are taken");
                EcsError::ComponentOverflow {
                    limit: MAX_COMPONENTS,
                }
            })?;

        let component = Component::new(ComponentId::from_raw(index), self.downgrade());
        state.components.push(component.erased());

        debug!(
            "registered {:?} for {}",
            component.id(),
            std::any::type_name::<T>()
        );
        Ok(component)
    }

    /// Number of registered components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.shared.state.read().components.len()
    }

    /// Attach `payload` to `entity` under `component`.
    ///
    /// If the entity already holds this component, the payload is replaced.
    /// Attaching to a disposed entity, or mixing handles from different
    /// managers, does nothing.
    pub fn attach_component<T: Send + Sync + 'static>(
        &self,
        entity: &Entity,
        component: &Component<T>,
        payload: T,
    ) {
        if !entity.belongs_to(&self.shared) || !component.belongs_to(&self.shared) {
            warn!(
                "attach of {:?} to entity {} ignored: handle from another manager",
                component.id(),
                entity.id()
            );
            return;
        }

        let payload = Arc::new(payload);
        let replaced = component.store(entity.id(), Arc::clone(&payload));

        let state = self.shared.state.write();
        if !state.entities.contains(entity.id()) {
            component.discard(entity.id(), &payload);
            trace!(
                "attach of {:?} to disposed entity {} ignored",
                component.id(),
                entity.id()
            );
            return;
        }

        state.sync_signature(
            &self.downgrade(),
            entity.record(),
            component.signature().bits(),
            replaced,
        );
        drop(state);

        trace!("attached {:?} to entity {}", component.id(), entity.id());
    }

    /// Detach `component` from `entity`, running its destructor first.
    ///
    /// No-op if the entity does not hold the component.
    pub fn detach_component<T: Send + Sync + 'static>(
        &self,
        entity: &Entity,
        component: &Component<T>,
    ) {
        if !entity.belongs_to(&self.shared) || !component.belongs_to(&self.shared) {
            return;
        }

        if !component.release(entity) {
            return;
        }

        self.shared.state.write().sync_signature(
            &self.downgrade(),
            entity.record(),
            component.signature().bits(),
            false,
        );

        trace!("detached {:?} from entity {}", component.id(), entity.id());
    }

    // ==================== Query Operations ====================

    /// Resolve one entity against `signature`.
    ///
    /// `None` if the entity is unknown or disposed, or does not match.
    #[must_use]
    pub fn get_entity_by_id(&self, id: EntityId, signature: Signature) -> Option<QueryResult> {
        let state = self.shared.state.read();
        let record = state.entities.get(id)?;
        state.resolve(&self.downgrade(), record, signature)
    }

    /// Scan every live entity and collect those matching `signature`.
    ///
    /// Costs O(entities x components); use [`Manager::create_view`] for
    /// signatures queried repeatedly.
    #[must_use]
    pub fn query(&self, signature: Signature) -> QueryResults {
        let this = self.downgrade();
        let state = self.shared.state.read();
        state
            .entities
            .iter()
            .filter_map(|record| state.resolve(&this, record, signature))
            .collect()
    }

    /// Create a view on `signature`, seeded with every entity matching now
    /// and kept up to date from then on.
    pub fn create_view(&self, signature: Signature) -> View {
        let this = self.downgrade();
        let mut state = self.shared.state.write();

        let seed: Vec<QueryResult> = state
            .entities
            .iter()
            .filter_map(|record| state.resolve(&this, record, signature))
            .collect();

        let view = View::new(signature, seed);
        state.views.push(view.clone());
        drop(state);

        debug!(
            "created view for {signature:?} with {} entities",
            view.len()
        );
        view
    }

    /// Number of registered views.
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.shared.state.read().views.len()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Manager")
            .field("entities", &state.entities.len())
            .field("components", &state.components.len())
            .field("views", &state.views.len())
            .finish()
    }
}
