//! Component registration slots and their payload storage.
//!
//! A component is a registered payload slot for one kind of data. Each one
//! claims a single bit of the [`Signature`] mask and owns a map from entity
//! to payload, guarded by its own lock so that unrelated components can be
//! mutated concurrently.
//!
//! Payloads are typed per component (`Component<T>`) and shared as `Arc<T>`.
//! The manager only sees components through [`ErasedComponent`].

use std::{
    any::Any,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{
    entity::{Entity, EntityId},
    manager::{Manager, ManagerShared},
    signature::{AsSignature, Signature},
};

/// Number of signature bits, and therefore the most components a manager
/// can register.
pub const MAX_COMPONENTS: u32 = u64::BITS;

/// Unique identifier for a registered component, equal to its bit index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Create a component ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// Callback run when a payload is detached from an entity.
type Destructor<T> = Arc<dyn Fn(&Entity, &T) + Send + Sync>;

/// A stored payload.
struct PayloadSlot<T> {
    payload: Arc<T>,
    /// Set while the destructor for this entry runs. The entry stays readable
    /// until the destructor returns but can no longer be detached again.
    dropping: bool,
}

/// Shared state behind a [`Component`] handle.
pub(crate) struct ComponentSlot<T> {
    id: ComponentId,
    signature: Signature,
    manager: Weak<ManagerShared>,
    payloads: RwLock<FxHashMap<EntityId, PayloadSlot<T>>>,
    destructor: RwLock<Option<Destructor<T>>>,
}

impl<T: Send + Sync + 'static> ComponentSlot<T> {
    fn payload(&self, entity: EntityId) -> Option<Arc<T>> {
        self.payloads
            .read()
            .get(&entity)
            .map(|slot| Arc::clone(&slot.payload))
    }

    /// Store `payload`, returning `true` if it replaced a live entry.
    fn store(&self, entity: EntityId, payload: Arc<T>) -> bool {
        let previous = self.payloads.write().insert(
            entity,
            PayloadSlot {
                payload,
                dropping: false,
            },
        );
        previous.is_some()
    }

    /// Remove the entry for `entity` if it still holds exactly `payload`.
    fn discard(&self, entity: EntityId, payload: &Arc<T>) {
        let mut payloads = self.payloads.write();
        if payloads
            .get(&entity)
            .is_some_and(|slot| Arc::ptr_eq(&slot.payload, payload))
        {
            payloads.remove(&entity);
        }
    }

    /// Detach the entry for `entity`, running the destructor first.
    ///
    /// Returns `false` when there was no live entry. The destructor runs
    /// without the payload lock held, at most once per entry.
    fn release(&self, entity: &Entity) -> bool {
        let id = entity.id();
        let destructor = self.destructor.read().clone();

        let Some(destructor) = destructor else {
            let mut payloads = self.payloads.write();
            let live = payloads.get(&id).is_some_and(|slot| !slot.dropping);
            return live && payloads.remove(&id).is_some();
        };

        let payload = {
            let mut payloads = self.payloads.write();
            match payloads.get_mut(&id) {
                Some(slot) if !slot.dropping => {
                    slot.dropping = true;
                    Arc::clone(&slot.payload)
                }
                _ => return false,
            }
        };

        destructor(entity, &payload);

        // A concurrent attach may have replaced the entry meanwhile; keep it.
        let mut payloads = self.payloads.write();
        if payloads
            .get(&id)
            .is_some_and(|slot| slot.dropping && Arc::ptr_eq(&slot.payload, &payload))
        {
            payloads.remove(&id);
        }
        true
    }
}

/// Type-erased view of a component, as stored in the manager registry.
pub(crate) trait ErasedComponent: Send + Sync {
    fn id(&self) -> ComponentId;

    fn signature(&self) -> Signature;

    /// Whether an entry exists for `entity`.
    fn contains(&self, entity: EntityId) -> bool;

    /// Payload for `entity`, type-erased.
    fn erased_payload(&self, entity: EntityId) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Detach the payload for `entity`; see [`ComponentSlot::release`].
    fn release(&self, entity: &Entity) -> bool;
}

impl<T: Send + Sync + 'static> ErasedComponent for ComponentSlot<T> {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn signature(&self) -> Signature {
        self.signature
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.payloads.read().contains_key(&entity)
    }

    fn erased_payload(&self, entity: EntityId) -> Option<Arc<dyn Any + Send + Sync>> {
        let payload: Arc<dyn Any + Send + Sync> = self.payload(entity)?;
        Some(payload)
    }

    fn release(&self, entity: &Entity) -> bool {
        Self::release(self, entity)
    }
}

/// Handle to a registered component holding payloads of type `T`.
///
/// Cheap to clone; all clones refer to the same slot. Created by
/// [`Manager::new_component`].
///
/// # Example
///
/// ```ignore
/// let manager = Manager::new();
/// let talk = manager.new_component::<Talk>()?;
///
/// let entity = manager.new_entity();
/// talk.attach(&entity, Talk { message: "hi".into() });
/// assert_eq!(talk.get(&entity).unwrap().message, "hi");
/// ```
pub struct Component<T> {
    slot: Arc<ComponentSlot<T>>,
}

impl<T> Clone for Component<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + Sync + 'static> Component<T> {
    pub(crate) fn new(id: ComponentId, manager: Weak<ManagerShared>) -> Self {
        Self {
            slot: Arc::new(ComponentSlot {
                id,
                signature: Signature::single(id.as_raw()),
                manager,
                payloads: RwLock::new(FxHashMap::default()),
                destructor: RwLock::new(None),
            }),
        }
    }

    /// Get the component ID.
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.slot.id
    }

    /// Single-bit signature of this component.
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.slot.signature
    }

    /// Install the callback run whenever a payload is detached, including
    /// when its entity is disposed.
    ///
    /// The callback receives the payload about to be removed. It must not
    /// call back into the manager.
    pub fn set_destructor<F>(&self, destructor: F)
    where
        F: Fn(&Entity, &T) + Send + Sync + 'static,
    {
        *self.slot.destructor.write() = Some(Arc::new(destructor));
    }

    /// Attach `payload` to `entity`, replacing any previous payload.
    ///
    /// Same as [`Entity::add_component`].
    pub fn attach(&self, entity: &Entity, payload: T) {
        if let Some(manager) = self.manager() {
            manager.attach_component(entity, self, payload);
        }
    }

    /// Detach this component from `entity`. No-op if it is not attached.
    ///
    /// Same as [`Entity::remove_component`].
    pub fn detach(&self, entity: &Entity) {
        if let Some(manager) = self.manager() {
            manager.detach_component(entity, self);
        }
    }

    /// Payload attached to `entity`, if any.
    #[must_use]
    pub fn get(&self, entity: &Entity) -> Option<Arc<T>> {
        self.slot.payload(entity.id())
    }

    /// Whether a payload is attached to `entity`.
    #[must_use]
    pub fn has(&self, entity: &Entity) -> bool {
        self.slot.contains(entity.id())
    }

    /// Number of entities holding this component.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slot.payloads.read().len()
    }

    /// Whether no entity holds this component.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.payloads.read().is_empty()
    }

    fn manager(&self) -> Option<Manager> {
        self.slot.manager.upgrade().map(Manager::from_shared)
    }

    pub(crate) fn belongs_to(&self, manager: &Arc<ManagerShared>) -> bool {
        std::ptr::eq(self.slot.manager.as_ptr(), Arc::as_ptr(manager))
    }

    pub(crate) fn store(&self, entity: EntityId, payload: Arc<T>) -> bool {
        self.slot.store(entity, payload)
    }

    pub(crate) fn discard(&self, entity: EntityId, payload: &Arc<T>) {
        self.slot.discard(entity, payload);
    }

    pub(crate) fn release(&self, entity: &Entity) -> bool {
        self.slot.release(entity)
    }

    pub(crate) fn erased(&self) -> Arc<dyn ErasedComponent> {
        Arc::clone(&self.slot) as Arc<dyn ErasedComponent>
    }

    /// Whether this component and a handle holding `manager` share a store.
    pub(crate) fn shares_manager(&self, manager: &Weak<ManagerShared>) -> bool {
        Weak::ptr_eq(&self.slot.manager, manager)
    }
}

impl<T> AsSignature for Component<T> {
    fn as_signature(&self) -> Signature {
        self.slot.signature
    }
}

impl<T> From<&Component<T>> for Signature {
    fn from(component: &Component<T>) -> Self {
        component.slot.signature
    }
}

impl<T> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.slot.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
