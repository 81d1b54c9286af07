#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::float_cmp)]

//! Bitmask ECS - in-memory entity component store with live views
//!
//! Entities are opaque identities; components are typed payload slots that
//! each own one bit of a 64-bit signature. Queries select entities by
//! signature, and views keep the result of a query up to date as components
//! come and go.
//!
//! # Key Concepts
//!
//! - **Entity**: An identity plus its aggregate signature
//! - **Component**: A registered payload slot with a unique bit (at most 64)
//! - **Signature**: A bitmask of required components, optionally inverse
//! - **Query**: A one-shot scan returning matching entities and payloads
//! - **View**: A cached query updated in place on every attach/detach edge
//!
//! # Usage
//!
//! ```ignore
//! let manager = Manager::new();
//! let walk = manager.new_component::<Walk>()?;
//! let talk = manager.new_component::<Talk>()?;
//!
//! manager.new_entity()
//!     .add_component(&walk, Walk { direction: "north", distance: 12.4 })
//!     .add_component(&talk, Talk { message: "Fluctuat nec mergitur." });
//!
//! // One-shot query
//! for result in manager.query(signature![walk, talk]) {
//!     let walk = result.get(&walk).unwrap();
//! }
//!
//! // Cached query, maintained incrementally
//! let talkers = manager.create_view(signature![talk]);
//! let silent = manager.create_view(signature![talk].inverse());
//! ```
//!
//! # Concurrency
//!
//! [`Manager`], [`Entity`], [`Component`] and [`View`] are cheap handles that
//! can be shared across threads. Each component guards its payloads with its
//! own lock; the manager lock covers the entity, component and view
//! registries and the signature/view update step of attach and detach.

mod component;
mod entity;
mod error;
mod manager;
mod query;
mod signature;
mod view;

pub use component::{Component, ComponentId, MAX_COMPONENTS};
pub use entity::{Entity, EntityId};
pub use error::{EcsError, EcsResult};
pub use manager::Manager;
pub use query::{QueryResult, QueryResults};
pub use signature::{AsSignature, Signature};
pub use view::View;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AsSignature, Component, EcsError, EcsResult, Entity, EntityId, Manager, QueryResult,
        QueryResults, Signature, View,
    };
}
