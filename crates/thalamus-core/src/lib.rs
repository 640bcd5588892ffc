//! Node graph runtime shared by every Thalamus crate: the observable state
//! tree, the node graph and modality traits, the single-threaded reactor,
//! and the concurrency primitives built on top of it.
//!
//! ```text
//!            ┌─────────────────────────────────────────┐
//!            │               reactor thread              │
//!            │  ┌───────────┐   ready/changed signals   │
//!            │  │ NodeGraph │ ───────────────────────▶  │
//!            │  └───────────┘                            │
//!            └───────────────────▲───────────────────────┘
//!                   Job (Send)    │ oneshot result
//!            ┌───────────────────┴───────────────────────┐
//!            │     tokio runtime: RPC tasks, adapters      │
//!            └─────────────────────────────────────────────┘
//! ```
//!
//! Node state (`Rc<RefCell<dyn Node>>`) and the observable tree
//! (`Rc<RefCell<ObservableDict>>`) never leave the reactor thread. Anything
//! that needs to read or mutate them posts a [`reactor::Job`] and gets a
//! result back over a oneshot channel.

pub mod concurrent;
pub mod error;
pub mod graph;
pub mod modality;
pub mod node;
pub mod observable;
pub mod reactor;
pub mod signal;
pub mod value;

pub use error::{Result, ThalamusError};
pub use graph::{GraphEvent, NodeGraph};
pub use modality::Modality;
pub use node::{Node, NodeHandle};
pub use observable::{ObservableDict, ObservableList};
pub use reactor::{spawn_reactor, ReactorHandle};
pub use signal::{Connection, Signal};
pub use value::{Action, Key, Value};
