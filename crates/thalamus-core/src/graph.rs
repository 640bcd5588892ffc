//! The node graph: a name-keyed registry of nodes plus pending-resolution
//! queues for lookups that race node creation.
//!
//! Reactor-confined: a `NodeGraph` only ever exists inside the reactor
//! thread's loop (see `reactor.rs`) and is never itself sent across
//! threads — only the `Job` closures that touch it are.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::modality::Modality;
use crate::node::NodeHandle;
use crate::observable::{ObservableDict, RemoteAck};
use crate::signal::{Connection, Signal};

type Waiter = Box<dyn FnOnce(NodeHandle)>;

/// An arbitrary `(node, time, text, payload)` event, fanned out to every
/// `Events` RPC subscription regardless of which node it names — the
/// subscription itself filters by `node`. Grounded on spec.md's
/// `Event{node, time_ns, text, payload}` wire message.
#[derive(Clone, Debug)]
pub struct GraphEvent {
    pub node: String,
    pub time_ns: u64,
    pub text: String,
    pub payload: Vec<u8>,
}

pub struct NodeGraph {
    nodes: HashMap<String, NodeHandle>,
    waiters: HashMap<String, Vec<Waiter>>,
    subscriptions: HashMap<u64, Connection>,
    next_subscription_id: u64,
    /// Root of the observable state tree. Reactor-confined like everything
    /// else here; `thalamus-rpc`'s `StateMirror`/`Eval` handlers reach it
    /// via `ReactorHandle::call` rather than holding the `Rc` themselves.
    state: Rc<RefCell<ObservableDict>>,
    events: Signal<GraphEvent>,
    /// Pending `StateMirror` acks, keyed by the outbound wire id the mirror
    /// hook assigned them. Holds the same `Rc` the hook closure installed
    /// on `state`'s remote-storage slot — see `install_mirror_acks` — so a
    /// later job posted from the inbound ack side can fire one without the
    /// `RemoteAck` (not `Send`, it closes over `Rc<RefCell<ObservableDict>>`)
    /// ever leaving the reactor thread.
    mirror_acks: Option<Rc<RefCell<HashMap<u64, RemoteAck>>>>,
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            waiters: HashMap::new(),
            subscriptions: HashMap::new(),
            next_subscription_id: 0,
            state: ObservableDict::new(),
            events: Signal::new(),
            mirror_acks: None,
        }
    }
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Rc<RefCell<ObservableDict>> {
        self.state.clone()
    }

    pub fn events(&self) -> &Signal<GraphEvent> {
        &self.events
    }

    pub fn publish_event(&self, event: GraphEvent) {
        self.events.emit(event);
    }

    /// Record the ack table a freshly-installed mirror hook stashes its
    /// deferred acks in, so `fire_mirror_ack` (called from a job posted in
    /// response to an inbound ack message) can reach the same table.
    pub fn install_mirror_acks(&mut self, table: Rc<RefCell<HashMap<u64, RemoteAck>>>) {
        self.mirror_acks = Some(table);
    }

    /// Pop and invoke the pending ack for `id`, if one is still waiting.
    /// A duplicate or unknown id (stale stream, late-arriving ack after a
    /// reconnect) is a no-op rather than an error.
    pub fn fire_mirror_ack(&mut self, id: u64) {
        if let Some(table) = &self.mirror_acks {
            if let Some(ack) = table.borrow_mut().remove(&id) {
                ack();
            }
        }
    }

    /// Park a `ready`/`channels_changed` [`Connection`] for the lifetime of
    /// an RPC subscription. The reactor is the only place that can hold
    /// `Rc`-backed node state, so a subscription's connection has to live
    /// here rather than on the tokio task that owns the subscription.
    pub fn register_subscription(&mut self, connection: Connection) -> u64 {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        self.subscriptions.insert(id, connection);
        id
    }

    /// Drop a subscription's connection, disconnecting its slot. Called
    /// when an RPC handler's stream ends (client cancel, error, or
    /// completion).
    pub fn unregister_subscription(&mut self, id: u64) {
        self.subscriptions.remove(&id);
    }

    pub fn insert(&mut self, name: impl Into<String>, node: NodeHandle) {
        let name = name.into();
        self.nodes.insert(name.clone(), node.clone());
        if let Some(waiters) = self.waiters.remove(&name) {
            for waiter in waiters {
                waiter(node.clone());
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<NodeHandle> {
        self.nodes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.get(name).cloned()
    }

    pub fn modalities_of(&self, name: &str) -> Option<Modality> {
        self.nodes.get(name).map(|n| n.borrow().modalities())
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn type_names(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.borrow().type_name().to_string()))
            .collect()
    }

    /// Resolve `name` now if it exists, otherwise queue `callback` to run
    /// the moment a node registers under that name. Mirrors the original's
    /// "pending resolution" queue for RPC streams that attach before their
    /// source node has started.
    pub fn get_or_wait(&mut self, name: &str, callback: impl FnOnce(NodeHandle) + 'static) {
        if let Some(node) = self.nodes.get(name) {
            callback(node.clone());
        } else {
            self.waiters.entry(name.to_string()).or_default().push(Box::new(callback));
        }
    }

    /// Hand `payload` to the node named `name` via [`crate::node::Node::process_request`],
    /// then emit `channels_changed`/`ready` from a *released* borrow.
    ///
    /// This two-step shape exists only because of `RefCell` reentrancy: a
    /// `ready` subscriber's slot (see `thalamus-rpc`'s subscription
    /// plumbing) reads the node's current data back out through the same
    /// `Rc<RefCell<dyn Node>>` the instant it fires. If we emitted from
    /// inside the `borrow_mut()` that `process_request` runs under, that
    /// read would panic on an already-borrowed cell. Dropping the mutable
    /// borrow before emitting, and only ever emitting from a fresh
    /// immutable borrow (which `RefCell` happily shares with the slot's own
    /// immutable borrow), avoids it. Every vendor-callback adapter that
    /// publishes a frame by name goes through this instead of rolling its
    /// own borrow/emit sequence.
    pub fn apply_and_notify(&self, name: &str, payload: serde_json::Value) {
        let Some(handle) = self.nodes.get(name) else {
            return;
        };
        let response = {
            let mut node = handle.borrow_mut();
            node.process_request(payload)
        };
        let channels_changed = response
            .as_ref()
            .and_then(|v| v.get("channels_changed"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let node = handle.borrow();
        if channels_changed {
            node.channels_changed().emit(());
        }
        node.ready().emit(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modality::{Modality as M};
    use crate::node::Node;
    use crate::signal::Signal;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct StubNode {
        name: String,
        ready: Signal<()>,
        channels_changed: Signal<()>,
    }

    impl Node for StubNode {
        fn name(&self) -> &str {
            &self.name
        }
        fn type_name(&self) -> &str {
            "stub"
        }
        fn modalities(&self) -> M {
            M::ANALOG
        }
        fn ready(&self) -> &Signal<()> {
            &self.ready
        }
        fn channels_changed(&self) -> &Signal<()> {
            &self.channels_changed
        }
    }

    #[test]
    fn waiter_fires_once_node_registers() {
        let mut graph = NodeGraph::new();
        let seen = Rc::new(RefCell::new(false));
        let seen2 = seen.clone();
        graph.get_or_wait("probe", move |_node| *seen2.borrow_mut() = true);
        assert!(!*seen.borrow());

        let node: NodeHandle = Rc::new(RefCell::new(StubNode {
            name: "probe".into(),
            ready: Signal::new(),
            channels_changed: Signal::new(),
        }));
        graph.insert("probe", node);
        assert!(*seen.borrow());
    }
}
