//! The reactor: a dedicated OS thread that owns the one and only
//! `NodeGraph` and runs every job that touches it, serially, in the order
//! posted. Any number of async callers feed it jobs through a channel and
//! get results back over a oneshot. A job is `Send` to cross from caller
//! threads into the channel, but once it runs on the reactor thread it's
//! free to build `Rc`/`RefCell` node handles that never leave that thread.

use std::sync::mpsc::{channel, Sender};

use crate::graph::NodeGraph;

pub type Job = Box<dyn FnOnce(&mut NodeGraph) + Send>;

#[derive(Clone)]
pub struct ReactorHandle {
    tx: Sender<Job>,
}

impl ReactorHandle {
    /// Fire-and-forget: run `f` against the graph on the reactor thread.
    /// Silently dropped if the reactor has already shut down.
    pub fn post(&self, f: impl FnOnce(&mut NodeGraph) + Send + 'static) {
        if self.tx.send(Box::new(f)).is_err() {
            tracing::warn!("reactor job dropped: reactor thread has exited");
        }
    }

    /// Run `f` against the graph on the reactor thread and await its
    /// result. The bread-and-butter primitive RPC handlers use to read a
    /// frame or mutate the graph from inside an async task.
    pub async fn call<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut NodeGraph) -> R + Send + 'static,
    ) -> crate::error::Result<R> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(move |graph| {
            let _ = tx.send(f(graph));
        });
        rx.await.map_err(|_| crate::error::ThalamusError::fatal("reactor thread gone"))
    }
}

/// Spawn the reactor thread and return a handle to it. The thread runs
/// until every `ReactorHandle` clone (and the original) has been dropped,
/// at which point the job channel closes and the loop exits.
pub fn spawn_reactor() -> ReactorHandle {
    let (tx, rx) = channel::<Job>();
    std::thread::Builder::new()
        .name("thalamus-reactor".to_string())
        .spawn(move || {
            let mut graph = NodeGraph::new();
            for job in rx.iter() {
                job(&mut graph);
            }
            tracing::info!("reactor thread exiting");
        })
        .expect("failed to spawn reactor thread");
    ReactorHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_and_call_round_trip() {
        let reactor = spawn_reactor();
        reactor.post(|graph| {
            graph.insert(
                "probe",
                std::rc::Rc::new(std::cell::RefCell::new(TestNode { name: "probe".into() })),
            );
        });
        let names = reactor.call(|graph| graph.names()).await.unwrap();
        assert_eq!(names, vec!["probe".to_string()]);
    }

    struct TestNode {
        name: String,
    }
    impl crate::node::Node for TestNode {
        fn name(&self) -> &str {
            &self.name
        }
        fn type_name(&self) -> &str {
            "test"
        }
        fn modalities(&self) -> crate::modality::Modality {
            crate::modality::Modality::NONE
        }
        fn ready(&self) -> &crate::signal::Signal<()> {
            unimplemented!()
        }
        fn channels_changed(&self) -> &crate::signal::Signal<()> {
            unimplemented!()
        }
    }
}
