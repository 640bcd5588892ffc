//! `StateMirror`: bidirectional mirror of the observable state tree.
//! Grounded on spec.md §4.1's mirror protocol — "every outbound change
//! carries a monotonically increasing `id`. The peer echoes the `id` with
//! `acknowledged=true` ... on receipt the local side invokes the deferred
//! `done` callback" — and §8 scenario 4's literal `set /a/b/c = 5` walk.
//!
//! Addresses on the wire are the same mixed dot/bracket paths
//! `ObservableDict::address`/`join_address` already produce for a locally
//! originated mutation (`channels.gain`, `channels[0].name`), so applying an
//! inbound mutation reuses `observable::set_jsonpath_from_remote`/
//! `delete_jsonpath_from_remote` rather than re-deriving a path walk —
//! the `_from_remote` variants apply without invoking the local
//! `RemoteStorageHook`, so an inbound message never echoes straight back
//! out to the peer it arrived from. Neither auto-vivifies past the leaf —
//! an inbound address whose parent collection doesn't exist yet is
//! dropped, matching `set_jsonpath`'s existing contract.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use thalamus_core::observable::{delete_jsonpath_from_remote, set_jsonpath_from_remote, RemoteAck, RemoteStorageHook};
use thalamus_core::{Action, Value};
use thalamus_proto::{MirrorAction, MirrorMessage};

use crate::service::ThalamusService;

const OUTBOUND_CAPACITY: usize = 256;

fn to_wire_action(action: Action) -> MirrorAction {
    match action {
        Action::Set => MirrorAction::MirrorSet,
        Action::Delete => MirrorAction::MirrorDelete,
    }
}

pub async fn handle_state_mirror(service: &ThalamusService, request: Request<Streaming<MirrorMessage>>) -> Result<Response<super::ResponseStream<MirrorMessage>>, Status> {
    let (outbound_tx, outbound_rx) = mpsc::channel::<MirrorMessage>(OUTBOUND_CAPACITY);

    // Both the ack table and the hook closure itself hold `Rc`s (not `Send`),
    // so they're built *inside* this job, on the reactor thread, rather than
    // passed in from here — only `outbound_tx` (a plain `Send` mpsc sender)
    // crosses into the closure.
    service
        .reactor
        .call(move |graph| {
            let acks: Rc<RefCell<HashMap<u64, RemoteAck>>> = Rc::new(RefCell::new(HashMap::new()));
            let next_id: Rc<RefCell<u64>> = Rc::new(RefCell::new(1));
            let acks_for_hook = acks.clone();

            let hook: RemoteStorageHook = Rc::new(move |action, address, value, ack| {
                let id = {
                    let mut next = next_id.borrow_mut();
                    let id = *next;
                    *next += 1;
                    id
                };
                acks_for_hook.borrow_mut().insert(id, ack);
                let message = MirrorMessage {
                    action: to_wire_action(action) as i32,
                    address,
                    json_value: serde_json::to_vec(&value.to_json()).unwrap_or_default(),
                    ack_id: id,
                    is_ack: false,
                };
                if outbound_tx.try_send(message).is_err() {
                    tracing::warn!("state mirror outbound channel full or closed, local mutation stays deferred");
                }
                true
            });

            graph.state().borrow_mut().set_remote_storage(Some(hook));
            graph.install_mirror_acks(acks);
        })
        .await
        .map_err(|e| crate::error::to_status(&e))?;
    service.mirror_attached.store(true, std::sync::atomic::Ordering::Release);

    let reactor = service.reactor.clone();
    let mirror_attached = service.mirror_attached.clone();
    let mut inbound = request.into_inner();
    tokio::spawn(async move {
        while let Ok(Some(message)) = inbound.message().await {
            if message.is_ack {
                let id = message.ack_id;
                reactor.post(move |graph| graph.fire_mirror_ack(id));
                continue;
            }
            let Some(value_json) = serde_json::from_slice::<serde_json::Value>(&message.json_value).ok() else {
                continue;
            };
            let address = message.address.clone();
            let action = message.action;
            reactor.post(move |graph| {
                let root = graph.state();
                if action == MirrorAction::MirrorDelete as i32 {
                    delete_jsonpath_from_remote(&root, &address);
                } else {
                    set_jsonpath_from_remote(&root, &address, Value::from_json(&value_json));
                }
            });
        }
        mirror_attached.store(false, std::sync::atomic::Ordering::Release);
        reactor.post(|graph| graph.state().borrow_mut().set_remote_storage(None));
    });

    let shutdown = service.shutdown_token();
    let stream = tokio_stream::wrappers::ReceiverStream::new(outbound_rx);
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    tokio::spawn(async move {
        let mut stream = stream;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                item = tokio_stream::StreamExt::next(&mut stream) => {
                    match item {
                        Some(message) => {
                            if out_tx.send(Ok(message)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });
    Ok(Response::new(Box::pin(ReceiverStream::new(out_rx))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_action_maps_set_and_delete() {
        assert_eq!(to_wire_action(Action::Set) as i32, MirrorAction::MirrorSet as i32);
        assert_eq!(to_wire_action(Action::Delete) as i32, MirrorAction::MirrorDelete as i32);
    }

    /// Scenario 4's one-outbound-change-then-ack sequence, exercised at
    /// the hook level: a single `set` produces exactly one deferred ack,
    /// and firing it releases the mutation exactly once.
    #[test]
    fn one_set_produces_one_deferred_ack() {
        use thalamus_core::observable::ObservableDict;

        let root = ObservableDict::new();
        let acks: Rc<RefCell<HashMap<u64, RemoteAck>>> = Rc::new(RefCell::new(HashMap::new()));
        let next_id: Rc<RefCell<u64>> = Rc::new(RefCell::new(1));
        let acks_for_hook = acks.clone();
        let outbound: Rc<RefCell<Vec<MirrorMessage>>> = Rc::new(RefCell::new(Vec::new()));
        let outbound2 = outbound.clone();

        let hook: RemoteStorageHook = Rc::new(move |action, address, value, ack| {
            let id = {
                let mut next = next_id.borrow_mut();
                let id = *next;
                *next += 1;
                id
            };
            acks_for_hook.borrow_mut().insert(id, ack);
            outbound2.borrow_mut().push(MirrorMessage {
                action: to_wire_action(action) as i32,
                address,
                json_value: serde_json::to_vec(&value.to_json()).unwrap_or_default(),
                ack_id: id,
                is_ack: false,
            });
            true
        });
        root.borrow_mut().set_remote_storage(Some(hook));
        root.borrow_mut().set("x", Value::Int(5));

        assert_eq!(outbound.borrow().len(), 1);
        assert_eq!(outbound.borrow()[0].ack_id, 1);
        assert!(root.borrow().get("x").is_none(), "deferred until ack fires");

        let ack = acks.borrow_mut().remove(&1).unwrap();
        ack();
        assert_eq!(root.borrow().get("x").unwrap().as_i64(), Some(5));
    }
}
