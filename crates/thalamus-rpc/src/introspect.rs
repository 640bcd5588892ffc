//! Node introspection (`GetModalities`/`GetTypeName`/`GetRecommendedChannels`/
//! `NodeRequest`), liveness (`Ping`), and the global soft-stop pair
//! (`Stop`/`Wait`) — grounded on spec.md §5's "the reactor stop is a global
//! soft signal; subscriptions observe it and emit `last_message`."

use tonic::{Request, Response, Status};

use thalamus_proto::{
    Empty, ModalitiesResponse, NodeRequest, NodeRequestPayload, PingRequest, PingResponse, RecommendedChannelsResponse, TypeNameResponse,
};

use crate::service::ThalamusService;

pub async fn handle_get_modalities(service: &ThalamusService, request: Request<NodeRequest>) -> Result<Response<ModalitiesResponse>, Status> {
    let req = request.into_inner();
    let bits = service
        .reactor
        .call(move |graph| graph.modalities_of(&req.node).map(|m| m.bits()).unwrap_or(0))
        .await
        .map_err(|e| crate::error::to_status(&e))?;
    Ok(Response::new(ModalitiesResponse { bits }))
}

pub async fn handle_get_type_name(service: &ThalamusService, request: Request<NodeRequest>) -> Result<Response<TypeNameResponse>, Status> {
    let req = request.into_inner();
    let type_name = service
        .reactor
        .call(move |graph| graph.type_names().into_iter().find(|(name, _)| *name == req.node).map(|(_, t)| t))
        .await
        .map_err(|e| crate::error::to_status(&e))?
        .ok_or_else(|| Status::not_found("unknown node"))?;
    Ok(Response::new(TypeNameResponse { type_name }))
}

pub async fn handle_get_recommended_channels(service: &ThalamusService, request: Request<NodeRequest>) -> Result<Response<RecommendedChannelsResponse>, Status> {
    let req = request.into_inner();
    let names = service
        .reactor
        .call(move |graph| {
            let handle = graph.get(&req.node)?;
            let node = handle.borrow();
            let analog = node.as_analog()?;
            Some(analog.spans().iter().map(|s| s.name.clone()).collect())
        })
        .await
        .map_err(|e| crate::error::to_status(&e))?
        .unwrap_or_default();
    Ok(Response::new(RecommendedChannelsResponse { names }))
}

/// Forwards `json` to the named node's `Node::process_request`, returning
/// whatever (possibly empty) JSON value comes back — the generic escape
/// hatch every node-specific control message (publish_analog, publish_motion,
/// adapter-specific commands) rides over.
pub async fn handle_node_request(service: &ThalamusService, request: Request<NodeRequestPayload>) -> Result<Response<NodeRequestPayload>, Status> {
    let req = request.into_inner();
    let payload: serde_json::Value = serde_json::from_slice(&req.json).unwrap_or(serde_json::Value::Null);
    let node = req.node.clone();
    let response = service
        .reactor
        .call(move |graph| {
            let handle = graph.get(&req.node)?;
            handle.borrow_mut().process_request(payload)
        })
        .await
        .map_err(|e| crate::error::to_status(&e))?
        .unwrap_or(serde_json::Value::Null);
    Ok(Response::new(NodeRequestPayload { node, json: serde_json::to_vec(&response).unwrap_or_default() }))
}

pub async fn handle_ping(_service: &ThalamusService, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
    let nonce = request.into_inner().nonce;
    Ok(Response::new(PingResponse { nonce }))
}

pub async fn handle_stop(service: &ThalamusService, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
    service.shutdown_token().cancel();
    Ok(Response::new(Empty {}))
}

pub async fn handle_wait(service: &ThalamusService, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
    service.shutdown_token().cancelled().await;
    Ok(Response::new(Empty {}))
}
