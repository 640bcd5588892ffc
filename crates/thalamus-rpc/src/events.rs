//! `Events`: client-to-server event ingestion. The caller streams `Event`
//! messages; each is posted onto the reactor thread and re-emitted through
//! `NodeGraph::publish_event` so every other subscriber of the graph-wide
//! event signal observes it, the same fan-in `InjectAnalog` uses for
//! streamed analog samples.

use tonic::{Request, Response, Status, Streaming};

use thalamus_core::GraphEvent;
use thalamus_proto::{Empty, Event};

use crate::service::ThalamusService;

pub async fn handle_events(service: &ThalamusService, request: Request<Streaming<Event>>) -> Result<Response<Empty>, Status> {
    service.stats.inc_pending();
    let mut stream = request.into_inner();

    while let Some(message) = stream.message().await? {
        let event = GraphEvent { node: message.node, time_ns: message.time_ns, text: message.text, payload: message.payload };
        service
            .reactor
            .call(move |graph| graph.publish_event(event))
            .await
            .map_err(|e| crate::error::to_status(&e))?;
    }

    service.stats.dec_pending();
    service.stats.inc_completed();
    Ok(Response::new(Empty {}))
}
