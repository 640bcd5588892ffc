//! The `thalamus-rpc` crate: one `ThalamusService` implementing the
//! generated `thalamus_proto::thalamus_server::Thalamus` trait, with each
//! RPC's logic split into its own module so the resolution/backpressure
//! machinery (`resolve.rs`, `backpressure.rs`) stays shared rather than
//! copy-pasted per handler — one file per RPC family.

mod analog;
mod backpressure;
mod channel_info;
mod clock;
mod error;
mod eval;
mod events;
mod graph_downsample;
mod image;
mod introspect;
mod mirror;
mod motion;
mod notification;
mod remote_node;
mod replay;
mod resolve;
mod service;
mod spectrogram;

pub use service::{ServerStats, ThalamusService};

use std::pin::Pin;

use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

use thalamus_proto::thalamus_server::Thalamus;
use thalamus_proto::{
    AnalogRequest, AnalogResponse, ChannelInfoResponse, Empty, Event, EvalRequest, EvalResponse, GraphRequest, GraphResponse, ImageResponse,
    InjectAck, MirrorMessage, ModalitiesResponse, MotionCaptureResponse, NodeRequest, NodeRequestPayload, NotificationMessage, PingRequest,
    PingResponse, RecommendedChannelsResponse, RemoteNodeRequest, RemoteNodeResponse, ReplayRequest, SpectrogramRequest, SpectrogramResponse,
    TypeNameResponse, WarnRequest,
};

/// Every server-streaming RPC's return type: a boxed, pinned stream of
/// `Result<T, Status>` the way `tonic_build`'s generated trait expects it.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

#[tonic::async_trait]
impl Thalamus for ThalamusService {
    async fn get_modalities(&self, request: Request<NodeRequest>) -> Result<Response<ModalitiesResponse>, Status> {
        introspect::handle_get_modalities(self, request).await
    }

    async fn get_type_name(&self, request: Request<NodeRequest>) -> Result<Response<TypeNameResponse>, Status> {
        introspect::handle_get_type_name(self, request).await
    }

    async fn get_recommended_channels(&self, request: Request<NodeRequest>) -> Result<Response<RecommendedChannelsResponse>, Status> {
        introspect::handle_get_recommended_channels(self, request).await
    }

    async fn node_request(&self, request: Request<NodeRequestPayload>) -> Result<Response<NodeRequestPayload>, Status> {
        introspect::handle_node_request(self, request).await
    }

    type AnalogStream = ResponseStream<AnalogResponse>;
    async fn analog(&self, request: Request<AnalogRequest>) -> Result<Response<Self::AnalogStream>, Status> {
        analog::handle_analog(self, request).await
    }

    async fn inject_analog(&self, request: Request<Streaming<AnalogResponse>>) -> Result<Response<InjectAck>, Status> {
        analog::handle_inject_analog(self, request).await
    }

    type GraphStream = ResponseStream<GraphResponse>;
    async fn graph(&self, request: Request<GraphRequest>) -> Result<Response<Self::GraphStream>, Status> {
        graph_downsample::handle_graph(self, request).await
    }

    type ChannelInfoStream = ResponseStream<ChannelInfoResponse>;
    async fn channel_info(&self, request: Request<NodeRequest>) -> Result<Response<Self::ChannelInfoStream>, Status> {
        channel_info::handle_channel_info(self, request).await
    }

    type SpectrogramStream = ResponseStream<SpectrogramResponse>;
    async fn spectrogram(&self, request: Request<SpectrogramRequest>) -> Result<Response<Self::SpectrogramStream>, Status> {
        spectrogram::handle_spectrogram(self, request).await
    }

    type ImageStream = ResponseStream<ImageResponse>;
    async fn image(&self, request: Request<NodeRequest>) -> Result<Response<Self::ImageStream>, Status> {
        image::handle_image(self, request).await
    }

    type MotionCaptureStream = ResponseStream<MotionCaptureResponse>;
    async fn motion_capture(&self, request: Request<NodeRequest>) -> Result<Response<Self::MotionCaptureStream>, Status> {
        motion::handle_motion_capture(self, request).await
    }

    async fn events(&self, request: Request<Streaming<Event>>) -> Result<Response<Empty>, Status> {
        events::handle_events(self, request).await
    }

    type StateMirrorStream = ResponseStream<MirrorMessage>;
    async fn state_mirror(&self, request: Request<Streaming<MirrorMessage>>) -> Result<Response<Self::StateMirrorStream>, Status> {
        mirror::handle_state_mirror(self, request).await
    }

    type EvalStream = ResponseStream<EvalRequest>;
    async fn eval(&self, request: Request<Streaming<EvalResponse>>) -> Result<Response<Self::EvalStream>, Status> {
        eval::handle_eval(self, request).await
    }

    type NotificationStream = ResponseStream<NotificationMessage>;
    async fn notification(&self, request: Request<Empty>) -> Result<Response<Self::NotificationStream>, Status> {
        notification::handle_notification(self, request).await
    }

    async fn warn(&self, request: Request<WarnRequest>) -> Result<Response<Empty>, Status> {
        notification::handle_warn(self, request).await
    }

    type RemoteNodeStream = ResponseStream<RemoteNodeResponse>;
    async fn remote_node(&self, request: Request<Streaming<RemoteNodeRequest>>) -> Result<Response<Self::RemoteNodeStream>, Status> {
        remote_node::handle_remote_node(self, request).await
    }

    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        introspect::handle_ping(self, request).await
    }

    async fn replay(&self, request: Request<ReplayRequest>) -> Result<Response<Empty>, Status> {
        replay::handle_replay(self, request).await
    }

    async fn stop(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        introspect::handle_stop(self, request).await
    }

    async fn wait(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        introspect::handle_wait(self, request).await
    }
}
