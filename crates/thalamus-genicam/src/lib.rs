//! GenTL vendor transport loading, the GenICam register symbol table, its
//! formula evaluator, and the port-URL bootstrap that turns a producer's
//! zipped XML register map into a live [`register::Device`].
//!
//! This crate only speaks the register/transport layer; buffer streaming
//! and wiring a device up as a thalamus-core [`thalamus_core::Node`] lives
//! in the adapter that owns the acquisition thread (`thalamus-adapters`),
//! which posts decoded frames across to the reactor rather than exposing
//! `Device` itself across threads — `GenTl`'s `unsafe impl Send` covers
//! the vendor call surface, not the `Rc`-based node graph.

pub mod bootstrap;
pub mod error;
pub mod expr;
pub mod framerate;
pub mod gentl;
pub mod register;

pub use error::{GenicamError, Result};
pub use expr::{Expr, Scope};
pub use framerate::FrameRateObserver;
pub use gentl::GenTl;
pub use register::{AccessMode, Device, RegValue, RegisterIo, RegisterNode};
