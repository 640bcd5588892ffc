//! TOML-described graph assembly: which nodes exist and what the RPC
//! server binds to. A plain `serde::Deserialize` struct loaded once at
//! startup, no live-reload.

use std::path::Path;

use serde::Deserialize;
use thalamus_adapters::node::{AnalogBufferNode, MotionBufferNode};
use thalamus_core::error::ThalamusError;
use thalamus_core::ReactorHandle;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Address the gRPC server listens on, e.g. `0.0.0.0:50070`.
    pub bind_addr: String,

    /// Directories searched for GenTL transport-layer modules, in order.
    #[serde(default)]
    pub genicam_search_path: Vec<String>,

    /// Worker pool thread count for parallel work (neural deinterleaving,
    /// Spectrogram FFT batches). Defaults to the number of CPUs.
    pub worker_threads: Option<usize>,

    /// Nodes to register in the graph before the server starts accepting
    /// RPCs. DAQ/motion-capture/neural adapters bind live hardware or
    /// sockets and are wired in code (see `main.rs`), not declared here.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    AnalogBuffer { name: String, type_name: String },
    MotionBuffer { name: String },
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ThalamusError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ThalamusError::configuration(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| ThalamusError::configuration(format!("parsing {}: {e}", path.display())))
    }

    /// Registers every configured node into the graph via the reactor.
    /// `type_name` for `AnalogBuffer` is leaked to get the `&'static str`
    /// `AnalogBufferNode::new` wants — registration happens once at
    /// startup, not per-connection, so the leak is bounded by node count.
    pub fn build_graph(&self, reactor: &ReactorHandle) {
        for spec in self.nodes.clone() {
            reactor.post(move |graph| match spec {
                NodeSpec::AnalogBuffer { name, type_name } => {
                    let type_name: &'static str = Box::leak(type_name.into_boxed_str());
                    let node = std::rc::Rc::new(std::cell::RefCell::new(AnalogBufferNode::new(name.clone(), type_name)));
                    graph.insert(name, node);
                }
                NodeSpec::MotionBuffer { name } => {
                    let node = std::rc::Rc::new(std::cell::RefCell::new(MotionBufferNode::new(name.clone())));
                    graph.insert(name, node);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = r#"
            bind_addr = "127.0.0.1:50070"

            [[nodes]]
            kind = "analog_buffer"
            name = "eeg"
            type_name = "daq_input"

            [[nodes]]
            kind = "motion_buffer"
            name = "mocap"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:50070");
        assert_eq!(config.nodes.len(), 2);
    }
}
