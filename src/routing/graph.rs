//! Audio graph abstraction
//!
//! The operations the route controller needs from the sound server: create
//! and destroy a virtual sink, list ports, connect and disconnect them.

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// A virtual sink created for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkInfo {
    /// Node name, also the prefix of its ports
    pub name: String,
    /// Server-side handle used to destroy the sink (pulse module index)
    pub module_id: u32,
}

impl SinkInfo {
    /// Capture source name that reads back what is played into the sink
    pub fn monitor_source(&self) -> String {
        format!("{}.monitor", self.name)
    }
}

/// A port in `node:port` notation, e.g. `spotify:output_FL`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port(pub String);

impl Port {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Node part before the last ':'
    pub fn node(&self) -> &str {
        self.0.rsplit_once(':').map(|(node, _)| node).unwrap_or(&self.0)
    }

    /// Channel suffix of the port name (`FL`, `FR`, `MONO`, ...)
    pub fn channel(&self) -> &str {
        let port = self.0.rsplit_once(':').map(|(_, port)| port).unwrap_or(&self.0);
        port.rsplit_once('_').map(|(_, ch)| ch).unwrap_or(port)
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sound server operations used for routing
///
/// Calls may block on IPC with the server; async callers should run them
/// on a blocking thread.
pub trait AudioGraph: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Create a virtual sink named `name`
    fn create_sink(&self, name: &str) -> Result<SinkInfo, RoutingError>;

    /// Destroy a sink created by `create_sink`
    fn destroy_sink(&self, sink: &SinkInfo) -> Result<(), RoutingError>;

    /// All output ports in the graph (application outputs, sink monitors)
    fn output_ports(&self) -> Result<Vec<Port>, RoutingError>;

    /// All input ports in the graph (sink playback inputs)
    fn input_ports(&self) -> Result<Vec<Port>, RoutingError>;

    /// Node name of the system's default output sink
    fn default_sink(&self) -> Result<String, RoutingError>;

    /// Connect an output port to an input port
    fn link(&self, output: &Port, input: &Port) -> Result<(), RoutingError>;

    /// Disconnect a link created by `link`
    fn unlink(&self, output: &Port, input: &Port) -> Result<(), RoutingError>;
}

/// Pair output ports with input ports channel by channel.
///
/// Mono outputs feed every input; unmatched channels fall back to pairing
/// by position.
pub fn pair_ports(outputs: &[Port], inputs: &[Port]) -> Vec<(Port, Port)> {
    let mut pairs = Vec::new();

    for (index, output) in outputs.iter().enumerate() {
        if output.channel().eq_ignore_ascii_case("MONO") {
            pairs.extend(inputs.iter().map(|input| (output.clone(), input.clone())));
            continue;
        }

        let same_channel: Vec<&Port> = inputs
            .iter()
            .filter(|input| input.channel().eq_ignore_ascii_case(output.channel()))
            .collect();

        if same_channel.is_empty() {
            if let Some(input) = inputs.get(index % inputs.len().max(1)) {
                pairs.push((output.clone(), input.clone()));
            }
        } else {
            pairs.extend(same_channel.into_iter().map(|input| (output.clone(), input.clone())));
        }
    }

    pairs
}
