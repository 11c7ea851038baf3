// PipeWire audio graph driven through the pactl / pw-link command-line tools
//
// Sinks are pulse null-sink modules (served by pipewire-pulse); ports and
// links are handled with pw-link so application streams can be wired
// directly without touching the user's default routing.

use std::process::Command;
use tracing::debug;

use super::graph::{AudioGraph, Port, SinkInfo};
use crate::error::RoutingError;

/// `AudioGraph` backed by `pactl` and `pw-link`
#[derive(Debug, Clone, Default)]
pub struct PipeWireCli;

impl PipeWireCli {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String, RoutingError> {
        let command = format!("{} {}", program, args.join(" "));
        debug!("Running: {}", command);

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| RoutingError::Command {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RoutingError::Command {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn list_ports(&self, flag: &str) -> Result<Vec<Port>, RoutingError> {
        let stdout = self.run("pw-link", &[flag])?;
        Ok(parse_port_list(&stdout))
    }
}

impl AudioGraph for PipeWireCli {
    fn name(&self) -> &'static str {
        "PipeWire (pactl/pw-link)"
    }

    fn create_sink(&self, name: &str) -> Result<SinkInfo, RoutingError> {
        let sink_name = format!("sink_name={}", name);
        let properties = format!("sink_properties=device.description={}", name);

        let stdout = self
            .run("pactl", &["load-module", "module-null-sink", &sink_name, &properties])
            .map_err(|e| RoutingError::SinkCreation {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let module_id = stdout
            .trim()
            .parse::<u32>()
            .map_err(|_| RoutingError::SinkCreation {
                name: name.to_string(),
                reason: format!("unexpected pactl output: {:?}", stdout.trim()),
            })?;

        Ok(SinkInfo {
            name: name.to_string(),
            module_id,
        })
    }

    fn destroy_sink(&self, sink: &SinkInfo) -> Result<(), RoutingError> {
        self.run("pactl", &["unload-module", &sink.module_id.to_string()])?;
        Ok(())
    }

    fn output_ports(&self) -> Result<Vec<Port>, RoutingError> {
        self.list_ports("-o")
    }

    fn input_ports(&self) -> Result<Vec<Port>, RoutingError> {
        self.list_ports("-i")
    }

    fn default_sink(&self) -> Result<String, RoutingError> {
        let stdout = self.run("pactl", &["get-default-sink"])?;
        Ok(stdout.trim().to_string())
    }

    fn link(&self, output: &Port, input: &Port) -> Result<(), RoutingError> {
        self.run("pw-link", &[output.as_str(), input.as_str()])
            .map(|_| ())
            .map_err(|e| RoutingError::Link {
                output: output.to_string(),
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    fn unlink(&self, output: &Port, input: &Port) -> Result<(), RoutingError> {
        self.run("pw-link", &["-d", output.as_str(), input.as_str()])?;
        Ok(())
    }
}

/// Parse `pw-link -o` / `pw-link -i` output: one `node:port` per line
fn parse_port_list(stdout: &str) -> Vec<Port> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains(':'))
        .map(Port::new)
        .collect()
}
