use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::graph::{pair_ports, AudioGraph, Port, SinkInfo};
use crate::error::RoutingError;

/// Active sink plus the links created for it
#[derive(Debug, Clone)]
pub struct RouteHandle {
    pub sink: SinkInfo,
    pub target: String,
    pub listen: bool,
    links: Vec<(Port, Port)>,
}

impl RouteHandle {
    pub fn links(&self) -> &[(Port, Port)] {
        &self.links
    }
}

/// Creates and tears down the per-session capture route
#[derive(Clone)]
pub struct RouteController {
    graph: Arc<dyn AudioGraph>,
    sink_name: String,
}

impl RouteController {
    pub fn new(graph: Arc<dyn AudioGraph>, sink_name: impl Into<String>) -> Self {
        Self {
            graph,
            sink_name: sink_name.into(),
        }
    }

    /// Create the sink and pull the target application's output into it.
    ///
    /// With `listen` the sink is also played back on the default output.
    /// Fails with `NoMatchingPorts` when the application has no output ports
    /// yet; anything already created is rolled back before returning.
    pub fn acquire(&self, target: &str, listen: bool) -> Result<RouteGuard, RoutingError> {
        info!(
            "Creating sink '{}' for '{}' via {}",
            self.sink_name,
            target,
            self.graph.name()
        );

        let sink = self.graph.create_sink(&self.sink_name)?;

        let mut guard = RouteGuard {
            graph: Arc::clone(&self.graph),
            handle: RouteHandle {
                sink,
                target: target.to_string(),
                listen,
                links: Vec::new(),
            },
            released: false,
        };

        if let Err(e) = guard.link_all(listen) {
            guard.release();
            return Err(e);
        }

        info!(
            "Route live: '{}' -> {} ({} links, listen={})",
            target,
            guard.handle.sink.name,
            guard.handle.links.len(),
            listen
        );

        Ok(guard)
    }
}

/// Owns a live route; releasing is idempotent and also happens on drop
pub struct RouteGuard {
    graph: Arc<dyn AudioGraph>,
    handle: RouteHandle,
    released: bool,
}

impl RouteGuard {
    pub fn handle(&self) -> &RouteHandle {
        &self.handle
    }

    pub fn is_live(&self) -> bool {
        !self.released
    }

    /// Source the encoder should capture from
    pub fn monitor_source(&self) -> String {
        self.handle.sink.monitor_source()
    }

    /// Link application ports that appeared since the route was created.
    ///
    /// Players often recreate their stream between tracks; returns how many
    /// new links were made.
    pub fn refresh(&mut self) -> Result<usize, RoutingError> {
        if self.released {
            return Ok(0);
        }
        let added = self.link_target()?;
        if added > 0 {
            info!("Linked {} new port(s) of '{}'", added, self.handle.target);
        }
        Ok(added)
    }

    /// Disconnect every link we made and destroy the sink
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for (output, input) in self.handle.links.drain(..) {
            if let Err(e) = self.graph.unlink(&output, &input) {
                // The app may already be gone, taking its ports with it
                warn!("Failed to unlink {} -> {}: {}", output, input, e);
            }
        }

        match self.graph.destroy_sink(&self.handle.sink) {
            Ok(()) => info!("Route released: sink '{}' removed", self.handle.sink.name),
            Err(e) => warn!("Failed to remove sink '{}': {}", self.handle.sink.name, e),
        }
    }

    fn link_all(&mut self, listen: bool) -> Result<(), RoutingError> {
        if self.link_target()? == 0 {
            return Err(RoutingError::NoMatchingPorts(self.handle.target.clone()));
        }
        if listen {
            self.link_monitor()?;
        }
        Ok(())
    }

    fn link_target(&mut self) -> Result<usize, RoutingError> {
        let sink = &self.handle.sink.name;
        let pattern = self.handle.target.to_lowercase();

        let outputs: Vec<Port> = self
            .graph
            .output_ports()?
            .into_iter()
            .filter(|p| p.node() != sink && p.node().to_lowercase().contains(&pattern))
            .collect();

        let inputs: Vec<Port> = self
            .graph
            .input_ports()?
            .into_iter()
            .filter(|p| p.node() == sink)
            .collect();

        self.link_pairs(pair_ports(&outputs, &inputs))
    }

    fn link_monitor(&mut self) -> Result<usize, RoutingError> {
        let sink = self.handle.sink.name.clone();
        let default_sink = self.graph.default_sink()?;

        let monitors: Vec<Port> = self
            .graph
            .output_ports()?
            .into_iter()
            .filter(|p| p.node() == sink)
            .collect();

        let playback: Vec<Port> = self
            .graph
            .input_ports()?
            .into_iter()
            .filter(|p| p.node() == default_sink)
            .collect();

        let linked = self.link_pairs(pair_ports(&monitors, &playback))?;
        info!("Listening on '{}' ({} links)", default_sink, linked);
        Ok(linked)
    }

    fn link_pairs(&mut self, pairs: Vec<(Port, Port)>) -> Result<usize, RoutingError> {
        let existing: HashSet<(Port, Port)> = self.handle.links.iter().cloned().collect();
        let mut added = 0;

        for (output, input) in pairs {
            if existing.contains(&(output.clone(), input.clone())) {
                continue;
            }
            self.graph.link(&output, &input)?;
            self.handle.links.push((output, input));
            added += 1;
        }

        Ok(added)
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!("Route dropped without explicit release; tearing down");
            self.release();
        }
    }
}
