//! Audio routing
//!
//! Owns the dedicated capture sink and the links that feed the target
//! application's output into it (plus the optional monitoring loopback).
//! `RouteGuard` guarantees teardown on every exit path.

mod controller;
mod graph;
mod pipewire;

pub use controller::{RouteController, RouteGuard, RouteHandle};
pub use graph::{pair_ports, AudioGraph, Port, SinkInfo};
pub use pipewire::PipeWireCli;
