//! Meridian operator: gateway StatefulSets and agent binary cleanup for AgentFleets

#![deny(missing_docs)]

/// Controller futures for each subsystem
pub mod controller_runner;
