//! Read workflow files: the JSON description of a chain an operator wants to run

/// Validate workflow JSON against the bundled schema and deserialise it
pub mod workflow;
