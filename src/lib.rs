//! Generate SLURM job scripts with their LAMMPS and ARTn inputs, and submit them as chains of
//! dependent jobs

/// Validate, render and write job scripts and solver inputs
pub mod artifact;

/// Cluster deployment values loaded from TOML
pub mod config;

/// Submit scripts to SLURM and parse job ids
pub mod slurm;

/// Thread job ids through an ordered list of jobs
pub mod chain;

/// Read workflow files describing a chain
pub mod request;

/// Check run logs for finished calculations
pub mod runlog;
