//! Verification utilities for ascii-wgpu
//!
//! Runs the pipeline on a real GPU to check that the compute and fragment
//! composites agree and that renders are reproducible.

pub mod compare;
pub mod harness;
