//! Integration tests module
//!
//! End-to-end runs of the monitor against mock servers:
//! - Complete fetch → extract → diff → notify → commit pipeline
//! - Failure handling and recovery on the next run

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
