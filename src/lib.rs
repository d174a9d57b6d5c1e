//! finsynth: resumable batch generation of synthetic customer financial data
//!
//! Walks a customer directory for one reporting period, asks an external generation service
//! for a dataset per customer, stores each section independently, and checkpoints progress
//! after every customer so an interrupted run continues where it stopped.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod directory;
pub mod engine;
pub mod error;
pub mod flags;
pub mod generation;
pub mod logging;
pub mod persistence;
pub mod types;
