//! Integration tests for the finsynth generation engine

mod engine_lifecycle;
mod item_delay;
mod persistence_store;
