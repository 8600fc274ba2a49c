//! Integration tests for the intel gate
//!
//! Every test builds a real gate over a temporary state directory with an
//! in-process batch sender standing in for the ingest service.

mod admission;
mod delivery;
mod persistence;
mod scheduler;
mod support;
