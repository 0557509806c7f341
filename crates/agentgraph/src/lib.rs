#![allow(dead_code, unused_imports, non_camel_case_types)]

// dsl module - graph description language: parse, validate, infer schema, compile
pub mod dsl;

// engine module - Pregel-style execution of compiled graphs
pub mod engine;

// memory module - vector memory service: upsert/search/soft-delete + auto-memory pipeline
pub mod memory;

// persistence module - session/event persistence
pub mod persistence;

// summarization module - delta summarization + async hashed-dispatch worker pool
pub mod summarization;

// config module
pub mod config;

// cross-module error conversions into agentgraph_kernel::GraphError
pub mod error_conversions;

// Re-export config types
pub use config::RuntimeSettings;
