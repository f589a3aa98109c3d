//! intellidoc: asynchronous document ingestion into a local vector search index.
//!
//! Documents are uploaded into named collections, then processed in the
//! background: the text is split into overlapping chunks, each chunk is
//! embedded into a fixed-dimension vector, and the vectors are appended to a
//! Qdrant collection while job/document status is tracked in SQLite.
//!
//! The crate is a library with a thin CLI host (`src/main.rs`). The
//! interesting part is [`ingest::IngestCoordinator`], which owns the job
//! lifecycle, bounds how many documents are embedded at once, and keeps the
//! job record and the document record in lockstep even when the pipeline
//! fails partway through.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod meta;
pub mod progress;
pub mod store;
