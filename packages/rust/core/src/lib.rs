//! Core domain logic for the pattern catalog.
//!
//! Ties the document parser and the storage layer together into end-to-end
//! workflows: corpus ingestion ([`ingest`]), graph expansion ([`expand`]),
//! and periodic refresh ([`schedule`]).

pub mod expand;
pub mod ingest;
pub mod schedule;
