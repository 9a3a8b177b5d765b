//! Redliner analyzes redlines (tracked changes) in contract documents
//! against a negotiation playbook and writes the rulings back as review
//! comments or counter-proposals.
//!
//! Pipeline: document → extraction → rule matching → model judgment →
//! annotation. Two document back-ends (local packaged container, hosted
//! remote API) normalize into one redline model at the entry point; the
//! rest of the pipeline never branches on the format again.

pub mod config;
pub mod models;
pub mod pipeline;
pub mod remote;
