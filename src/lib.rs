//! Schemaflow - Schema Graph Model
//!
//! Builds a relational schema from tables, foreign keys and relationships,
//! lays it out as a layered node-and-edge graph and reconciles batches of
//! proposed schema edits with reversible history.

pub mod core;
