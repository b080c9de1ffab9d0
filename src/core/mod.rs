//! Core domain models and business logic for database schema management

pub mod actions;
pub mod edges;
pub mod history;
pub mod layout;
pub mod reconciler;
mod schema;
pub mod validation;

#[cfg(feature = "ssr")]
pub mod api;
#[cfg(feature = "ssr")]
pub mod backup;
#[cfg(feature = "ssr")]
pub mod config;
#[cfg(feature = "ssr")]
pub mod editor;
#[cfg(feature = "ssr")]
pub mod mutation_source;


pub use schema::*;
