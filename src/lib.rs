// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rule-units
//!
//! Storage and wiring runtime for compiled rule units. A rule compiler
//! produces named blobs plus handler objects; this crate stores the blobs,
//! materializes executable units from them on demand, wires handlers to those
//! units, and moves whole stores between processes in a signed format.
//!
//! ## Architecture
//!
//! - **Store** (`store`): blob map, handler bindings, definition cache, wire state
//! - **Loader** (`loader`): cache → store → parent resolution, namespace registry
//! - **Wiring** (`wiring`): serial or rayon-parallel handler binding
//! - **Reload** (`reload`): discard the loader and rebind every handler
//! - **Codec** (`codec`): bincode frames with an Ed25519-signed blob section
//! - **Merge** (`store::merge`): union of stores, clone onto a new parent
//!
//! ## Library usage
//!
//! ```no_run
//! use rule_units::handler::Handler;
//! use rule_units::loader::LoaderContext;
//! use rule_units::store::UnitStore;
//!
//! struct Invoker;
//! impl Handler for Invoker {}
//!
//! let mut store: UnitStore<Invoker> = UnitStore::new();
//! store.attach(LoaderContext::default());
//! store.write("org/rules/Rule_1.unit", vec![0xCA, 0xFE]);
//! store.on_before_execute().unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod loader;
pub mod naming;
pub mod reload;
pub mod removal;
pub mod store;
pub mod wiring;
