//! Office Docs Server Library
//!
//! A JSON-RPC front-end for an OpenOffice/LibreOffice-compatible conversion
//! engine, with chunked document uploads spooled on local disk.
//!
//! # Modules
//!
//! - `service`: the `convert` / `upload` / `join` operations
//! - `spool`: md5-addressed spool directory
//! - `connection`: retrying engine connection guard
//! - `engine`: engine traits and backends (UNO bridge, local soffice)
//! - `routes`: axum routers (JSON-RPC, health)

pub mod auth;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod filters;
pub mod routes;
pub mod service;
pub mod spool;
pub mod state;
