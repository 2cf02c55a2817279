//! HTTP surface: REST handlers and server assembly.

pub mod rest;
pub mod server;

pub use server::ApiServer;
