//! sluice: runtime core of a TLS-intercepting HTTP(S) proxy
//!
//! This crate provides the pieces a proxy needs to sit in the middle of
//! HTTPS traffic and to start and stop cleanly as a long-running service.
//!
//! # Trust Model
//!
//! Every intercepted host is served a leaf certificate forged on demand and
//! signed by a root CA. Interception only works for clients that trust that
//! root; [`authority::root_ca_pem`] exposes it for installation.
//!
//! # Architecture
//!
//! - **Authority**: Root trust anchor, leaf forging, certificate cache and
//!   per-host TLS configuration assembly
//! - **Proxy**: CONNECT listener that terminates TLS with forged leaves
//! - **Extension**: Pluggable components with concurrent setup and ordered cleanup
//! - **Lifecycle**: Signal-driven coordinator with graceful drain and forced exit
//! - **Config**: Hierarchical TOML configuration

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod authority;
pub mod cli;
pub mod config;
pub mod extension;
pub mod lifecycle;
pub mod proxy;
