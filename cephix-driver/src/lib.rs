//! # Cephix Driver
//!
//! The Cephix CSI driver daemon: serves the CSI Identity, Controller,
//! Node and GroupController services plus the CSI-Addons services over a
//! unix socket (or TCP for development), backed by the control-plane
//! library in `cephix-core`.

pub mod cli;
pub mod config;
pub mod driver;
pub mod mount;
pub mod server;
pub mod service;
