//! playcheck — converge and verify an Ansible role from its `molecule.yml`.
//!
//! The binary in `main.rs` is a thin clap layer over [`project::Project`];
//! all argument and environment construction lives in the `invocation` crate.

pub mod config;
pub mod console;
pub mod driver;
pub mod project;
