// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy-driven authorization for Loom.
//!
//! This crate provides:
//! - Access-control models parsed from INI-style text (`r`, `p`, `g`, `e`, `m`)
//! - Matcher expressions compiled once and evaluated per rule
//! - Role hierarchies with optional domains
//! - Allow-override, deny-override and priority effects
//! - Pluggable policy storage through adapters, with filtered loading
//! - Host-registered matcher functions and change notification
//!
//! # Usage
//!
//! ```ignore
//! use loom_authz::{Enforcer, FileAdapter};
//!
//! let enforcer = Enforcer::new(&std::fs::read_to_string("model.conf")?, FileAdapter::new("policy.csv"))?;
//! if enforcer.enforce(&["alice", "data1", "read"])? {
//!     // allowed
//! }
//! ```

pub mod adapter;
pub mod cache;
pub mod config;
pub mod effect;
pub mod enforcer;
pub mod error;
mod management;
pub mod matcher;
pub mod model;
pub mod policy;
pub mod rbac;
mod rbac_api;
pub mod watcher;

pub use adapter::{
	Adapter, FileAdapter, Filter, MemoryAdapter, NullAdapter, PolicyLine, PolicyLoader,
	PolicyPersister, StringAdapter,
};
pub use config::{load_config, load_config_from_env, EnforcerConfig, EnforcerConfigLayer};
pub use effect::EffectKind;
pub use enforcer::{EnforceContext, Enforcer};
pub use error::{AuthzError, Result};
pub use matcher::{CustomFn, FunctionMap};
pub use model::{Assertion, Model, Section};
pub use rbac::{RoleGraph, RoleManager};
pub use watcher::Watcher;
