// src/core/mod.rs

pub mod cache;
pub mod capabilities;
pub mod config_loader;
pub mod context;
pub mod dependency;
pub mod errors;
pub mod graph;
pub mod index;
pub mod material;
pub mod merge;
pub mod naming;
pub mod rules;
pub mod secure;
pub mod template;
pub mod validator;
pub mod walker;
