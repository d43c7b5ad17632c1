//! HTTP handlers for model CRUD and model introspection.

pub mod entity;
pub mod models;
