//! Virtual Try-On Generation Pipeline
//!
//! This library provides the core functionality for tryon-studio: an async
//! job pipeline that composites AI try-on images for apparel stores, with
//! credit reservation and rollback around every generation.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
