//! Label analysis: nutrition parsing, additive detection, profile matching,
//! scoring, AI insights and report rendering.

pub mod advisor;
pub mod allergens;
pub mod chemicals;
pub mod handlers;
pub mod insights;
pub mod models;
pub mod nutrition;
pub mod prompts;
pub mod render;
pub mod scoring;
pub mod service;
