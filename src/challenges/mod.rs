//! Cloudflare challenge handling used by the browser session.

pub mod core;
pub mod detectors;
pub mod pipeline;
pub mod solvers;
pub mod user_agents;
