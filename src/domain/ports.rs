use crate::domain::model::{ServiceEndpoint, Step};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A single readiness attempt: connect, then drop the connection.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn connect(&self, endpoint: &ServiceEndpoint) -> std::io::Result<()>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `step` to completion, tee'ing merged output, and returns its exit code.
    async fn run_teed(&self, step: &Step, env: &[(String, String)]) -> Result<i32>;

    /// Replaces the current process with `argv`. Only returns on failure,
    /// or on platforms without `exec`, with the child's exit code.
    async fn exec(&self, argv: &[String], env: &[(String, String)]) -> Result<i32>;
}
