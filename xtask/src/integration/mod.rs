//! Integration test infrastructure.
//!
//! Runs the `cblcache` test suite against a real Redis server started in a
//! container.
//!
//! # Usage
//!
//! ```bash
//! # Start redis:7-alpine, run the tests, stop the container
//! cargo xtask integration
//!
//! # Use a server that is already running
//! cargo xtask integration --no-docker
//!
//! # Forward a test name filter to cargo test
//! cargo xtask integration -- test_redis_list_fifo
//! ```

pub mod error;

pub use error::{IntegrationError, Result};

use std::time::Duration;

use crate::containers::{
    detect_runtime, is_running, redis_url, start_container, stop_container, wait_for_health,
    ContainerRuntime, REDIS_SPEC,
};
use crate::prelude::*;

/// Integration test command.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Run integration tests against a real Redis server.

This command starts a redis:7-alpine container (docker or podman), waits
until it answers PING, runs `cargo test -p cblcache --features redis` with
REDIS_URL pointing at it, and stops the container afterward.

Environment variables:
  REDIS_URL           - Server to test against with --no-docker
                        (default: redis://localhost:6379/0)")]
pub struct IntegrationCommand {
    /// Skip container management (assume Redis is already running).
    #[arg(long)]
    pub no_docker: bool,

    /// Keep the container running after tests complete.
    #[arg(long)]
    pub keep_containers: bool,

    /// Prefer podman over docker when both are installed.
    #[arg(long)]
    pub podman: bool,

    /// Host port to publish Redis on.
    #[arg(long, default_value = "6379")]
    pub port: u16,

    /// Timeout in seconds for the container health check.
    #[arg(long, default_value = "30")]
    pub health_timeout: u64,

    /// Extra arguments passed to `cargo test` (e.g. a test name filter).
    #[arg(last = true)]
    pub test_args: Vec<String>,
}

/// Main entry point for integration command.
pub async fn run(command: IntegrationCommand, global: crate::Global) -> Result<()> {
    if !global.is_silent() {
        aprintln!("{}", p_b("Integration Tests"));
        aprintln!();
    }

    let runtime = if command.no_docker {
        if !global.is_silent() {
            aprintln!(
                "{} {}",
                p_y("⚠️"),
                "Skipping Redis container management (--no-docker)"
            );
        }
        None
    } else {
        Some(detect_runtime(command.podman).await?)
    };

    let url = if command.no_docker {
        std::env::var("REDIS_URL").unwrap_or_else(|_| redis_url(command.port))
    } else {
        redis_url(command.port)
    };

    let mut started = false;
    if let Some(rt) = runtime {
        started = start_redis_container(&command, &global, rt).await?;
    }

    let passed = run_tests(&url, &command.test_args, &global).await;

    if let Some(rt) = runtime {
        if started && !command.keep_containers {
            stop_redis_container(&global, rt).await?;
        } else if started && !global.is_silent() {
            aprintln!(
                "{} {}",
                p_y("⚠️"),
                "Container left running (--keep-containers)"
            );
        }
    }

    aprintln!();
    if passed? {
        aprintln!("{} {}", p_g("✅"), p_g("All integration tests passed!"));
        Ok(())
    } else {
        aprintln!("{} {}", p_r("❌"), p_r("Some integration tests failed"));
        Err(IntegrationError::TestFailed(
            "cargo test exited with a failure".to_string(),
        ))
    }
}

/// Builds the `cargo test` arguments.
fn cargo_test_args(test_args: &[String]) -> Vec<String> {
    let mut args: Vec<String> = ["test", "-p", "cblcache", "--features", "redis"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if !test_args.is_empty() {
        args.push("--".to_string());
        args.extend(test_args.iter().cloned());
    }

    args
}

/// Runs the test suite with `REDIS_URL` set.
async fn run_tests(url: &str, test_args: &[String], global: &crate::Global) -> Result<bool> {
    if !global.is_silent() {
        aprintln!("{} Running against {}", p_b("  →"), p_y(url));
    }

    let status = tokio::process::Command::new("cargo")
        .args(cargo_test_args(test_args))
        .env("REDIS_URL", url)
        .status()
        .await?;

    Ok(status.success())
}

/// Starts the Redis container. Returns false if one was already running.
async fn start_redis_container(
    command: &IntegrationCommand,
    global: &crate::Global,
    runtime: ContainerRuntime,
) -> Result<bool> {
    if is_running(runtime, &REDIS_SPEC).await? {
        if !global.is_silent() {
            aprintln!("{} {}", p_y("⚠️"), "Redis container already running");
        }
        return Ok(false);
    }

    if !global.is_silent() {
        aprintln!("{} {}", p_b("🐳"), "Starting Redis container...");
    }

    start_container(runtime, &REDIS_SPEC, command.port).await?;

    if !global.is_silent() {
        aprintln!(
            "{} {}",
            p_b("⏳"),
            format!("Waiting for Redis health (max {}s)...", command.health_timeout)
        );
    }

    wait_for_health(
        runtime,
        &REDIS_SPEC,
        Duration::from_secs(command.health_timeout),
    )
    .await?;

    if !global.is_silent() {
        aprintln!("{} {}", p_g("✅"), "Redis is ready");
    }

    Ok(true)
}

async fn stop_redis_container(global: &crate::Global, runtime: ContainerRuntime) -> Result<()> {
    if !global.is_silent() {
        aprintln!("{} {}", p_b("🐳"), "Stopping Redis container...");
    }

    stop_container(runtime, REDIS_SPEC.name).await?;

    if !global.is_silent() {
        aprintln!("{} {}", p_g("✅"), "Redis container stopped");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cargo_test_args_default() {
        assert_eq!(
            cargo_test_args(&[]),
            vec!["test", "-p", "cblcache", "--features", "redis"]
        );
    }

    #[test]
    fn test_cargo_test_args_with_filter() {
        let args = cargo_test_args(&["test_redis_list_fifo".to_string()]);
        assert_eq!(args[5], "--");
        assert_eq!(args[6], "test_redis_list_fifo");
    }
}
