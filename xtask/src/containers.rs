//! Container management for the Redis test server.
//!
//! Pure functions build the `docker`/`podman` arguments; the async functions
//! run them and poll the server until it answers `PING`.

use std::time::Duration;

use tokio::process::Command;

use crate::integration::{IntegrationError, Result};

/// Container runtime (Docker or Podman).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
}

/// Specification for a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: &'static str,
    pub image: &'static str,
    pub port: u16,
    pub command: Option<&'static str>,
}

/// Redis container specification.
///
/// Persistence is disabled; every run starts from an empty database.
pub const REDIS_SPEC: ContainerSpec = ContainerSpec {
    name: "cblcache-redis",
    image: "redis:7-alpine",
    port: 6379,
    command: Some("redis-server --save \"\" --appendonly no"),
};

/// Builds arguments for `docker run` / `podman run`.
///
/// The container is detached, removed on stop (`--rm`) and publishes
/// `host_port` on the spec's port.
pub fn container_run_args(spec: &ContainerSpec, host_port: u16) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        spec.name.to_string(),
        "-d".to_string(),
        "-p".to_string(),
        format!("{}:{}", host_port, spec.port),
        spec.image.to_string(),
    ];

    if let Some(cmd) = spec.command {
        args.extend(
            cmd.split_whitespace()
                .map(|arg| arg.trim_matches('"').to_string()),
        );
    }

    args
}

/// Returns the `REDIS_URL` the tests connect to.
pub fn redis_url(host_port: u16) -> String {
    format!("redis://localhost:{}/0", host_port)
}

/// Returns the command name for the container runtime.
pub fn runtime_command(runtime: ContainerRuntime) -> &'static str {
    match runtime {
        ContainerRuntime::Docker => "docker",
        ContainerRuntime::Podman => "podman",
    }
}

/// Detects which container runtime is available.
///
/// If `prefer_podman` is true, checks Podman first, then Docker.
pub async fn detect_runtime(prefer_podman: bool) -> Result<ContainerRuntime> {
    let check_order = if prefer_podman {
        [ContainerRuntime::Podman, ContainerRuntime::Docker]
    } else {
        [ContainerRuntime::Docker, ContainerRuntime::Podman]
    };

    for runtime in check_order {
        let output = Command::new(runtime_command(runtime))
            .arg("--version")
            .output()
            .await;

        if let Ok(output) = output {
            if output.status.success() {
                return Ok(runtime);
            }
        }
    }

    Err(IntegrationError::DockerNotAvailable(
        "Neither docker nor podman found in PATH".to_string(),
    ))
}

/// Returns true if a container with the spec's name is running.
pub async fn is_running(runtime: ContainerRuntime, spec: &ContainerSpec) -> Result<bool> {
    let output = Command::new(runtime_command(runtime))
        .args(["ps", "-q", "-f", &format!("name={}", spec.name)])
        .output()
        .await?;

    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}

/// Stops a container. Errors are ignored since it might not exist.
pub async fn stop_container(runtime: ContainerRuntime, name: &str) -> Result<()> {
    let _ = Command::new(runtime_command(runtime))
        .args(["stop", name])
        .output()
        .await;

    Ok(())
}

/// Starts a container, replacing any stopped one with the same name.
pub async fn start_container(
    runtime: ContainerRuntime,
    spec: &ContainerSpec,
    host_port: u16,
) -> Result<()> {
    stop_container(runtime, spec.name).await?;

    let args = container_run_args(spec, host_port);
    let output = Command::new(runtime_command(runtime))
        .args(&args)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IntegrationError::ContainerFailed(format!(
            "Failed to start container '{}': {}",
            spec.name, stderr
        )));
    }

    Ok(())
}

/// Polls `redis-cli ping` inside the container until it answers or
/// `timeout` elapses.
pub async fn wait_for_health(
    runtime: ContainerRuntime,
    spec: &ContainerSpec,
    timeout: Duration,
) -> Result<()> {
    let start = std::time::Instant::now();
    let poll_interval = Duration::from_millis(500);

    while start.elapsed() < timeout {
        if check_redis_health(runtime, spec.name).await {
            return Ok(());
        }

        tokio::time::sleep(poll_interval).await;
    }

    Err(IntegrationError::ContainerNotHealthy {
        name: spec.name.to_string(),
        timeout_secs: timeout.as_secs(),
    })
}

async fn check_redis_health(runtime: ContainerRuntime, name: &str) -> bool {
    let output = Command::new(runtime_command(runtime))
        .args(["exec", name, "redis-cli", "ping"])
        .output()
        .await;

    match output {
        Ok(output) => {
            output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "PONG"
        }
        Err(_) => false,
    }
}
