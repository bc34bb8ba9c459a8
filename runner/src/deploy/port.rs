//! Container port resolution
//!
//! The port is resolved by walking an ordered list of strategies; the first
//! one that produces a value wins, and [`DEFAULT_PORT`] closes the chain.

use std::collections::HashMap;

use tracing::debug;

use crate::models::deployment::DeploymentRequest;

/// Port used when nothing else names one
pub const DEFAULT_PORT: u16 = 3000;

/// A single way of finding the workload's port
pub trait PortStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn resolve(&self, request: &DeploymentRequest) -> Option<u16>;
}

/// The port given explicitly in the request
pub struct RequestPort;

impl PortStrategy for RequestPort {
    fn name(&self) -> &'static str {
        "request"
    }

    fn resolve(&self, request: &DeploymentRequest) -> Option<u16> {
        request.port.filter(|p| *p > 0)
    }
}

/// A `PORT` entry in the request's environment
pub struct EnvPort;

impl PortStrategy for EnvPort {
    fn name(&self) -> &'static str {
        "env"
    }

    fn resolve(&self, request: &DeploymentRequest) -> Option<u16> {
        request
            .env_vars
            .get("PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .filter(|p| *p > 0)
    }
}

/// The last `EXPOSE` directive in the build file
pub struct ExposedPort;

impl PortStrategy for ExposedPort {
    fn name(&self) -> &'static str {
        "dockerfile"
    }

    fn resolve(&self, request: &DeploymentRequest) -> Option<u16> {
        request
            .dockerfile
            .lines()
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                match words.next() {
                    Some(kw) if kw.eq_ignore_ascii_case("EXPOSE") => words.next(),
                    _ => None,
                }
            })
            .filter_map(|spec| spec.split('/').next()?.parse::<u16>().ok())
            .filter(|p| *p > 0)
            .last()
    }
}

/// Ordered chain of port strategies
pub struct PortResolver {
    strategies: Vec<Box<dyn PortStrategy>>,
    default: u16,
}

impl PortResolver {
    pub fn new(strategies: Vec<Box<dyn PortStrategy>>, default: u16) -> Self {
        Self {
            strategies,
            default,
        }
    }

    /// Resolve the port for a request
    pub fn resolve(&self, request: &DeploymentRequest) -> u16 {
        for strategy in &self.strategies {
            if let Some(port) = strategy.resolve(request) {
                debug!(
                    deployment = %request.deployment_id,
                    strategy = strategy.name(),
                    port,
                    "Resolved container port"
                );
                return port;
            }
        }
        self.default
    }
}

impl Default for PortResolver {
    fn default() -> Self {
        Self::new(
            vec![Box::new(RequestPort), Box::new(EnvPort), Box::new(ExposedPort)],
            DEFAULT_PORT,
        )
    }
}

/// Environment for the container, with `PORT` set when the request left it out
pub fn env_with_port(env: &HashMap<String, String>, port: u16) -> HashMap<String, String> {
    let mut env = env.clone();
    env.entry("PORT".to_string())
        .or_insert_with(|| port.to_string());
    env
}
