//! Resource limit and port resolution tests

use std::collections::HashMap;

use runway::deploy::limits::{
    parse_memory, ResourceLimits, DEFAULT_CPU_SHARES, DEFAULT_MEMORY_BYTES,
};
use runway::deploy::port::{
    env_with_port, EnvPort, ExposedPort, PortResolver, PortStrategy, RequestPort, DEFAULT_PORT,
};
use runway::models::deployment::DeploymentRequest;

fn request() -> DeploymentRequest {
    DeploymentRequest {
        deployment_id: "d1".to_string(),
        project_id: "p1".to_string(),
        repo_url: "https://git.example.com/shop.git".to_string(),
        branch: "main".to_string(),
        commit: "abc1234".to_string(),
        dockerfile: "FROM node:20-alpine\n".to_string(),
        env_vars: HashMap::new(),
        port: None,
        memory: None,
        cpu_shares: None,
    }
}

// ================================ MEMORY ======================================= //

#[test]
fn test_memory_quantities() {
    let cases = [
        ("1Ki", 1024),
        ("1K", 1024),
        ("128Mi", 134_217_728),
        ("512Mi", 536_870_912),
        ("512M", 536_870_912),
        ("1Gi", 1_073_741_824),
        ("4G", 4_294_967_296),
        ("2Ti", 2_199_023_255_552),
        ("0Mi", 0),
    ];

    for (input, expected) in cases {
        assert_eq!(parse_memory(input), expected, "input {:?}", input);
    }
}

#[test]
fn test_memory_unrecognized_uses_default() {
    for input in ["", "1024", "1gi", "1GB", "Gi", " 1Gi", "1Gi ", "1.5Gi", "+1Gi", "1Pi"] {
        assert_eq!(parse_memory(input), DEFAULT_MEMORY_BYTES, "input {:?}", input);
    }
    assert_eq!(DEFAULT_MEMORY_BYTES, 536_870_912);
}

#[test]
fn test_limits() {
    let limits = ResourceLimits::from_quantities("256Mi", 512);
    assert_eq!(limits.memory_bytes, 268_435_456);
    assert_eq!(limits.cpu_shares, 512);

    let fallback = ResourceLimits::from_quantities("lots", -5);
    assert_eq!(fallback, ResourceLimits::default());
    assert_eq!(fallback.cpu_shares, DEFAULT_CPU_SHARES);
}

// ================================= PORTS ======================================= //

#[test]
fn test_strategies_individually() {
    let mut req = request();
    assert_eq!(RequestPort.resolve(&req), None);
    assert_eq!(EnvPort.resolve(&req), None);
    assert_eq!(ExposedPort.resolve(&req), None);

    req.port = Some(8000);
    req.env_vars.insert("PORT".to_string(), " 9000 ".to_string());
    req.dockerfile.push_str("EXPOSE 7000/tcp\n");

    assert_eq!(RequestPort.resolve(&req), Some(8000));
    assert_eq!(EnvPort.resolve(&req), Some(9000));
    assert_eq!(ExposedPort.resolve(&req), Some(7000));
}

#[test]
fn test_resolver_order() {
    let resolver = PortResolver::default();
    let mut req = request();
    assert_eq!(resolver.resolve(&req), DEFAULT_PORT);

    req.dockerfile.push_str("EXPOSE 7000\n");
    assert_eq!(resolver.resolve(&req), 7000);

    req.env_vars.insert("PORT".to_string(), "9000".to_string());
    assert_eq!(resolver.resolve(&req), 9000);

    req.port = Some(8000);
    assert_eq!(resolver.resolve(&req), 8000);
}

#[test]
fn test_resolver_skips_unusable_values() {
    let mut req = request();
    req.port = Some(0);
    req.env_vars.insert("PORT".to_string(), "http".to_string());
    req.dockerfile.push_str("EXPOSE $PORT\n");

    assert_eq!(PortResolver::default().resolve(&req), DEFAULT_PORT);
}

#[test]
fn test_custom_chain() {
    let resolver = PortResolver::new(vec![Box::new(ExposedPort)], 8080);
    let mut req = request();
    req.port = Some(5000);
    assert_eq!(resolver.resolve(&req), 8080);

    req.dockerfile.push_str("EXPOSE 4000\n");
    assert_eq!(resolver.resolve(&req), 4000);
}

#[test]
fn test_port_env_injection() {
    let env = HashMap::from([("NODE_ENV".to_string(), "production".to_string())]);

    let injected = env_with_port(&env, 3000);
    assert_eq!(injected["PORT"], "3000");
    assert_eq!(injected["NODE_ENV"], "production");
    assert!(!env.contains_key("PORT"));

    let explicit = HashMap::from([("PORT".to_string(), "8080".to_string())]);
    assert_eq!(env_with_port(&explicit, 3000)["PORT"], "8080");
}
