//! Deployment pipeline tests against a scripted engine

#[path = "common/mod.rs"]
mod common;

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

use runway::cache::BuildLogCache;
use runway::deploy::builder::{BuildLabels, ImageBuilder, NullSink};
use runway::deploy::container::{ContainerManager, RunParams};
use runway::deploy::context;
use runway::deploy::fsm::DeploymentState;
use runway::deploy::limits::ResourceLimits;
use runway::deploy::metrics::MetricsCollector;
use runway::deploy::streamer::LogStreamer;
use runway::deploy::{AttemptLog, Orchestrator, OrchestratorOptions};
use runway::engine::{BuildEvent, ContainerEngine, EngineStats};
use runway::models::deployment::ImageReference;
use runway::source::LocalFetcher;
use runway::store::{MemoryRecordStore, StoreEntry};

use common::{fast_options, request, silent_workload, source_tree, FakeEngine};

fn orchestrator(
    engine: &Arc<FakeEngine>,
    store: &Arc<MemoryRecordStore>,
    options: OrchestratorOptions,
) -> Orchestrator {
    Orchestrator::new(
        engine.clone(),
        Arc::new(LocalFetcher),
        store.clone(),
        Arc::new(BuildLogCache::new(16)),
        options,
    )
}

fn statuses(store: &MemoryRecordStore, deployment_id: &str) -> Vec<String> {
    store
        .statuses(deployment_id)
        .into_iter()
        .map(|u| u.status)
        .collect()
}

/// Serve 200 on `/` from the loopback interface, returning the port
async fn healthy_workload() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new().route("/", get(|| async { "ok" }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

// ================================ SCENARIOS ==================================== //

#[tokio::test]
async fn test_failed_probe_still_succeeds() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let mut req = request("d1", tree.path());
    req.commit = "abc1234".to_string();
    let outcome = orchestrator.deploy(req).await;

    assert_eq!(outcome.state, DeploymentState::Success);
    assert_eq!(outcome.url.as_deref(), Some("https://shop.apps.test"));
    assert!(outcome.container_id.is_some());
    assert!(outcome.logs.contains("Health check"));

    assert_eq!(statuses(&store, "d1"), vec!["BUILDING", "DEPLOYING", "SUCCESS"]);

    let last = store.last_status("d1").unwrap();
    assert_eq!(last.url.as_deref(), Some("https://shop.apps.test"));
    assert_eq!(last.container_id, outcome.container_id);
    assert!(last.logs.unwrap().contains("Health check"));

    let warnings: Vec<_> = store
        .logs("d1")
        .into_iter()
        .filter(|l| l.level == "warn")
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("Health check"));

    assert_eq!(engine.build_tags(), vec!["runway-d1:abc1234"]);
}

#[tokio::test]
async fn test_build_error_fails_after_draining() {
    let engine = Arc::new(FakeEngine::new().with_build_script(vec![
        BuildEvent::Output("Step 1/3 : FROM node:20-alpine\n".to_string()),
        BuildEvent::Output("Step 2/3 : RUN npm ci\n".to_string()),
        BuildEvent::Error(
            "The command '/bin/sh -c npm ci' returned a non-zero code: 1".to_string(),
        ),
        BuildEvent::Output("Removing intermediate container 4f1c\n".to_string()),
        BuildEvent::Output("cleanup done\n".to_string()),
    ]));
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let outcome = orchestrator.deploy(request("d2", tree.path())).await;

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert_eq!(engine.build_events_drained(), 5);
    assert!(outcome.error.as_deref().unwrap().contains("non-zero code: 1"));
    assert!(outcome.logs.contains("ERROR: The command"));
    assert!(outcome.logs.contains("cleanup done"));

    assert_eq!(statuses(&store, "d2"), vec!["BUILDING", "FAILED"]);
    let last = store.last_status("d2").unwrap();
    assert!(last.error_message.unwrap().contains("non-zero code: 1"));
    assert!(last.logs.unwrap().contains("ERROR: The command"));

    assert!(engine.created().is_empty());
    assert_eq!(engine.container_count(), 0);
}

#[tokio::test]
async fn test_stop_without_container_returns_false() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());

    assert!(!orchestrator.stop("missing").await);
    assert!(!orchestrator.containers().stop_deployment("missing").await);
    assert!(!orchestrator.containers().stop("no-such-container").await);
}

// ================================ PIPELINE ===================================== //

#[tokio::test]
async fn test_healthy_workload_has_no_warning() {
    let port = healthy_workload().await;
    let engine = Arc::new(FakeEngine::new().with_ip("127.0.0.1"));
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let mut req = request("d3", tree.path());
    req.port = Some(port);
    let outcome = orchestrator.deploy(req).await;

    assert!(outcome.is_success());
    assert!(!outcome.logs.contains("Health check"));
    assert!(store.logs("d3").iter().all(|l| l.level != "warn"));
}

#[tokio::test]
async fn test_fetch_failure_is_recorded() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());

    let outcome = orchestrator
        .deploy(request("d4", std::path::Path::new("/no/such/checkout")))
        .await;

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(outcome.error.unwrap().contains("/no/such/checkout"));
    assert_eq!(statuses(&store, "d4"), vec!["BUILDING", "FAILED"]);
    assert!(engine.build_tags().is_empty());
}

#[tokio::test]
async fn test_start_failure_is_recorded_and_cleaned_up() {
    let engine = Arc::new(FakeEngine::new().failing_start());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let outcome = orchestrator.deploy(request("d5", tree.path())).await;

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(outcome.error.unwrap().contains("external connectivity"));
    assert_eq!(statuses(&store, "d5"), vec!["BUILDING", "DEPLOYING", "FAILED"]);
    assert_eq!(engine.created().len(), 1);
    assert_eq!(engine.container_count(), 0);
}

#[tokio::test]
async fn test_container_spec_from_request() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let mut req = request("d6", tree.path());
    req.dockerfile.push_str("EXPOSE 8080\n");
    req.env_vars = HashMap::from([("NODE_ENV".to_string(), "production".to_string())]);
    req.memory = Some("1Gi".to_string());
    req.cpu_shares = Some(512);
    orchestrator.deploy(req).await;

    let created = engine.created();
    assert_eq!(created.len(), 1);
    let spec = &created[0];

    assert_eq!(spec.name, "runway-d6");
    assert_eq!(spec.image, "runway-d6:abc1234");
    assert_eq!(spec.port, Some(8080));
    assert_eq!(spec.env, vec!["NODE_ENV=production", "PORT=8080"]);
    assert_eq!(spec.memory_bytes, Some(1_073_741_824));
    assert_eq!(spec.cpu_shares, Some(512));
    assert_eq!(spec.restart_policy.as_deref(), Some("unless-stopped"));
    assert_eq!(spec.labels["runway.deployment_id"], "d6");
    assert_eq!(spec.labels["runway.project_id"], "shop");
}

#[tokio::test]
async fn test_defaults_when_request_is_silent() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let mut req = request("d7", tree.path());
    req.memory = Some("plenty".to_string());
    orchestrator.deploy(req).await;

    let spec = &engine.created()[0];
    assert_eq!(spec.port, Some(3000));
    assert_eq!(spec.env, vec!["PORT=3000"]);
    assert_eq!(spec.memory_bytes, Some(536_870_912));
    assert_eq!(spec.cpu_shares, Some(1024));
}

#[tokio::test]
async fn test_redeploy_replaces_container() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let first = orchestrator.deploy(request("d8", tree.path())).await;
    let mut req = request("d8", tree.path());
    req.commit = "fedcba9876".to_string();
    let second = orchestrator.deploy(req).await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_ne!(first.container_id, second.container_id);
    assert_eq!(engine.containers_for("d8").len(), 1);
    assert_eq!(
        engine.build_tags(),
        vec!["runway-d8:abc1234", "runway-d8:fedcba9"]
    );
}

#[tokio::test]
async fn test_stop_during_settle_cancels() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let options = OrchestratorOptions {
        settle_delay: Duration::from_millis(500),
        ..fast_options()
    };
    let orchestrator = Arc::new(orchestrator(&engine, &store, options));
    let tree = source_tree();

    let pipeline = {
        let orchestrator = orchestrator.clone();
        let req = request("d9", tree.path());
        tokio::spawn(async move { orchestrator.deploy(req).await })
    };

    let mut waited = Duration::ZERO;
    while engine.containers_for("d9").is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(engine.containers_for("d9").len(), 1);

    assert!(orchestrator.stop("d9").await);
    let outcome = pipeline.await.unwrap();

    assert_eq!(outcome.state, DeploymentState::Canceled);
    assert!(outcome.url.is_none());
    assert_eq!(statuses(&store, "d9"), vec!["BUILDING", "DEPLOYING", "CANCELED"]);
    assert!(engine.containers_for("d9").is_empty());
    assert!(!orchestrator.cancels().is_running("d9"));
}

#[tokio::test]
async fn test_stop_during_health_check_cancels() {
    let (port, accepted) = silent_workload().await;
    let engine = Arc::new(FakeEngine::new().with_ip("127.0.0.1"));
    let store = Arc::new(MemoryRecordStore::new());
    let options = OrchestratorOptions {
        probe_timeout: Duration::from_secs(2),
        ..fast_options()
    };
    let orchestrator = Arc::new(orchestrator(&engine, &store, options));
    let tree = source_tree();

    let pipeline = {
        let orchestrator = orchestrator.clone();
        let mut req = request("d16", tree.path());
        req.port = Some(port);
        tokio::spawn(async move { orchestrator.deploy(req).await })
    };

    // Wait until the health check is connected and waiting for an answer
    let mut waited = Duration::ZERO;
    while !accepted.load(Ordering::SeqCst) && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert!(accepted.load(Ordering::SeqCst));

    assert!(orchestrator.stop("d16").await);
    let outcome = pipeline.await.unwrap();

    assert_eq!(outcome.state, DeploymentState::Canceled);
    assert!(outcome.url.is_none());
    assert!(outcome.container_id.is_none());
    assert_eq!(statuses(&store, "d16"), vec!["BUILDING", "DEPLOYING", "CANCELED"]);
    assert!(store.last_status("d16").unwrap().container_id.is_none());
    assert!(engine.containers_for("d16").is_empty());
}

#[tokio::test]
async fn test_logs_cached_for_fallback() {
    let engine = Arc::new(FakeEngine::new().with_build_script(vec![BuildEvent::Error(
        "base image not found".to_string(),
    )]));
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    orchestrator.deploy(request("d10", tree.path())).await;

    let cached = orchestrator.build_logs().get("d10").unwrap();
    assert!(cached.contains("ERROR: base image not found"));
}

#[tokio::test]
async fn test_timeout_keeps_the_attempt_logs() {
    let (port, _accepted) = silent_workload().await;
    let engine = Arc::new(FakeEngine::new().with_ip("127.0.0.1"));
    let store = Arc::new(MemoryRecordStore::new());
    let options = OrchestratorOptions {
        probe_timeout: Duration::from_secs(10),
        ..fast_options()
    };
    let orchestrator = orchestrator(&engine, &store, options);
    orchestrator
        .build_logs()
        .insert("d11", "output of an earlier attempt".to_string());
    let tree = source_tree();

    let mut req = request("d11", tree.path());
    req.port = Some(port);
    let log = AttemptLog::new();
    let pipeline = orchestrator.deploy_with_log(req, log.clone());
    assert!(tokio::time::timeout(Duration::from_millis(500), pipeline)
        .await
        .is_err());

    let outcome = orchestrator
        .record_timeout("d11", Duration::from_secs(600), &log)
        .await;

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(outcome.error.unwrap().contains("600s"));
    assert!(outcome.logs.contains("Step 1/2"));
    assert!(outcome.logs.contains("600s time limit"));
    assert!(!outcome.logs.contains("earlier attempt"));

    assert_eq!(statuses(&store, "d11"), vec!["BUILDING", "DEPLOYING", "FAILED"]);
    let recorded = store.last_status("d11").unwrap().logs.unwrap();
    assert!(recorded.contains("started from"));
    assert!(recorded.contains("600s time limit"));
    assert_eq!(orchestrator.build_logs().get("d11").unwrap(), outcome.logs);

    assert!(store
        .entries()
        .iter()
        .any(|e| matches!(e, StoreEntry::Log(id, log) if id == "d11" && log.level == "error")));
    assert!(engine.containers_for("d11").is_empty());
}

// ============================ BUILD CONTEXT ==================================== //

fn archive_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().display().to_string())
        .collect()
}

#[tokio::test]
async fn test_context_exists_during_build_only() {
    let tree = source_tree();
    let labels = BuildLabels {
        deployment_id: "d12".to_string(),
        project_id: "shop".to_string(),
        commit: "abc1234".to_string(),
    };

    for engine in [
        FakeEngine::new(),
        FakeEngine::new().with_build_script(vec![BuildEvent::Error("boom".to_string())]),
    ] {
        let engine = Arc::new(engine);
        let builder = ImageBuilder::new(engine.clone());

        let ctx = context::assemble(tree.path(), "FROM scratch\n", "d12")
            .await
            .unwrap();
        let dir = ctx.dir().to_path_buf();
        engine.watch(&dir);

        let _ = builder.build(ctx, &labels, &NullSink).await;

        assert_eq!(engine.watched_path_existed(), vec![true]);
        assert!(!dir.exists());
    }
}

#[tokio::test]
async fn test_context_archive_contents() {
    let engine = Arc::new(FakeEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();
    std::fs::write(tree.path().join("Dockerfile"), "FROM stale\n").unwrap();

    orchestrator.deploy(request("d13", tree.path())).await;

    let bytes = engine.last_build_context().unwrap();
    let names = archive_names(&bytes);
    assert_eq!(names[0], "Dockerfile");
    assert_eq!(names.iter().filter(|n| *n == "Dockerfile").count(), 1);
    assert!(names.contains(&"package.json".to_string()));
    assert!(names.contains(&"src/server.js".to_string()));

    let mut archive = tar::Archive::new(&bytes[..]);
    let mut first = archive.entries().unwrap().next().unwrap().unwrap();
    let mut dockerfile = String::new();
    first.read_to_string(&mut dockerfile).unwrap();
    assert!(dockerfile.starts_with("FROM node:20-alpine"));

    // The working tree itself is untouched
    assert!(tree.path().join("Dockerfile").exists());
}

// ============================ CONTAINERS ======================================= //

#[tokio::test]
async fn test_run_twice_keeps_one_container() {
    let engine = Arc::new(FakeEngine::new());
    let manager = ContainerManager::new(engine.clone());
    let image = ImageReference {
        name: "runway-d14".to_string(),
        tag: "abc1234".to_string(),
    };
    let env = HashMap::new();

    for _ in 0..2 {
        let handle = manager
            .run(RunParams {
                image: &image,
                deployment_id: "d14",
                project_id: "shop",
                port: 3000,
                env: &env,
                limits: ResourceLimits::default(),
            })
            .await
            .unwrap();
        assert_eq!(handle.host_port, Some(common::FAKE_HOST_PORT));
        assert_eq!(engine.containers_for("d14").len(), 1);
    }

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].deployment_id, "d14");
    assert_eq!(listed[0].state, "running");

    assert!(manager.stop_deployment("d14").await);
    assert!(engine.containers_for("d14").is_empty());
}

#[tokio::test]
async fn test_stop_removes_exited_container() {
    let engine = Arc::new(FakeEngine::new());
    let manager = ContainerManager::new(engine.clone());
    let image = ImageReference {
        name: "runway-d17".to_string(),
        tag: "abc1234".to_string(),
    };
    let env = HashMap::new();

    let handle = manager
        .run(RunParams {
            image: &image,
            deployment_id: "d17",
            project_id: "shop",
            port: 3000,
            env: &env,
            limits: ResourceLimits::default(),
        })
        .await
        .unwrap();

    // The workload exits on its own
    engine.stop_container(&handle.id, 0).await.unwrap();
    assert_eq!(manager.list().await.unwrap()[0].state, "exited");

    assert!(manager.stop_deployment("d17").await);
    assert!(engine.containers_for("d17").is_empty());
}

#[tokio::test]
async fn test_similar_ids_keep_separate_containers() {
    let engine = Arc::new(FakeEngine::new());
    let manager = ContainerManager::new(engine.clone());
    let env = HashMap::new();

    for deployment_id in ["Team/A", "team-a"] {
        let image = ImageReference {
            name: "runway-team".to_string(),
            tag: "abc1234".to_string(),
        };
        manager
            .run(RunParams {
                image: &image,
                deployment_id,
                project_id: "shop",
                port: 3000,
                env: &env,
                limits: ResourceLimits::default(),
            })
            .await
            .unwrap();
    }

    assert_eq!(engine.containers_for("Team/A").len(), 1);
    assert_eq!(engine.containers_for("team-a").len(), 1);
    assert_ne!(
        engine.containers_for("Team/A")[0].spec.name,
        engine.containers_for("team-a")[0].spec.name
    );
}

#[tokio::test]
async fn test_metrics_and_logs_for_container() {
    let engine = Arc::new(
        FakeEngine::new()
            .with_stats(EngineStats {
                cpu_total: 300,
                precpu_total: 100,
                system_cpu: 2_000,
                presystem_cpu: 1_000,
                online_cpus: 2,
                memory_usage: 256,
                memory_limit: 1024,
                networks: vec![(10, 20), (5, 5)],
            })
            .with_log_lines(&["booting", "listening on 3000", "GET / 200"]),
    );
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(&engine, &store, fast_options());
    let tree = source_tree();

    let outcome = orchestrator.deploy(request("d15", tree.path())).await;
    let container_id = outcome.container_id.unwrap();

    let sample = MetricsCollector::new(engine.clone())
        .sample(&container_id)
        .await;
    assert!((sample.cpu_percent - 40.0).abs() < 1e-9);
    assert!((sample.memory_percent - 25.0).abs() < 1e-9);
    assert_eq!(sample.network_rx_bytes, 15);
    assert_eq!(sample.network_tx_bytes, 25);

    let text = LogStreamer::new(engine.clone())
        .tail(&container_id, 2)
        .await
        .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(" listening on 3000"));
    assert!(lines[1].ends_with(" GET / 200"));
}

#[tokio::test]
async fn test_metrics_zeroed_when_unavailable() {
    let engine = Arc::new(FakeEngine::new());
    let sample = MetricsCollector::new(engine).sample("gone").await;

    assert_eq!(sample.cpu_percent, 0.0);
    assert_eq!(sample.memory_usage, 0);
    assert!(sample.sampled_at.is_some());
}
