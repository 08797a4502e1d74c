#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Builder and runtime phases driven against the recording mock runtime.

use std::sync::Arc;
use std::time::Duration;

use agentkit::backends::{MockRuntime, RuntimeCall};
use agentkit::lifecycle::{CreationState, LifecycleError, LifecycleState};
use agentkit::{
    CallCtx, Endpoint, NetworkInstance, NetworkMapping, NetworkScope, ProviderInformation,
    ReadinessProbe, ReadinessTarget, RunnerState, ServiceIdentity, StatusSink,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis_store::config::RedisAgentConfig;
use redis_store::domain::deploy::{DeploymentTarget, KustomizeTarget, ReadSelector};
use redis_store::domain::requests::{
    CreateRequest, DeployRequest, InitRequest, LoadRequest, UpdateRequest,
};
use redis_store::infra::manifest::JsonManifestRenderer;
use redis_store::infra::settings_store::InMemorySettingsStore;
use redis_store::{AgentError, RedisAgent, Runtime, SettingsPatch};
use serde_json::json;

struct AlwaysReady;

#[async_trait]
impl ReadinessProbe for AlwaysReady {
    async fn probe(&self, _target: &ReadinessTarget) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Lines(Mutex<Vec<String>>);

impl StatusSink for Lines {
    fn forward(&self, _source: &str, line: &str) {
        self.0.lock().push(line.to_owned());
    }
}

struct Harness {
    runtime: Arc<MockRuntime>,
    store: Arc<InMemorySettingsStore>,
    agent: RedisAgent,
}

fn harness() -> Harness {
    let mut config = RedisAgentConfig::default();
    config.readiness.backoff = Duration::from_millis(1);
    let runtime = Arc::new(MockRuntime::new());
    let store = Arc::new(InMemorySettingsStore::new());
    let agent = RedisAgent::new(
        config,
        runtime.clone(),
        Arc::new(AlwaysReady),
        store.clone(),
        Arc::new(JsonManifestRenderer),
    );
    Harness {
        runtime,
        store,
        agent,
    }
}

fn identity() -> ServiceIdentity {
    ServiceIdentity::new("shop", "cache")
}

fn mapping(name: &str, port: u16) -> NetworkMapping {
    NetworkMapping::new(
        Endpoint::tcp(&identity(), name),
        vec![NetworkInstance::new("localhost", port, NetworkScope::Native)],
    )
}

fn proposed() -> InitRequest {
    InitRequest::new(vec![mapping("write", 7000), mapping("read", 7001)])
}

async fn loaded_runtime(h: &Harness, settings: serde_json::Value) -> Runtime {
    let mut runtime = h.agent.runtime();
    runtime
        .load(
            &CallCtx::default(),
            LoadRequest::new(identity()).with_settings(settings),
        )
        .await
        .unwrap();
    runtime
}

#[tokio::test]
async fn without_replica_read_aliases_write_and_one_server_runs() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": false })).await;
    let ctx = CallCtx::default();

    let init = runtime
        .init(&ctx, InitRequest::new(vec![mapping("write", 7000)]))
        .await
        .unwrap();
    runtime.start(&ctx).await.unwrap();

    assert_eq!(init.mappings.len(), 2);
    assert_eq!(init.mappings[1].endpoint.name, "read");
    assert_eq!(init.mappings[1].instances, init.mappings[0].instances);
    assert_eq!(
        init.exported.find_value(NetworkScope::Native, "read", "connection"),
        Some("redis://localhost:7000")
    );
    assert_eq!(h.runtime.running(), ["shop/cache"]);
    assert_eq!(runtime.lifecycle().state(), LifecycleState::Started);
}

#[tokio::test]
async fn replica_follows_the_primary() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": true })).await;
    let ctx = CallCtx::default();

    let init = runtime.init(&ctx, proposed()).await.unwrap();
    runtime.start(&ctx).await.unwrap();

    let started = h.runtime.started();
    let names: Vec<&str> = started.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["shop/cache", "shop/cache-read"]);
    assert_eq!(started[0].ports[0].host, 7000);
    assert_eq!(started[1].ports[0].host, 7001);
    assert_eq!(
        started[1].command,
        ["redis-server", "--replicaof", "host.docker.internal", "7000"]
    );
    assert_eq!(
        init.exported.find_value(NetworkScope::Native, "read", "connection"),
        Some("redis://localhost:7001")
    );
    assert_eq!(
        init.exported
            .find_value(NetworkScope::Container, "write", "connection"),
        Some("redis://host.docker.internal:7000")
    );
}

#[tokio::test]
async fn replica_without_read_mapping_fails_init() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": true })).await;

    let err = runtime
        .init(&CallCtx::default(), InitRequest::new(vec![mapping("write", 7000)]))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Network { .. }));
    assert!(runtime.runners().is_empty());
    assert_eq!(runtime.lifecycle().state(), LifecycleState::Loaded);
}

#[tokio::test]
async fn init_reports_where_the_primary_runs() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({})).await;
    let lines = Arc::new(Lines::default());
    let ctx = CallCtx::default().with_status_sink(lines.clone());

    runtime
        .init(&ctx, InitRequest::new(vec![mapping("write", 7000)]))
        .await
        .unwrap();
    runtime.start(&ctx).await.unwrap();

    let lines = lines.0.lock().clone();
    assert!(lines.contains(&"will run on: localhost:7000".to_owned()));
    assert!(lines.contains(&"started 1 runner(s)".to_owned()));
}

#[tokio::test]
async fn second_init_replaces_the_first() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": true })).await;
    let ctx = CallCtx::default();

    runtime.init(&ctx, proposed()).await.unwrap();
    runtime.start(&ctx).await.unwrap();
    runtime
        .init(
            &ctx,
            InitRequest::new(vec![mapping("write", 8000), mapping("read", 8001)]),
        )
        .await
        .unwrap();

    assert!(h.runtime.running().is_empty());
    assert_eq!(h.runtime.stop_calls(), 2);
    let ports: Vec<u16> = runtime
        .runners()
        .iter()
        .map(|r| r.definition().ports[0].host)
        .collect();
    assert_eq!(ports, [8000, 8001]);
    assert_eq!(runtime.mappings()[0].instances[0].port, 8000);

    runtime.start(&ctx).await.unwrap();
    assert_eq!(h.runtime.running(), ["shop/cache", "shop/cache-read"]);
}

#[tokio::test]
async fn failed_init_keeps_previous_runners() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({})).await;
    let ctx = CallCtx::default();
    runtime
        .init(&ctx, InitRequest::new(vec![mapping("write", 7000)]))
        .await
        .unwrap();
    runtime.start(&ctx).await.unwrap();

    let err = runtime.init(&ctx, InitRequest::new(Vec::new())).await;

    assert!(err.is_err());
    assert_eq!(h.runtime.running(), ["shop/cache"]);
    assert_eq!(runtime.runners()[0].state(), RunnerState::Running);
    assert_eq!(runtime.mappings()[0].instances[0].port, 7000);
}

#[tokio::test]
async fn stop_twice_is_clean() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": true })).await;
    let ctx = CallCtx::default();
    runtime.init(&ctx, proposed()).await.unwrap();
    runtime.start(&ctx).await.unwrap();

    assert!(runtime.stop(&ctx).await.unwrap().is_clean());
    assert!(runtime.stop(&ctx).await.unwrap().is_clean());

    assert_eq!(h.runtime.stop_calls(), 2);
    assert_eq!(runtime.lifecycle().state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn stop_reports_failures_without_skipping_runners() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": true })).await;
    let ctx = CallCtx::default();
    runtime.init(&ctx, proposed()).await.unwrap();
    runtime.start(&ctx).await.unwrap();
    h.runtime.fail_stop_of("shop/cache-read");

    let response = runtime.stop(&ctx).await.unwrap();

    let errors = response.errors.unwrap();
    assert_eq!(errors.failures.len(), 1);
    assert_eq!(errors.failures[0].runner, "shop/cache-read");
    assert_eq!(h.runtime.running(), ["shop/cache-read"]);
}

#[tokio::test]
async fn destroy_attempts_every_runner() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "read-replica": true })).await;
    let ctx = CallCtx::default();
    runtime.init(&ctx, proposed()).await.unwrap();
    runtime.start(&ctx).await.unwrap();
    h.runtime.fail_stop_of("shop/cache-read");

    let err = runtime.destroy(&ctx).await.unwrap_err();

    assert!(matches!(err, AgentError::Teardown { .. }));
    let stops: Vec<RuntimeCall> = h
        .runtime
        .calls()
        .into_iter()
        .filter(|c| matches!(c, RuntimeCall::Stop(_)))
        .collect();
    assert_eq!(
        stops,
        [
            RuntimeCall::Stop("shop/cache-read".to_owned()),
            RuntimeCall::Stop("shop/cache".to_owned()),
        ]
    );
    assert_eq!(h.runtime.running(), ["shop/cache-read"]);
    assert_eq!(runtime.lifecycle().state(), LifecycleState::Destroyed);
    assert!(runtime.runners().is_empty());
    assert!(runtime.exported().is_empty());
}

#[tokio::test]
async fn persist_keeps_servers_on_stop_but_not_on_destroy() {
    let h = harness();
    let mut runtime = loaded_runtime(&h, json!({ "persist": true })).await;
    let ctx = CallCtx::default();
    runtime
        .init(&ctx, InitRequest::new(vec![mapping("write", 7000)]))
        .await
        .unwrap();
    runtime.start(&ctx).await.unwrap();

    let started = h.runtime.started();
    assert_eq!(started[0].volume.as_ref().unwrap().name, "shop-cache-write-data");
    assert!(started[0].command.contains(&"--appendonly".to_owned()));

    let response = runtime.stop(&ctx).await.unwrap();
    assert!(response.skipped);
    assert_eq!(h.runtime.stop_calls(), 0);
    assert_eq!(runtime.lifecycle().state(), LifecycleState::Stopped);

    runtime.destroy(&ctx).await.unwrap();
    assert_eq!(h.runtime.stop_calls(), 1);
    assert!(h.runtime.running().is_empty());
}

#[tokio::test]
async fn phases_before_load_or_init_are_rejected() {
    let h = harness();
    let ctx = CallCtx::default();
    let mut runtime = h.agent.runtime();

    let err = runtime.init(&ctx, proposed()).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Lifecycle(LifecycleError::NotLoaded { .. })
    ));

    runtime
        .load(&ctx, LoadRequest::new(identity()))
        .await
        .unwrap();
    let err = runtime.start(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Lifecycle(LifecycleError::NotInitialized { .. })
    ));
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn create_uses_the_default_and_only_once() {
    let h = harness();
    let ctx = CallCtx::default();
    let mut builder = h.agent.builder();

    let loaded = builder
        .load(&ctx, LoadRequest::new(identity()))
        .await
        .unwrap();
    assert!(loaded.getting_started.is_some());
    assert_eq!(builder.lifecycle().creation(), CreationState::Uncreated);

    let created = builder
        .create(&ctx, CreateRequest::default())
        .await
        .unwrap();
    assert!(created.settings.read_replica);
    assert_eq!(h.store.get(&identity()), Some(created.settings));
    assert_eq!(builder.lifecycle().creation(), CreationState::Created);

    let err = builder
        .create(
            &ctx,
            CreateRequest {
                read_replica: Some(false),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Lifecycle(LifecycleError::AlreadyCreated)
    ));
}

#[tokio::test]
async fn stored_settings_mark_the_service_created() {
    let h = harness();
    let ctx = CallCtx::default();
    let mut first = h.agent.builder();
    first.load(&ctx, LoadRequest::new(identity())).await.unwrap();
    first
        .create(
            &ctx,
            CreateRequest {
                read_replica: Some(false),
            },
        )
        .await
        .unwrap();

    let mut second = h.agent.builder();
    second
        .load(&ctx, LoadRequest::new(identity()))
        .await
        .unwrap();
    assert_eq!(second.lifecycle().creation(), CreationState::Created);
    assert!(!second.snapshot().unwrap().settings.read_replica);
}

#[tokio::test]
async fn update_patches_and_persists() {
    let h = harness();
    let ctx = CallCtx::default();
    let mut builder = h.agent.builder();
    builder
        .load(&ctx, LoadRequest::new(identity()))
        .await
        .unwrap();

    let response = builder
        .update(
            &ctx,
            UpdateRequest {
                patch: SettingsPatch {
                    persist: Some(true),
                    ..SettingsPatch::default()
                },
            },
        )
        .await
        .unwrap();

    assert!(response.settings.persist);
    assert!(!response.settings.read_replica);
    assert!(h.store.get(&identity()).unwrap().persist);
}

#[tokio::test]
async fn builder_publishes_connection_strings_with_password() {
    let h = harness();
    let ctx = CallCtx::default();
    let mut builder = h.agent.builder();
    builder
        .load(
            &ctx,
            LoadRequest::new(identity()).with_settings(json!({ "read-replica": true })),
        )
        .await
        .unwrap();

    let request = proposed().with_provider_info(
        ProviderInformation::new("redis", "shop/cache").with("REDIS_PASSWORD", "s3cret"),
    );
    let response = builder.init(&ctx, &request).unwrap();

    let published = &response.provider_infos[0];
    assert_eq!(published.name, "redis");
    assert_eq!(
        published.data.get("write").map(String::as_str),
        Some("redis://:s3cret@localhost:7000")
    );
    assert_eq!(
        published.data.get("read").map(String::as_str),
        Some("redis://:s3cret@localhost:7001")
    );
}

#[tokio::test]
async fn deploy_renders_replica_overlay() {
    let h = harness();
    let ctx = CallCtx::default();
    let dir = tempfile::tempdir().unwrap();
    let mut builder = h.agent.builder();
    builder
        .load(
            &ctx,
            LoadRequest::new(identity()).with_settings(json!({ "read-replica": true })),
        )
        .await
        .unwrap();

    let request = DeployRequest {
        environment: "staging".to_owned(),
        namespace: "shop".to_owned(),
        target: DeploymentTarget::Kustomize(KustomizeTarget {
            destination: dir.path().to_path_buf(),
        }),
    };
    let err = builder.deploy(&ctx, request.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Lifecycle(LifecycleError::NotInitialized { .. })
    ));

    builder.init(&ctx, &proposed()).unwrap();
    let response = builder.deploy(&ctx, request).await.unwrap();

    assert_eq!(response.parameters.replica_count, 1);
    assert_eq!(response.parameters.read_selector, ReadSelector::Read);
    assert_eq!(response.rendered.len(), 3);
    let root = dir.path().join("applications/shop/services/cache");
    assert!(root.join("base/base.parameters.json").exists());
    assert!(
        root.join("overlays/staging/replicas.parameters.json")
            .exists()
    );
    assert!(
        response
            .parameters
            .secrets
            .values()
            .any(|v| v == "redis://host.docker.internal:7001")
    );
}
