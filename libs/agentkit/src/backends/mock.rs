//! In-memory backend that records every call.
//!
//! Used by tests of service agents to assert which runners were prepared,
//! started and stopped without touching a container daemon.

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

use super::{BackendKind, ContainerRuntime, InstanceHandle, RunnerDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Prepare(String),
    Start(String),
    Stop(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<RuntimeCall>,
    started: Vec<RunnerDefinition>,
    running: HashMap<Uuid, String>,
    fail_prepare: HashSet<String>,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
}

#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_prepare_of(&self, runner: impl Into<String>) {
        self.state.lock().fail_prepare.insert(runner.into());
    }

    pub fn fail_start_of(&self, runner: impl Into<String>) {
        self.state.lock().fail_start.insert(runner.into());
    }

    pub fn fail_stop_of(&self, runner: impl Into<String>) {
        self.state.lock().fail_stop.insert(runner.into());
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.fail_prepare.clear();
        state.fail_start.clear();
        state.fail_stop.clear();
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    /// Number of `stop_instance` calls received, successful or not.
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Stop(_)))
            .count()
    }

    /// Every definition passed to a successful `start_image`, in call order.
    #[must_use]
    pub fn started(&self) -> Vec<RunnerDefinition> {
        self.state.lock().started.clone()
    }

    /// Names of the instances currently running, sorted.
    #[must_use]
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().running.values().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn prepare(&self, definition: &RunnerDefinition) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Prepare(definition.name.clone()));
        if state.fail_prepare.contains(&definition.name) {
            bail!("image {} rejected", definition.image);
        }
        Ok(())
    }

    async fn start_image(&self, definition: &RunnerDefinition) -> Result<InstanceHandle> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Start(definition.name.clone()));
        if state.fail_start.contains(&definition.name) {
            bail!("port already allocated");
        }
        let instance_id = Uuid::now_v7();
        state.running.insert(instance_id, definition.name.clone());
        state.started.push(definition.clone());
        Ok(InstanceHandle {
            runner: definition.name.clone(),
            instance_id,
            backend: BackendKind::Mock,
            pid: None,
            created_at: Instant::now(),
        })
    }

    async fn stop_instance(&self, handle: &InstanceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Stop(handle.runner.clone()));
        if state.fail_stop.contains(&handle.runner) {
            bail!("daemon did not answer");
        }
        state.running.remove(&handle.instance_id);
        Ok(())
    }
}
