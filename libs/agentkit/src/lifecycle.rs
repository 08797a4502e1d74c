//! Lifecycle state machine shared by builders and runtimes.
//!
//! ```text
//! Unloaded -> Loaded -> Initialized -> Started <-> Stopped
//!                                 any -> Destroyed
//! Uncreated -> Created (once)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Initialized,
    Started,
    Stopped,
    Destroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Loaded => "loaded",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Started => "started",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationState {
    Uncreated,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Create,
    Update,
    Build,
    Init,
    Deploy,
    Start,
    Stop,
    Destroy,
    Information,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Create => "create",
            Phase::Update => "update",
            Phase::Build => "build",
            Phase::Init => "init",
            Phase::Deploy => "deploy",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Destroy => "destroy",
            Phase::Information => "information",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{phase} called before load")]
    NotLoaded { phase: Phase },
    #[error("service is already created")]
    AlreadyCreated,
    #[error("{phase} requires a successful init (state: {state})")]
    NotInitialized { phase: Phase, state: LifecycleState },
    #[error("{phase} is not allowed in state {state}")]
    InvalidState { phase: Phase, state: LifecycleState },
}

/// Tracks where a service agent is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: LifecycleState,
    creation: CreationState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: LifecycleState::Unloaded,
            creation: CreationState::Uncreated,
        }
    }
}

impl Lifecycle {
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn creation(&self) -> CreationState {
        self.creation
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state != LifecycleState::Unloaded
    }

    fn is_initialized(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Initialized | LifecycleState::Started | LifecycleState::Stopped
        )
    }

    /// Whether `phase` may run now.
    ///
    /// # Errors
    /// The [`LifecycleError`] describing the unmet precondition.
    pub fn check(&self, phase: Phase) -> Result<(), LifecycleError> {
        match phase {
            Phase::Load | Phase::Destroy | Phase::Information => Ok(()),
            Phase::Create => {
                self.require_loaded(phase)?;
                if self.creation == CreationState::Created {
                    return Err(LifecycleError::AlreadyCreated);
                }
                Ok(())
            }
            Phase::Update | Phase::Build => self.require_loaded(phase),
            Phase::Init => {
                self.require_loaded(phase)?;
                if self.state == LifecycleState::Destroyed {
                    return Err(LifecycleError::InvalidState {
                        phase,
                        state: self.state,
                    });
                }
                Ok(())
            }
            Phase::Deploy | Phase::Start | Phase::Stop => {
                self.require_loaded(phase)?;
                if !self.is_initialized() {
                    return Err(LifecycleError::NotInitialized {
                        phase,
                        state: self.state,
                    });
                }
                Ok(())
            }
        }
    }

    fn require_loaded(&self, phase: Phase) -> Result<(), LifecycleError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(LifecycleError::NotLoaded { phase })
        }
    }

    /// Load keeps a later state: reloading a started service does not
    /// forget that it runs.
    pub fn on_loaded(&mut self, created: bool) {
        if matches!(
            self.state,
            LifecycleState::Unloaded | LifecycleState::Destroyed
        ) {
            self.state = LifecycleState::Loaded;
        }
        if created {
            self.creation = CreationState::Created;
        }
    }

    pub fn on_created(&mut self) {
        self.creation = CreationState::Created;
    }

    pub fn on_initialized(&mut self) {
        self.state = LifecycleState::Initialized;
    }

    pub fn on_started(&mut self) {
        self.state = LifecycleState::Started;
    }

    pub fn on_stopped(&mut self) {
        self.state = LifecycleState::Stopped;
    }

    pub fn on_destroyed(&mut self) {
        self.state = LifecycleState::Destroyed;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn nothing_but_load_destroy_and_information_before_load() {
        let lc = Lifecycle::default();
        assert!(lc.check(Phase::Load).is_ok());
        assert!(lc.check(Phase::Destroy).is_ok());
        assert!(lc.check(Phase::Information).is_ok());
        for phase in [Phase::Create, Phase::Build, Phase::Init, Phase::Start, Phase::Stop] {
            assert_eq!(lc.check(phase), Err(LifecycleError::NotLoaded { phase }));
        }
    }

    #[test]
    fn create_is_one_shot() {
        let mut lc = Lifecycle::default();
        lc.on_loaded(false);
        assert!(lc.check(Phase::Create).is_ok());
        lc.on_created();
        assert_eq!(lc.check(Phase::Create), Err(LifecycleError::AlreadyCreated));

        let mut reloaded = Lifecycle::default();
        reloaded.on_loaded(true);
        assert_eq!(reloaded.creation(), CreationState::Created);
    }

    #[test]
    fn start_and_stop_need_init() {
        let mut lc = Lifecycle::default();
        lc.on_loaded(false);
        assert!(matches!(
            lc.check(Phase::Start),
            Err(LifecycleError::NotInitialized { .. })
        ));
        lc.on_initialized();
        assert!(lc.check(Phase::Start).is_ok());
        lc.on_started();
        assert!(lc.check(Phase::Stop).is_ok());
        lc.on_stopped();
        assert!(lc.check(Phase::Start).is_ok());
        assert!(lc.check(Phase::Stop).is_ok());
    }

    #[test]
    fn destroyed_needs_reload_before_init() {
        let mut lc = Lifecycle::default();
        lc.on_loaded(false);
        lc.on_initialized();
        lc.on_destroyed();
        assert!(matches!(
            lc.check(Phase::Init),
            Err(LifecycleError::InvalidState { .. })
        ));
        assert!(matches!(
            lc.check(Phase::Start),
            Err(LifecycleError::NotInitialized { .. })
        ));

        lc.on_loaded(false);
        assert_eq!(lc.state(), LifecycleState::Loaded);
        assert!(lc.check(Phase::Init).is_ok());
    }

    #[test]
    fn reload_keeps_started_state() {
        let mut lc = Lifecycle::default();
        lc.on_loaded(false);
        lc.on_initialized();
        lc.on_started();
        lc.on_loaded(false);
        assert_eq!(lc.state(), LifecycleState::Started);
    }
}
