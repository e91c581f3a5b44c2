// In-memory ContainerRuntime that records every call, for pipeline tests
use crate::error::RuntimeError;
use crate::runtime::{BuildRequest, ContainerRuntime, ContainerSpec, CreatedContainer};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    BuildImage(String),
    CreateContainer(String),
    StartContainer(String),
    WaitContainer(String),
    StopContainer(String),
    ContainerLogs(String),
    RemoveContainer(String),
    ListCreatedContainers,
    RemoveImage(String, bool),
    ListDanglingImages,
}

#[derive(Debug, Clone)]
pub enum WaitBehavior {
    Exit(i64),
    Fail(String),
    Hang,
}

struct State {
    calls: Vec<Call>,
    builds: Vec<BuildRequest>,
    specs: Vec<ContainerSpec>,
    live_containers: Vec<String>,
    live_images: Vec<String>,
    created: Vec<CreatedContainer>,
    dangling: Vec<String>,
    build_error: Option<String>,
    start_fails: bool,
    wait: WaitBehavior,
    logs: Vec<u8>,
    logs_fail: bool,
    failing_removals: HashSet<String>,
    all_removals_fail: bool,
    image_removal_fails: bool,
    listing_fails: bool,
    next_id: u64,
}

pub struct MockRuntime {
    state: Mutex<State>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                builds: Vec::new(),
                specs: Vec::new(),
                live_containers: Vec::new(),
                live_images: Vec::new(),
                created: Vec::new(),
                dangling: Vec::new(),
                build_error: None,
                start_fails: false,
                wait: WaitBehavior::Exit(0),
                logs: b"[]".to_vec(),
                logs_fail: false,
                failing_removals: HashSet::new(),
                all_removals_fail: false,
                image_removal_fails: false,
                listing_fails: false,
                next_id: 0,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_logs(&self, logs: &[u8]) {
        self.with(|s| s.logs = logs.to_vec());
    }

    pub fn set_wait(&self, wait: WaitBehavior) {
        self.with(|s| s.wait = wait);
    }

    pub fn fail_build(&self, message: &str) {
        self.with(|s| s.build_error = Some(message.to_string()));
    }

    pub fn fail_start(&self) {
        self.with(|s| s.start_fails = true);
    }

    pub fn fail_logs(&self) {
        self.with(|s| s.logs_fail = true);
    }

    pub fn fail_container_removal(&self, id: &str) {
        self.with(|s| s.failing_removals.insert(id.to_string()));
    }

    pub fn fail_all_container_removals(&self) {
        self.with(|s| s.all_removals_fail = true);
    }

    pub fn fail_image_removal(&self) {
        self.with(|s| s.image_removal_fails = true);
    }

    pub fn fail_listing(&self) {
        self.with(|s| s.listing_fails = true);
    }

    pub fn add_created_container(&self, id: &str, created: i64) {
        self.with(|s| {
            s.created.push(CreatedContainer {
                id: id.to_string(),
                created,
            })
        });
    }

    pub fn add_dangling_image(&self, id: &str) {
        self.with(|s| s.dangling.push(id.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| predicate(*c)).count())
    }

    pub fn last_build(&self) -> Option<BuildRequest> {
        self.with(|s| s.builds.last().cloned())
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.with(|s| s.builds.clone())
    }

    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.with(|s| s.specs.last().cloned())
    }

    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.with(|s| s.specs.clone())
    }

    /// Containers created and not yet removed
    pub fn live_containers(&self) -> Vec<String> {
        self.with(|s| s.live_containers.clone())
    }

    /// Tags built and not yet removed
    pub fn live_images(&self) -> Vec<String> {
        self.with(|s| s.live_images.clone())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn build_image(&self, request: BuildRequest) -> Result<(), RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::BuildImage(request.tag.clone()));
            s.builds.push(request.clone());
            if let Some(error) = &s.build_error {
                return Err(RuntimeError::Daemon(error.clone()));
            }
            if !s.live_images.contains(&request.tag) {
                s.live_images.push(request.tag.clone());
            }
            Ok(())
        })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::CreateContainer(spec.name.clone()));
            s.specs.push(spec.clone());
            s.next_id += 1;
            let id = format!("container-{}", s.next_id);
            s.live_containers.push(id.clone());
            Ok(id)
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::StartContainer(id.to_string()));
            if s.start_fails {
                Err(RuntimeError::Daemon("container start refused".to_string()))
            } else {
                Ok(())
            }
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let behavior = self.with(|s| {
            s.calls.push(Call::WaitContainer(id.to_string()));
            s.wait.clone()
        });
        match behavior {
            WaitBehavior::Exit(code) => Ok(code),
            WaitBehavior::Fail(message) => Err(RuntimeError::Daemon(message)),
            WaitBehavior::Hang => std::future::pending().await,
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.with(|s| s.calls.push(Call::StopContainer(id.to_string())));
        Ok(())
    }

    async fn container_logs(&self, id: &str) -> Result<Vec<u8>, RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::ContainerLogs(id.to_string()));
            if s.logs_fail {
                Err(RuntimeError::Daemon("log stream closed".to_string()))
            } else {
                Ok(s.logs.clone())
            }
        })
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::RemoveContainer(id.to_string()));
            if s.all_removals_fail || s.failing_removals.contains(id) {
                return Err(RuntimeError::Daemon(format!("removal of {} is already in progress", id)));
            }
            s.live_containers.retain(|c| c != id);
            s.created.retain(|c| c.id != id);
            Ok(())
        })
    }

    async fn list_created_containers(&self, _label: &str) -> Result<Vec<CreatedContainer>, RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::ListCreatedContainers);
            if s.listing_fails {
                Err(RuntimeError::Daemon("daemon unavailable".to_string()))
            } else {
                Ok(s.created.clone())
            }
        })
    }

    async fn remove_image(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::RemoveImage(name.to_string(), force));
            if s.image_removal_fails {
                return Err(RuntimeError::Daemon(format!("conflict: unable to remove {}", name)));
            }
            s.live_images.retain(|i| i != name);
            s.dangling.retain(|i| i != name);
            Ok(())
        })
    }

    async fn list_dangling_images(&self, _label: &str) -> Result<Vec<String>, RuntimeError> {
        self.with(|s| {
            s.calls.push(Call::ListDanglingImages);
            if s.listing_fails {
                Err(RuntimeError::Daemon("daemon unavailable".to_string()))
            } else {
                Ok(s.dangling.clone())
            }
        })
    }
}
