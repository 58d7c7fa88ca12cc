// src/lock/coordinator.rs

//! Connection to an external coordination service.
//!
//! The `Coordinator` is constructed explicitly, handed to whoever needs it,
//! and has an explicit `start()` / `stop()` lifecycle. When no service is
//! configured, or it cannot be reached at start, the coordinator runs in
//! `Degraded` mode and service-backed locks become best effort.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::CoordinationSection;
use crate::errors::{Result, RunqError};
use crate::model::new_id;

/// URL scheme selecting [`LocalCoordinationService`].
pub const LOCAL_SCHEME: &str = "memory://";

/// A lock handle obtained from a coordination service.
#[async_trait]
pub trait ServiceLock: Send + Sync + Debug {
    /// Returns whether the lock is now held by this handle. With `blocking`
    /// the call waits until it is.
    async fn acquire(&mut self, blocking: bool) -> Result<bool>;

    /// Returns whether this handle was holding the lock.
    async fn release(&mut self) -> Result<bool>;
}

#[async_trait]
pub trait CoordinationService: Send + Sync + Debug {
    /// Establish (or verify) the connection.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn get_lock(&self, name: &str) -> Box<dyn ServiceLock>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorMode {
    Stopped,
    Connected,
    /// No usable service; locks always succeed.
    Degraded,
}

#[derive(Debug)]
pub struct Coordinator {
    service: Option<Arc<dyn CoordinationService>>,
    mode: Mutex<CoordinatorMode>,
}

impl Coordinator {
    pub fn new(service: Option<Arc<dyn CoordinationService>>) -> Self {
        Self {
            service,
            mode: Mutex::new(CoordinatorMode::Stopped),
        }
    }

    /// Coordinator for `[coordination]`. A missing URL yields a coordinator
    /// that degrades on start.
    pub fn from_config(section: &CoordinationSection) -> Result<Self> {
        let service: Option<Arc<dyn CoordinationService>> = match section.url.as_deref() {
            None => None,
            Some(url) if url.starts_with(LOCAL_SCHEME) => {
                Some(Arc::new(LocalCoordinationService::new()))
            }
            Some(url) => {
                return Err(RunqError::Config(format!(
                    "unsupported coordination url '{url}'"
                )));
            }
        };
        Ok(Self::new(service))
    }

    fn mode_guard(&self) -> MutexGuard<'_, CoordinatorMode> {
        self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> CoordinatorMode {
        *self.mode_guard()
    }

    pub async fn start(&self) -> CoordinatorMode {
        let next = match &self.service {
            None => {
                warn!(
                    "coordination service is not configured; service locks are best effort \
                     and concurrency policies are not enforced across processes"
                );
                CoordinatorMode::Degraded
            }
            Some(service) => match service.connect().await {
                Ok(()) => {
                    info!("connected to coordination service");
                    CoordinatorMode::Connected
                }
                Err(err) => {
                    warn!(error = %err, "coordination service unreachable; running degraded");
                    CoordinatorMode::Degraded
                }
            },
        };

        *self.mode_guard() = next;
        next
    }

    pub async fn stop(&self) {
        let was = std::mem::replace(&mut *self.mode_guard(), CoordinatorMode::Stopped);
        if was == CoordinatorMode::Connected {
            if let Some(service) = &self.service {
                if let Err(err) = service.disconnect().await {
                    warn!(error = %err, "error while disconnecting from coordination service");
                }
            }
        }
        debug!(previous = ?was, "coordinator stopped");
    }

    /// The connected service, or `None` when degraded.
    pub(crate) fn service(&self) -> Result<Option<Arc<dyn CoordinationService>>> {
        match self.mode() {
            CoordinatorMode::Connected => Ok(self.service.clone()),
            CoordinatorMode::Degraded => Ok(None),
            CoordinatorMode::Stopped => Err(RunqError::Other(anyhow::anyhow!(
                "coordinator is not started"
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct LocalShared {
    /// lock name -> token of the handle holding it.
    holders: Mutex<HashMap<String, String>>,
    released: Notify,
}

impl LocalShared {
    fn holders(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process coordination service (`memory://`): exclusive named locks
/// shared by every handle obtained from the same service.
#[derive(Debug, Clone, Default)]
pub struct LocalCoordinationService {
    shared: Arc<LocalShared>,
}

impl LocalCoordinationService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationService for LocalCoordinationService {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.holders().clear();
        self.shared.released.notify_waiters();
        Ok(())
    }

    fn get_lock(&self, name: &str) -> Box<dyn ServiceLock> {
        Box::new(LocalServiceLock {
            shared: self.shared.clone(),
            name: name.to_string(),
            token: new_id(),
        })
    }
}

#[derive(Debug)]
struct LocalServiceLock {
    shared: Arc<LocalShared>,
    name: String,
    token: String,
}

impl LocalServiceLock {
    fn try_take(&self) -> bool {
        let mut holders = self.shared.holders();
        match holders.get(&self.name) {
            Some(holder) => *holder == self.token,
            None => {
                holders.insert(self.name.clone(), self.token.clone());
                true
            }
        }
    }
}

#[async_trait]
impl ServiceLock for LocalServiceLock {
    async fn acquire(&mut self, blocking: bool) -> Result<bool> {
        loop {
            // Registered before the check so a release in between still wakes us.
            let released = self.shared.released.notified();
            if self.try_take() {
                return Ok(true);
            }
            if !blocking {
                return Ok(false);
            }
            released.await;
        }
    }

    async fn release(&mut self) -> Result<bool> {
        let removed = {
            let mut holders = self.shared.holders();
            if holders.get(&self.name) == Some(&self.token) {
                holders.remove(&self.name);
                true
            } else {
                false
            }
        };
        if removed {
            self.shared.released.notify_waiters();
        }
        Ok(removed)
    }
}
