use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::messages::SchedulerCommand;
use super::state::TargetSnapshot;
use crate::config::TargetDescriptor;
use crate::discovery::TargetRegistrar;
use crate::{Error, Result};

/// Cloneable handle to the scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::ChannelClosed("scheduler"))?;
        rx.await.map_err(|_| Error::ChannelClosed("scheduler"))
    }

    /// Add a target unless its name or address is already registered.
    pub async fn add_target(&self, target: TargetDescriptor) -> Result<bool> {
        self.request(|reply| SchedulerCommand::AddTarget { target, reply })
            .await
    }

    pub async fn remove_target(&self, name: impl Into<String>) -> Result<bool> {
        let name = name.into();
        self.request(|reply| SchedulerCommand::RemoveTarget { name, reply })
            .await
    }

    pub async fn has_target(&self, name: impl Into<String>) -> Result<bool> {
        let name = name.into();
        self.request(|reply| SchedulerCommand::HasTarget { name, reply })
            .await
    }

    pub async fn has_address(&self, address: impl Into<String>) -> Result<bool> {
        let address = address.into();
        self.request(|reply| SchedulerCommand::HasAddress { address, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<Vec<TargetSnapshot>> {
        self.request(SchedulerCommand::Snapshot).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl TargetRegistrar for SchedulerHandle {
    async fn register(&self, target: TargetDescriptor) -> bool {
        let name = target.name.clone();
        match self.add_target(target).await {
            Ok(added) => added,
            Err(e) => {
                warn!(device = %name, error = %e, "Cannot register discovered target");
                false
            }
        }
    }
}
