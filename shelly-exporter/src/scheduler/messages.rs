//! Commands accepted by the scheduler task.

use tokio::sync::oneshot;

use super::state::TargetSnapshot;
use crate::config::TargetDescriptor;

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Register a target at runtime. Replies `false` when the name or address
    /// is already known.
    AddTarget {
        target: TargetDescriptor,
        reply: oneshot::Sender<bool>,
    },
    /// Replies `false` when no target has that name.
    RemoveTarget {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    HasTarget {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    /// Matches on the normalized address.
    HasAddress {
        address: String,
        reply: oneshot::Sender<bool>,
    },
    /// Copy of every target's state, sorted by name.
    Snapshot(oneshot::Sender<Vec<TargetSnapshot>>),
}
