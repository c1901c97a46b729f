// State nodes

use std::fmt;

use crate::context::FlowContext;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Disabled,
    Entering,
    Running,
    Exiting,
}

/// What a running node wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Stay,
    Next,
    /// Branch to a specific node.
    To(NodeId),
    Finish,
}

/// Timing constraints the driver enforces around a node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeTiming {
    pub entry_delay: f32,
    /// The successor never activates earlier than this after entering.
    pub min_duration: f32,
}

impl NodeTiming {
    pub fn new(entry_delay: f32, min_duration: f32) -> Self {
        Self {
            entry_delay,
            min_duration,
        }
    }
}

/// One step of an experience.
///
/// `enter` must reset every piece of node-local state: graphs may revisit a
/// node. Bus subscriptions made through the context are dropped by the
/// driver as soon as the node starts exiting.
pub trait StateNode: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn timing(&self) -> NodeTiming {
        NodeTiming::default()
    }

    fn enter(&mut self, _ctx: &mut FlowContext<'_>) {}

    fn tick(&mut self, ctx: &mut FlowContext<'_>, dt: f32) -> Advance;

    /// Teardown run after the exit condition fired. The successor activates
    /// once the returned task is ready.
    fn exit(&mut self, _ctx: &mut FlowContext<'_>) -> Task {
        Task::new()
    }
}
