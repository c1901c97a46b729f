// Flow graph and its driver

use bevy::log::{debug, info, warn};

use crate::context::{FlowContext, NodeScope, Runtime};
use crate::error::FlowError;
use crate::node::{Advance, NodeId, NodeState, StateNode};
use crate::registry::ServiceRegistry;
use crate::task::{Task, TaskPoll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Node(NodeId),
    Finish,
}

enum Phase {
    Entering,
    Running,
    Exiting {
        target: Target,
        settle_until: f64,
        task: Option<Task>,
    },
}

struct Active {
    id: NodeId,
    scope: NodeScope,
    phase: Phase,
    stall_reported: bool,
}

struct Slot {
    node: Box<dyn StateNode>,
    successor: Option<NodeId>,
    visits: u32,
}

/// Nodes plus the driver. At most one node is active at a time.
pub struct FlowGraph {
    name: String,
    slots: Vec<Slot>,
    start: Option<NodeId>,
    active: Option<Active>,
    finished: bool,
}

impl FlowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            start: None,
            active: None,
            finished: false,
        }
    }

    /// Adds a node. The first node added is the start node unless
    /// [`FlowGraph::set_start`] says otherwise.
    pub fn add(&mut self, node: impl StateNode) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            node: Box::new(node),
            successor: None,
            visits: 0,
        });
        self.start.get_or_insert(id);
        id
    }

    /// Sets the successor `Advance::Next` moves to.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        if to.0 >= self.slots.len() {
            warn!("flow `{}`: ignoring link {from} -> {to}, no such node", self.name);
            return self;
        }
        if let Some(slot) = self.slots.get_mut(from.0) {
            slot.successor = Some(to);
        }
        self
    }

    /// Links each node to the one after it.
    pub fn chain(&mut self, ids: &[NodeId]) -> &mut Self {
        for pair in ids.windows(2) {
            self.link(pair[0], pair[1]);
        }
        self
    }

    pub fn set_start(&mut self, id: NodeId) -> &mut Self {
        self.start = Some(id);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.slots.get(id.0).map(|slot| slot.node.name())
    }

    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|slot| slot.successor)
    }

    /// The active node, whether running or exiting.
    pub fn current(&self) -> Option<NodeId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn state_of(&self, id: NodeId) -> NodeState {
        match &self.active {
            Some(active) if active.id == id => match active.phase {
                Phase::Entering => NodeState::Entering,
                Phase::Running => NodeState::Running,
                Phase::Exiting { .. } => NodeState::Exiting,
            },
            _ => NodeState::Disabled,
        }
    }

    pub fn running_count(&self) -> usize {
        self.active
            .iter()
            .filter(|active| matches!(active.phase, Phase::Running))
            .count()
    }

    /// How many times `id` has entered.
    pub fn visits(&self, id: NodeId) -> u32 {
        self.slots.get(id.0).map_or(0, |slot| slot.visits)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Activates the start node, halting whatever was active before.
    pub fn start(&mut self, runtime: &mut Runtime, services: &ServiceRegistry) {
        self.halt(runtime);
        self.finished = false;
        match self.start {
            Some(id) if id.0 < self.slots.len() => self.activate(id, runtime, services),
            _ => {
                warn!("flow `{}` has no start node", self.name);
                self.finished = true;
            }
        }
    }

    /// One scheduler step. Call after `runtime.advance(dt)`.
    pub fn tick(&mut self, runtime: &mut Runtime, services: &ServiceRegistry, dt: f32) {
        let running = match self.active.as_ref().map(|active| &active.phase) {
            Some(Phase::Running) => true,
            Some(Phase::Exiting { .. }) => false,
            Some(Phase::Entering) | None => return,
        };
        let exit_started = if running {
            if !self.tick_running(runtime, services, dt) {
                return;
            }
            true
        } else {
            false
        };
        self.tick_exiting(runtime, services, dt, exit_started);
    }

    /// Stops the active node without activating a successor: pending exit
    /// tasks are cancelled and its subscriptions dropped.
    pub fn halt(&mut self, runtime: &mut Runtime) {
        if let Some(mut active) = self.active.take() {
            if let Phase::Exiting { task: Some(task), .. } = &active.phase {
                task.cancel();
            }
            active.scope.release(runtime.bus());
            debug!(
                "flow `{}`: halted at `{}`",
                self.name,
                self.slots[active.id.0].node.name()
            );
        }
    }

    /// Returns `true` when the node asked to leave and is now exiting.
    fn tick_running(&mut self, runtime: &mut Runtime, services: &ServiceRegistry, dt: f32) -> bool {
        let node_count = self.slots.len();
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let slot = &mut self.slots[active.id.0];
        let timing = slot.node.timing();
        let elapsed = runtime.now() - active.scope.entered_at;
        if elapsed < f64::from(timing.entry_delay) {
            return false;
        }

        let advance = {
            let mut ctx = FlowContext::new(runtime, services, &mut active.scope);
            slot.node.tick(&mut ctx, dt)
        };

        let target = match advance {
            Advance::Stay => {
                if let Some(limit) = runtime.config().stall_warning_secs {
                    if !active.stall_reported && elapsed >= f64::from(limit) {
                        active.stall_reported = true;
                        warn!(
                            "{}",
                            FlowError::UnreachableState {
                                node: slot.node.name().to_owned(),
                                elapsed,
                            }
                        );
                    }
                }
                return false;
            }
            Advance::Next => match slot.successor {
                None => Target::Finish,
                Some(id) if id.0 < node_count => Target::Node(id),
                Some(id) => {
                    warn!(
                        "flow `{}`: `{}` links to unknown node {id}",
                        self.name,
                        slot.node.name()
                    );
                    return false;
                }
            },
            Advance::To(id) if id.0 < node_count => Target::Node(id),
            Advance::To(id) => {
                warn!(
                    "flow `{}`: `{}` branched to unknown node {id}",
                    self.name,
                    slot.node.name()
                );
                return false;
            }
            Advance::Finish => Target::Finish,
        };

        active.scope.release(runtime.bus());
        debug!(
            "flow `{}`: `{}` exiting toward {target:?}",
            self.name,
            slot.node.name()
        );
        active.phase = Phase::Exiting {
            target,
            settle_until: active.scope.entered_at + f64::from(timing.min_duration),
            task: None,
        };
        true
    }

    fn tick_exiting(
        &mut self,
        runtime: &mut Runtime,
        services: &ServiceRegistry,
        dt: f32,
        exit_started: bool,
    ) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let slot = &mut self.slots[active.id.0];
        let Phase::Exiting {
            target,
            settle_until,
            task,
        } = &mut active.phase
        else {
            return;
        };
        if runtime.now() < *settle_until {
            return;
        }

        let running = match task {
            Some(running) => running,
            None => {
                // Creating the task is a suspension point: it is first polled
                // on the next tick, so the successor never enters on this one.
                let mut ctx = FlowContext::new(runtime, services, &mut active.scope);
                *task = Some(slot.node.exit(&mut ctx));
                return;
            }
        };
        if exit_started {
            return;
        }

        let outcome = {
            let mut ctx = FlowContext::new(runtime, services, &mut active.scope);
            running.poll(&mut ctx, dt)
        };
        match outcome {
            TaskPoll::Pending => {}
            TaskPoll::Ready => {
                let target = *target;
                self.handoff(target, runtime, services);
            }
            TaskPoll::Cancelled => {
                warn!(
                    "flow `{}`: exit of `{}` was cancelled; flow stalls",
                    self.name,
                    slot.node.name()
                );
                self.halt(runtime);
            }
        }
    }

    fn handoff(&mut self, target: Target, runtime: &mut Runtime, services: &ServiceRegistry) {
        if let Some(mut previous) = self.active.take() {
            previous.scope.release(runtime.bus());
            debug!(
                "flow `{}`: `{}` exited",
                self.name,
                self.slots[previous.id.0].node.name()
            );
        }
        match target {
            Target::Node(id) => self.activate(id, runtime, services),
            Target::Finish => {
                self.finished = true;
                info!("flow `{}` finished", self.name);
            }
        }
    }

    fn activate(&mut self, id: NodeId, runtime: &mut Runtime, services: &ServiceRegistry) {
        let slot = &mut self.slots[id.0];
        slot.visits += 1;
        debug!(
            "flow `{}`: entering `{}` (visit {})",
            self.name,
            slot.node.name(),
            slot.visits
        );
        let active = self.active.insert(Active {
            id,
            scope: NodeScope::new(runtime.now()),
            phase: Phase::Entering,
            stall_reported: false,
        });
        {
            let mut ctx = FlowContext::new(runtime, services, &mut active.scope);
            slot.node.enter(&mut ctx);
        }
        active.phase = Phase::Running;
    }
}
