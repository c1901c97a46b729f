// Runtime and the per-node context

use std::sync::Arc;

use crate::bus::{EventBus, Signal, Subscription};
use crate::config::FlowConfig;
use crate::flags::FlagStore;
use crate::levels::{LevelId, LevelSwitcher, SCREEN_FADER};
use crate::registry::ServiceRegistry;
use crate::services::SoundPlayer;
use crate::steps::TITLE_CARD;
use crate::task::Completion;
use crate::transition::{OPACITY, Surface, TransitionEngine, TransitionHandle, Tween};

/// Everything that outlives a single scene.
pub struct Runtime {
    config: FlowConfig,
    bus: EventBus,
    transitions: TransitionEngine,
    flags: FlagStore,
    levels: LevelSwitcher,
    now: f64,
}

impl Runtime {
    pub fn new(config: FlowConfig, flags: FlagStore) -> Self {
        let mut transitions = TransitionEngine::new();
        transitions.attach(SCREEN_FADER, Surface::hidden_at(0.0).with_value(OPACITY, 0.0));
        transitions.attach(TITLE_CARD, Surface::hidden_at(0.0).with_value(OPACITY, 0.0));
        let levels = LevelSwitcher::new(config.screen_fade_secs, config.easing);
        Self {
            config,
            bus: EventBus::new(),
            transitions,
            flags,
            levels,
            now: 0.0,
        }
    }

    /// Moves the clock and every transition forward.
    pub fn advance(&mut self, dt: f32) {
        self.now += f64::from(dt);
        self.transitions.advance(dt);
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn transitions(&self) -> &TransitionEngine {
        &self.transitions
    }

    pub fn transitions_mut(&mut self) -> &mut TransitionEngine {
        &mut self.transitions
    }

    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagStore {
        &mut self.flags
    }

    pub fn levels(&self) -> &LevelSwitcher {
        &self.levels
    }

    pub fn load_level(&mut self, level: LevelId, fade_out_first: bool) {
        self.levels.load(&mut self.transitions, level, fade_out_first);
    }

    /// Fades the screen back in after a level load.
    pub fn reveal(&mut self) {
        self.levels.reveal(&mut self.transitions);
    }
}

/// Driver-owned bookkeeping for the active node.
#[derive(Debug, Default)]
pub(crate) struct NodeScope {
    pub(crate) entered_at: f64,
    pub(crate) subscriptions: Vec<Subscription>,
}

impl NodeScope {
    pub(crate) fn new(entered_at: f64) -> Self {
        Self {
            entered_at,
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn release(&mut self, bus: &EventBus) {
        for subscription in self.subscriptions.drain(..) {
            bus.unsubscribe(subscription);
        }
    }
}

/// What a node sees while entering, ticking and exiting.
pub struct FlowContext<'a> {
    runtime: &'a mut Runtime,
    services: &'a ServiceRegistry,
    scope: &'a mut NodeScope,
}

impl<'a> FlowContext<'a> {
    pub(crate) fn new(
        runtime: &'a mut Runtime,
        services: &'a ServiceRegistry,
        scope: &'a mut NodeScope,
    ) -> Self {
        Self {
            runtime,
            services,
            scope,
        }
    }

    pub fn now(&self) -> f64 {
        self.runtime.now
    }

    /// Seconds since the current node entered.
    pub fn elapsed(&self) -> f32 {
        (self.runtime.now - self.scope.entered_at) as f32
    }

    pub fn config(&self) -> &FlowConfig {
        &self.runtime.config
    }

    pub fn services(&self) -> &ServiceRegistry {
        self.services
    }

    /// Resolves a capability, warning when it is missing.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.get::<T>()
    }

    pub fn bus(&self) -> &EventBus {
        &self.runtime.bus
    }

    /// Subscribes for as long as the current node is running.
    pub fn subscribe<S: Signal>(
        &mut self,
        handler: impl Fn(&S::Args) + Send + Sync + 'static,
    ) -> Subscription {
        let subscription = self.runtime.bus.subscribe::<S>(handler);
        self.scope.subscriptions.push(subscription);
        subscription
    }

    pub fn publish<S: Signal>(&self, args: S::Args) -> usize {
        self.runtime.bus.publish::<S>(args)
    }

    pub fn transitions(&mut self) -> &mut TransitionEngine {
        &mut self.runtime.transitions
    }

    pub fn fade(&mut self, handle: TransitionHandle, tween: Tween) -> Completion {
        self.runtime.transitions.run(handle, tween, None)
    }

    pub fn flags(&self) -> &FlagStore {
        &self.runtime.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagStore {
        &mut self.runtime.flags
    }

    pub fn load_level(&mut self, level: LevelId, fade_out_first: bool) {
        self.runtime.load_level(level, fade_out_first);
    }

    /// Plays a named sound through the scene's `SoundPlayer`, if any.
    pub fn play_sound(&self, name: &str) -> bool {
        match self.services.get::<dyn SoundPlayer>() {
            Some(player) => {
                player.play(name);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::task::{Task, TaskPoll};

    /// A runtime plus an empty scene, for driving contexts by hand.
    pub(crate) struct Harness {
        pub(crate) runtime: Runtime,
        pub(crate) services: ServiceRegistry,
        pub(crate) scope: NodeScope,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let config = FlowConfig {
                screen_fade_secs: 0.5,
                ..FlowConfig::default()
            };
            Self {
                runtime: Runtime::new(config, FlagStore::in_memory()),
                services: ServiceRegistry::new(),
                scope: NodeScope::new(0.0),
            }
        }

        pub(crate) fn ctx(&mut self) -> FlowContext<'_> {
            FlowContext::new(&mut self.runtime, &self.services, &mut self.scope)
        }

        pub(crate) fn poll(&mut self, task: &mut Task, dt: f32) -> TaskPoll {
            self.runtime.advance(dt);
            let mut ctx = self.ctx();
            task.poll(&mut ctx, dt)
        }
    }

    struct Tick;
    impl Signal for Tick {
        type Args = ();
    }

    #[test]
    fn scoped_subscriptions_are_released_together() {
        let mut harness = Harness::new();
        {
            let mut ctx = harness.ctx();
            ctx.subscribe::<Tick>(|_| {});
            ctx.subscribe::<Tick>(|_| {});
        }
        assert_eq!(harness.runtime.bus().subscriber_count::<Tick>(), 2);

        harness.scope.release(harness.runtime.bus());
        assert_eq!(harness.runtime.bus().subscriber_count::<Tick>(), 0);
        assert!(harness.scope.subscriptions.is_empty());
    }

    #[test]
    fn elapsed_is_relative_to_node_entry() {
        let mut harness = Harness::new();
        harness.runtime.advance(2.0);
        harness.scope = NodeScope::new(harness.runtime.now());
        harness.runtime.advance(0.5);
        assert!((harness.ctx().elapsed() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn play_sound_without_a_player_degrades() {
        let mut harness = Harness::new();
        assert!(!harness.ctx().play_sound("chime"));
    }

    #[test]
    fn runtime_starts_with_a_hidden_screen_fader() {
        let harness = Harness::new();
        let fader = harness
            .runtime
            .transitions()
            .surface(SCREEN_FADER)
            .expect("fader attached");
        assert!(!fader.visible);
        assert_eq!(fader.opacity(), 0.0);
    }
}
