// Reusable steps that experiences are assembled from.

use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use bevy::log::{debug, info, warn};
use parking_lot::Mutex;

use crate::bus::Signal;
use crate::context::FlowContext;
use crate::flags::keys;
use crate::levels::LevelId;
use crate::node::{Advance, NodeId, StateNode};
use crate::services::Condition;
use crate::task::{Completion, Task};
use crate::transition::{TransitionHandle, Tween};

/// Surface showing the level title over a black backdrop.
pub const TITLE_CARD: &str = "title_card";

/// Played the first time a level badge unlocks.
pub const BADGE_SOUND: &str = "badge_unlocked";

/// Fades the title card in, holds it, and fades it out while exiting.
pub struct TitleCard {
    hold: f32,
    shown: Completion,
}

impl TitleCard {
    pub fn new(hold: f32) -> Self {
        Self {
            hold,
            shown: Completion::completed(),
        }
    }

    fn handle() -> TransitionHandle {
        TransitionHandle::opacity(TITLE_CARD)
    }
}

impl StateNode for TitleCard {
    fn name(&self) -> &str {
        "title_card"
    }

    fn enter(&mut self, ctx: &mut FlowContext<'_>) {
        let tween = Tween::fade_in(ctx.config().title_fade_secs).with_easing(ctx.config().easing);
        self.shown = ctx.fade(Self::handle(), tween);
    }

    fn tick(&mut self, ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
        if self.shown.is_finished() && ctx.elapsed() >= ctx.config().title_fade_secs + self.hold {
            Advance::Next
        } else {
            Advance::Stay
        }
    }

    fn exit(&mut self, ctx: &mut FlowContext<'_>) -> Task {
        let tween = Tween::fade_out(ctx.config().title_fade_secs).with_easing(ctx.config().easing);
        Task::new().then_await(move |ctx| ctx.fade(Self::handle(), tween))
    }
}

/// Runs for a fixed time, then moves on.
pub struct Timed {
    name: &'static str,
    secs: f32,
}

impl Timed {
    pub fn new(name: &'static str, secs: f32) -> Self {
        Self { name, secs }
    }
}

impl StateNode for Timed {
    fn name(&self) -> &str {
        self.name
    }

    fn tick(&mut self, ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
        if ctx.elapsed() >= self.secs {
            Advance::Next
        } else {
            Advance::Stay
        }
    }
}

type Route<A> = Arc<dyn Fn(&A) -> Option<NodeId> + Send + Sync>;

/// Waits for signal `S` and branches to whichever node `route` picks for its
/// payload. Payloads the route rejects are ignored; the first accepted one wins.
pub struct Choice<S: Signal> {
    name: &'static str,
    route: Route<S::Args>,
    picked: Arc<Mutex<Option<NodeId>>>,
    _signal: PhantomData<fn() -> S>,
}

impl<S: Signal> Choice<S> {
    pub fn new(
        name: &'static str,
        route: impl Fn(&S::Args) -> Option<NodeId> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            route: Arc::new(route),
            picked: Arc::new(Mutex::new(None)),
            _signal: PhantomData,
        }
    }
}

impl<S: Signal> StateNode for Choice<S> {
    fn name(&self) -> &str {
        self.name
    }

    fn enter(&mut self, ctx: &mut FlowContext<'_>) {
        *self.picked.lock() = None;
        let route = self.route.clone();
        let picked = self.picked.clone();
        ctx.subscribe::<S>(move |args| {
            if let Some(id) = route(args) {
                picked.lock().get_or_insert(id);
            }
        });
    }

    fn tick(&mut self, _ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
        match self.picked.lock().take() {
            Some(id) => {
                debug!("`{}` picked {id}", self.name);
                Advance::To(id)
            }
            None => Advance::Stay,
        }
    }
}

/// Polls a condition from the scene's services until it holds. The
/// condition is resolved on every entry; when it is missing the step waits
/// forever.
pub struct AwaitCondition<C: ?Sized + Condition + 'static> {
    name: &'static str,
    condition: Option<Arc<C>>,
    milestone: Option<&'static str>,
}

impl<C: ?Sized + Condition + 'static> AwaitCondition<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            condition: None,
            milestone: None,
        }
    }

    /// Sets the milestone flag once the condition has held.
    pub fn with_milestone(mut self, milestone: &'static str) -> Self {
        self.milestone = Some(milestone);
        self
    }
}

impl<C: ?Sized + Condition + 'static> StateNode for AwaitCondition<C> {
    fn name(&self) -> &str {
        self.name
    }

    fn enter(&mut self, ctx: &mut FlowContext<'_>) {
        self.condition = ctx.get::<C>();
    }

    fn tick(&mut self, _ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
        match &self.condition {
            Some(condition) if condition.is_true() => Advance::Next,
            _ => Advance::Stay,
        }
    }

    fn exit(&mut self, ctx: &mut FlowContext<'_>) -> Task {
        if let Some(milestone) = self.milestone {
            info!("milestone `{milestone}` reached");
            ctx.flags_mut().set_bool(keys::milestone(milestone), true);
        }
        self.condition = None;
        Task::new()
    }
}

/// Leaves the current level for `target`, optionally unlocking a badge for
/// the level being completed.
pub struct LevelExit {
    target: LevelId,
    badge: Option<LevelId>,
    fade: bool,
}

impl LevelExit {
    pub fn to(target: LevelId) -> Self {
        Self {
            target,
            badge: None,
            fade: true,
        }
    }

    pub fn with_badge(mut self, level: LevelId) -> Self {
        self.badge = Some(level);
        self
    }

    pub fn without_fade(mut self) -> Self {
        self.fade = false;
        self
    }
}

impl StateNode for LevelExit {
    fn name(&self) -> &str {
        "level_exit"
    }

    fn tick(&mut self, _ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
        Advance::Finish
    }

    fn exit(&mut self, _ctx: &mut FlowContext<'_>) -> Task {
        let (target, badge, fade) = (self.target, self.badge, self.fade);
        Task::new().then(move |ctx| {
            if let Some(level) = badge {
                unlock_badge(ctx, level);
            }
            ctx.load_level(target, fade);
        })
    }
}

fn unlock_badge(ctx: &mut FlowContext<'_>, level: LevelId) {
    let unlocked = keys::badge_unlocked(level);
    if ctx.flags().get_bool(&unlocked) {
        return;
    }
    info!("badge unlocked for {level}");
    let flags = ctx.flags_mut();
    flags.set_bool(unlocked, true);
    flags.set_bool(keys::badge_notified(level), false);
    ctx.play_sound(BADGE_SOUND);
}

/// Loads the last level played, or `fallback` when nothing resumable was
/// recorded.
pub struct ResumeLevel {
    fallback: LevelId,
}

impl ResumeLevel {
    pub fn new(fallback: LevelId) -> Self {
        Self { fallback }
    }

    fn resolve(&self, ctx: &FlowContext<'_>) -> LevelId {
        let Some(name) = ctx.flags().get_string(keys::LAST_LEVEL_PLAYED) else {
            return self.fallback;
        };
        match LevelId::from_str(name) {
            Ok(level) if level.is_resumable() => level,
            Ok(_) => self.fallback,
            Err(_) => {
                warn!("unknown last level `{name}`, starting at {}", self.fallback);
                self.fallback
            }
        }
    }
}

impl StateNode for ResumeLevel {
    fn name(&self) -> &str {
        "resume_level"
    }

    fn tick(&mut self, _ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
        Advance::Finish
    }

    fn exit(&mut self, ctx: &mut FlowContext<'_>) -> Task {
        let level = self.resolve(ctx);
        Task::new().then(move |ctx| ctx.load_level(level, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::context::Runtime;
    use crate::flags::FlagStore;
    use crate::flow::FlowGraph;
    use crate::node::NodeState;
    use crate::registry::ServiceRegistry;
    use crate::services::{SoundPlayer, SoundQueue, Switch};

    struct Pick;
    impl Signal for Pick {
        type Args = u8;
    }

    struct Rig {
        runtime: Runtime,
        services: ServiceRegistry,
        graph: FlowGraph,
    }

    impl Rig {
        fn new(graph: FlowGraph) -> Self {
            let config = FlowConfig {
                screen_fade_secs: 0.5,
                title_fade_secs: 0.4,
                ..FlowConfig::default()
            };
            Self {
                runtime: Runtime::new(config, FlagStore::in_memory()),
                services: ServiceRegistry::new(),
                graph,
            }
        }

        fn start(&mut self) {
            self.graph.start(&mut self.runtime, &self.services);
        }

        fn step(&mut self, dt: f32) {
            self.runtime.advance(dt);
            self.graph.tick(&mut self.runtime, &self.services, dt);
        }
    }

    #[test]
    fn title_card_fades_in_holds_and_fades_out() {
        let mut graph = FlowGraph::new("card");
        let card = graph.add(TitleCard::new(1.0));
        let after = graph.add(Timed::new("after", 100.0));
        graph.link(card, after);
        let mut rig = Rig::new(graph);
        rig.start();

        let handle = TransitionHandle::opacity(TITLE_CARD);
        for _ in 0..6 {
            rig.step(0.1);
        }
        assert_eq!(rig.runtime.transitions().value(handle), Some(1.0));
        assert_eq!(rig.graph.state_of(card), NodeState::Running);

        for _ in 0..30 {
            rig.step(0.1);
        }
        assert_eq!(rig.graph.state_of(after), NodeState::Running);
        let surface = rig.runtime.transitions().surface(TITLE_CARD).expect("card surface");
        assert!(!surface.visible);
    }

    #[test]
    fn timed_moves_on_after_its_duration() {
        let mut graph = FlowGraph::new("timed");
        let wait = graph.add(Timed::new("wait", 1.0));
        let mut rig = Rig::new(graph);
        rig.start();

        for _ in 0..9 {
            rig.step(0.1);
        }
        assert_eq!(rig.graph.state_of(wait), NodeState::Running);
        for _ in 0..3 {
            rig.step(0.1);
        }
        assert!(rig.graph.is_finished());
    }

    #[test]
    fn choice_follows_the_first_routed_signal() {
        let mut graph = FlowGraph::new("choice");
        let left = graph.add(Timed::new("left", 100.0));
        let right = graph.add(Timed::new("right", 100.0));
        let choice = graph.add(Choice::<Pick>::new("choose", move |pick| match pick {
            0 => Some(left),
            1 => Some(right),
            _ => None,
        }));
        graph.set_start(choice);
        let mut rig = Rig::new(graph);
        rig.start();

        rig.runtime.bus().publish::<Pick>(7);
        rig.step(0.1);
        assert_eq!(rig.graph.state_of(choice), NodeState::Running);

        rig.runtime.bus().publish::<Pick>(1);
        rig.runtime.bus().publish::<Pick>(0);
        rig.step(0.1);
        assert_eq!(rig.runtime.bus().subscriber_count::<Pick>(), 0);
        rig.step(0.1);
        assert_eq!(rig.graph.state_of(right), NodeState::Running);
        assert_eq!(rig.graph.visits(left), 0);
    }

    struct Door(Switch);
    impl Condition for Door {
        fn is_true(&self) -> bool {
            self.0.is_on()
        }
    }

    #[test]
    fn await_condition_records_its_milestone() {
        let mut graph = FlowGraph::new("door");
        graph.add(AwaitCondition::<Door>::new("door").with_milestone("door_opened"));
        let mut rig = Rig::new(graph);
        let switch = Switch::new();
        rig.services.register(Arc::new(Door(switch.clone())));
        rig.start();

        rig.step(0.1);
        rig.step(0.1);
        assert!(!rig.graph.is_finished());

        switch.set(true);
        rig.step(0.1);
        rig.step(0.1);
        assert!(rig.graph.is_finished());
        assert!(rig.runtime.flags().get_bool(&keys::milestone("door_opened")));
    }

    #[test]
    fn await_condition_without_a_provider_waits() {
        let mut graph = FlowGraph::new("door");
        graph.add(AwaitCondition::<dyn Condition>::new("door"));
        let mut rig = Rig::new(graph);
        rig.start();
        for _ in 0..10 {
            rig.step(0.1);
        }
        assert!(!rig.graph.is_finished());
    }

    #[test]
    fn level_exit_unlocks_the_badge_once() {
        let queue = SoundQueue::new();
        let mut rig = Rig::new(FlowGraph::new("unused"));
        rig.services.register::<dyn SoundPlayer>(Arc::new(queue.clone()));

        let unlocked = keys::badge_unlocked(LevelId::Prologue);
        for _ in 0..2 {
            let mut graph = FlowGraph::new("exit");
            let exit = graph.add(LevelExit::to(LevelId::Awaken).with_badge(LevelId::Prologue));
            rig.graph = graph;
            rig.start();

            // Deciding to leave writes nothing; the exit sequence does.
            let was_unlocked = rig.runtime.flags().get_bool(&unlocked);
            rig.step(0.1);
            assert_eq!(rig.graph.state_of(exit), NodeState::Exiting);
            assert_eq!(rig.runtime.flags().get_bool(&unlocked), was_unlocked);

            rig.step(0.1);
            assert!(rig.graph.is_finished());
            assert!(rig.runtime.flags().get_bool(&unlocked));
        }

        let flags = rig.runtime.flags();
        assert!(!flags.get_bool(&keys::badge_notified(LevelId::Prologue)));
        assert_eq!(queue.drain(), vec![BADGE_SOUND]);

        assert!(!rig.runtime.levels().has_pending());
        for _ in 0..6 {
            rig.step(0.1);
        }
        assert_eq!(rig.runtime.levels().take_pending(), Some(LevelId::Awaken));
    }

    #[test]
    fn resume_falls_back_without_a_resumable_level() {
        fn resume(rig: &mut Rig) -> Option<LevelId> {
            let mut graph = FlowGraph::new("resume");
            graph.add(ResumeLevel::new(LevelId::Prologue));
            rig.graph = graph;
            rig.start();
            for _ in 0..8 {
                rig.step(0.1);
            }
            rig.runtime.levels().take_pending()
        }

        let mut rig = Rig::new(FlowGraph::new("unused"));

        assert_eq!(resume(&mut rig), Some(LevelId::Prologue));

        rig.runtime
            .flags_mut()
            .set_string(keys::LAST_LEVEL_PLAYED, LevelId::Menu.to_string());
        assert_eq!(resume(&mut rig), Some(LevelId::Prologue));

        rig.runtime
            .flags_mut()
            .set_string(keys::LAST_LEVEL_PLAYED, LevelId::Awaken.to_string());
        assert_eq!(resume(&mut rig), Some(LevelId::Awaken));
    }
}
