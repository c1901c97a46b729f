// Director: owns the runtime and the loaded scene, and plugs both into Bevy.

use std::sync::Arc;

use bevy::prelude::*;
use bevy::state::app::StatesPlugin;

use crate::config::FlowConfig;
use crate::context::Runtime;
use crate::error::FlowResult;
use crate::flags::{FlagStore, JsonFileBackend, keys};
use crate::levels::{LevelCatalog, LevelId, SCREEN_FADER, Scene};
use crate::registry::ServiceRegistry;
use crate::services::{SoundPlayer, SoundQueue, play_queued_sounds};

/// The flow substrate as one Bevy resource.
#[derive(Resource)]
pub struct Director {
    runtime: Runtime,
    catalog: LevelCatalog,
    scene: Option<Scene>,
}

impl Director {
    /// Opens the flag store named in `config`, or keeps flags in memory.
    pub fn new(config: FlowConfig, catalog: LevelCatalog) -> Self {
        let flags = match &config.flags_path {
            Some(path) => FlagStore::open_or_empty(JsonFileBackend::new(path)),
            None => FlagStore::in_memory(),
        };
        Self::with_flags(config, flags, catalog)
    }

    pub fn with_flags(config: FlowConfig, flags: FlagStore, catalog: LevelCatalog) -> Self {
        Self {
            runtime: Runtime::new(config, flags),
            catalog,
            scene: None,
        }
    }

    /// Loads the configured start level.
    pub fn start(&mut self) -> FlowResult<()> {
        let level = self.runtime.config().start_level;
        self.load_level(level)
    }

    /// Replaces the current scene with `level`. An unknown level is an error
    /// and leaves the current scene running.
    pub fn load_level(&mut self, level: LevelId) -> FlowResult<()> {
        let mut scene = self.catalog.build(level)?;
        self.unload();

        if level.is_resumable() {
            self.runtime
                .flags_mut()
                .set_string(keys::LAST_LEVEL_PLAYED, level.to_string());
        }
        info!("loading level {level}");
        let services = scene.services.populate();
        scene.graph.start(&mut self.runtime, services);
        self.runtime.reveal();
        self.scene = Some(scene);
        Ok(())
    }

    /// Tears the current scene down: pending exit work is cancelled, node
    /// subscriptions are dropped, services cleared and flags checkpointed.
    pub fn unload(&mut self) {
        let Some(mut scene) = self.scene.take() else {
            return;
        };
        scene.graph.halt(&mut self.runtime);
        scene.services.unload();
        if let Err(err) = self.runtime.flags_mut().flush() {
            warn!("could not save flags: {err}");
        }
        debug!("unloaded level {}", scene.level);
    }

    /// One frame: time, transitions, the active node, then any level switch
    /// that became due. Returns the level that was loaded, if any.
    pub fn tick(&mut self, dt: f32) -> Option<LevelId> {
        self.runtime.advance(dt);
        if let Some(scene) = self.scene.as_mut() {
            scene.graph.tick(&mut self.runtime, scene.services.registry(), dt);
        }

        let level = self.runtime.levels().take_pending()?;
        match self.load_level(level) {
            Ok(()) => Some(level),
            Err(err) => {
                warn!("{err}");
                self.runtime.reveal();
                None
            }
        }
    }

    pub fn current_level(&self) -> Option<LevelId> {
        self.scene.as_ref().map(|scene| scene.level)
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Saves flags before the app goes away.
    pub fn shutdown(&mut self) -> FlowResult<()> {
        info!("saving flags on exit");
        self.runtime.flags_mut().flush()
    }
}

/// Marks a UI entity that mirrors a transition surface: its visibility and
/// the alpha of its background or text colour.
#[derive(Component, Debug, Clone, Copy)]
pub struct FadeSurface(pub &'static str);

/// Installs the director, level states, fade mirroring and sound playback.
pub struct FlowPlugin {
    config: FlowConfig,
    catalog: Arc<dyn Fn() -> LevelCatalog + Send + Sync>,
}

impl FlowPlugin {
    pub fn new(config: FlowConfig, catalog: impl Fn() -> LevelCatalog + Send + Sync + 'static) -> Self {
        Self {
            config,
            catalog: Arc::new(catalog),
        }
    }
}

impl Plugin for FlowPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<StatesPlugin>() {
            app.add_plugins(StatesPlugin);
        }

        let queue = SoundQueue::new();
        let player = queue.clone();
        let catalog = (self.catalog)().shared(move |registry: &mut ServiceRegistry| {
            registry.register::<dyn SoundPlayer>(Arc::new(player.clone()));
        });

        app.insert_state(self.config.start_level)
            .insert_resource(queue)
            .insert_resource(Director::new(self.config.clone(), catalog))
            .add_systems(Startup, (start_director, spawn_screen_fader))
            .add_systems(
                Update,
                (drive_director, sync_fade_surfaces, play_queued_sounds).chain(),
            )
            .add_systems(Last, flush_on_exit);
    }
}

fn start_director(mut director: ResMut<Director>) {
    if let Err(err) = director.start() {
        warn!("could not load the start level: {err}");
    }
}

fn drive_director(
    time: Res<Time>,
    mut director: ResMut<Director>,
    mut next_level: ResMut<NextState<LevelId>>,
) {
    if let Some(level) = director.tick(time.delta_secs()) {
        next_level.set(level);
    }
}

fn spawn_screen_fader(mut commands: Commands) {
    commands.spawn((
        FadeSurface(SCREEN_FADER),
        Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            position_type: PositionType::Absolute,
            ..default()
        },
        BackgroundColor(Color::BLACK.with_alpha(0.0)),
        GlobalZIndex(300),
        Visibility::Hidden,
    ));
}

fn sync_fade_surfaces(
    director: Res<Director>,
    mut query: Query<(
        &FadeSurface,
        &mut Visibility,
        Option<&mut BackgroundColor>,
        Option<&mut TextColor>,
    )>,
) {
    let transitions = director.runtime().transitions();
    for (fade, mut visibility, background, text) in &mut query {
        let Some(surface) = transitions.surface(fade.0) else {
            continue;
        };
        *visibility = if surface.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
        let alpha = surface.opacity();
        if let Some(mut background) = background {
            background.0.set_alpha(alpha);
        }
        if let Some(mut text) = text {
            text.0.set_alpha(alpha);
        }
    }
}

fn flush_on_exit(mut exits: MessageReader<AppExit>, mut director: ResMut<Director>) {
    if exits.read().next().is_none() {
        return;
    }
    if let Err(err) = director.shutdown() {
        warn!("could not save flags: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FlowContext;
    use crate::flags::MemoryBackend;
    use crate::flow::FlowGraph;
    use crate::levels::LevelSwitcher;
    use crate::node::{Advance, NodeId, NodeState, StateNode};
    use crate::steps::{LevelExit, Timed};
    use crate::task::Task;

    struct SlowExit;
    impl StateNode for SlowExit {
        fn name(&self) -> &str {
            "slow_exit"
        }

        fn tick(&mut self, _ctx: &mut FlowContext<'_>, _dt: f32) -> Advance {
            Advance::Next
        }

        fn exit(&mut self, _ctx: &mut FlowContext<'_>) -> Task {
            Task::new().wait_secs(60.0)
        }
    }

    fn catalog() -> LevelCatalog {
        LevelCatalog::new()
            .level(LevelId::Menu, || {
                let mut graph = FlowGraph::new("menu");
                let idle = graph.add(Timed::new("idle", 0.3));
                let exit = graph.add(LevelExit::to(LevelId::Prologue).without_fade());
                graph.link(idle, exit);
                Scene::new(LevelId::Menu, graph)
            })
            .level(LevelId::Prologue, || {
                let mut graph = FlowGraph::new("prologue");
                let slow = graph.add(SlowExit);
                let after = graph.add(Timed::new("after", 100.0));
                graph.link(slow, after);
                Scene::new(LevelId::Prologue, graph)
            })
    }

    fn director(backend: MemoryBackend) -> Director {
        let flags = FlagStore::open(backend).expect("memory flags");
        Director::with_flags(FlowConfig::default(), flags, catalog())
    }

    #[test]
    fn start_loads_the_configured_level() {
        let mut director = director(MemoryBackend::new());
        director.start().expect("menu exists");
        assert_eq!(director.current_level(), Some(LevelId::Menu));
        assert!(director.runtime().flags().get_string(keys::LAST_LEVEL_PLAYED).is_none());
    }

    #[test]
    fn level_exit_switches_scenes_and_checkpoints_flags() {
        let backend = MemoryBackend::new();
        let mut director = director(backend.clone());
        director.start().expect("menu exists");

        let mut loaded = None;
        for _ in 0..10 {
            loaded = loaded.or(director.tick(0.1));
        }
        assert_eq!(loaded, Some(LevelId::Prologue));
        assert_eq!(director.current_level(), Some(LevelId::Prologue));

        director.load_level(LevelId::Menu).expect("menu exists");
        let reopened = FlagStore::open(backend).expect("memory flags");
        assert_eq!(reopened.get_string(keys::LAST_LEVEL_PLAYED), Some("prologue"));
    }

    #[test]
    fn unknown_level_keeps_the_current_scene() {
        let mut director = director(MemoryBackend::new());
        director.start().expect("menu exists");
        assert!(director.load_level(LevelId::Awaken).is_err());
        assert_eq!(director.current_level(), Some(LevelId::Menu));
    }

    #[test]
    fn unloading_mid_exit_never_activates_the_successor() {
        let mut director = director(MemoryBackend::new());
        director.load_level(LevelId::Prologue).expect("prologue exists");
        director.tick(0.1);
        director.tick(0.1);
        let graph = &director.scene().expect("loaded").graph;
        assert_eq!(graph.state_of(NodeId(0)), NodeState::Exiting);

        director.load_level(LevelId::Prologue).expect("prologue exists");
        let graph = &director.scene().expect("loaded").graph;
        assert_eq!(graph.state_of(NodeId(0)), NodeState::Running);
        assert_eq!(graph.visits(NodeId(1)), 0);
    }

    #[test]
    fn failed_switch_uncovers_the_current_scene() {
        let catalog = LevelCatalog::new().level(LevelId::Menu, || {
            let mut graph = FlowGraph::new("menu");
            graph.add(LevelExit::to(LevelId::Awaken));
            Scene::new(LevelId::Menu, graph)
        });
        let mut director = Director::with_flags(FlowConfig::default(), FlagStore::in_memory(), catalog);
        director.start().expect("menu exists");

        for _ in 0..100 {
            assert_eq!(director.tick(0.1), None);
        }
        assert_eq!(director.current_level(), Some(LevelId::Menu));
        let transitions = director.runtime().transitions();
        assert_eq!(transitions.value(LevelSwitcher::fader()), Some(0.0));
        let fader = transitions.surface(SCREEN_FADER).expect("fader attached");
        assert!(!fader.visible);
    }
}
