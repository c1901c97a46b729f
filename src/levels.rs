// Levels, the scenes built for them, and switching between them.
use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::{debug, info};
use bevy::prelude::States;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{FlowError, FlowResult};
use crate::flow::FlowGraph;
use crate::registry::{Provider, SceneServices};
use crate::transition::{Easing, TransitionEngine, TransitionHandle, Tween};

/// Every experience the app can load. Names double as context names and as
/// flag key suffixes, so renaming one orphans its saved progress.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Eq,
    PartialEq,
    Hash,
    States,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LevelId {
    #[default]
    Menu,
    Prologue,
    Awaken,
}

impl LevelId {
    /// Whether "continue" from the menu may return here.
    pub fn is_resumable(self) -> bool {
        !matches!(self, LevelId::Menu)
    }

    pub fn title(self) -> &'static str {
        match self {
            LevelId::Menu => "Threshold",
            LevelId::Prologue => "I: Descent",
            LevelId::Awaken => "II: Awakening",
        }
    }
}

/// Surface covering the whole screen, used for level-switch fades.
pub const SCREEN_FADER: &str = "screen_fader";

/// A loaded level: its services and its flow graph.
pub struct Scene {
    pub level: LevelId,
    pub services: SceneServices,
    pub graph: FlowGraph,
}

impl Scene {
    pub fn new(level: LevelId, graph: FlowGraph) -> Self {
        Self {
            level,
            services: SceneServices::new(),
            graph,
        }
    }

    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.services = self.services.with_provider(provider);
        self
    }
}

type SceneBuilder = Box<dyn Fn() -> Scene + Send + Sync>;

/// Builders for every level plus providers shared by all of them.
#[derive(Default)]
pub struct LevelCatalog {
    builders: HashMap<LevelId, SceneBuilder>,
    shared: Vec<Arc<dyn Provider>>,
}

impl LevelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LevelId, build: impl Fn() -> Scene + Send + Sync + 'static) -> Self {
        self.builders.insert(level, Box::new(build));
        self
    }

    /// Registers a provider that runs, before the level's own, in every scene.
    pub fn shared(mut self, provider: impl Provider + 'static) -> Self {
        self.shared.push(Arc::new(provider));
        self
    }

    pub fn contains(&self, level: LevelId) -> bool {
        self.builders.contains_key(&level)
    }

    pub fn build(&self, level: LevelId) -> FlowResult<Scene> {
        let build = self
            .builders
            .get(&level)
            .ok_or_else(|| FlowError::UnknownLevel(level.to_string()))?;
        let mut scene = build();
        let own = std::mem::take(&mut scene.services);
        let mut services = SceneServices::new();
        for provider in &self.shared {
            services.add_provider(provider.clone());
        }
        services.absorb(own);
        scene.services = services;
        Ok(scene)
    }
}

/// Requests a level change. The director performs the load on its next tick.
#[derive(Clone)]
pub struct LevelSwitcher {
    pending: Arc<Mutex<Option<LevelId>>>,
    fade_secs: f32,
    easing: Easing,
}

impl LevelSwitcher {
    pub fn new(fade_secs: f32, easing: Easing) -> Self {
        Self {
            pending: Arc::new(Mutex::new(None)),
            fade_secs,
            easing,
        }
    }

    pub fn fader() -> TransitionHandle {
        TransitionHandle::opacity(SCREEN_FADER)
    }

    /// Loads `level`, first fading the screen to opaque when `fade_out_first`.
    /// With a fade, the load is queued from the fade's completion callback.
    pub fn load(&self, transitions: &mut TransitionEngine, level: LevelId, fade_out_first: bool) {
        if !fade_out_first {
            debug!("level switch to {level} requested");
            *self.pending.lock() = Some(level);
            return;
        }
        let from = transitions.value(Self::fader()).unwrap_or(0.0);
        let pending = self.pending.clone();
        info!("fading out before loading {level}");
        transitions.run(
            Self::fader(),
            Tween::new(from, 1.0, self.fade_secs).with_easing(self.easing),
            Some(Box::new(move || *pending.lock() = Some(level))),
        );
    }

    pub fn take_pending(&self) -> Option<LevelId> {
        self.pending.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Fades the screen back in after a load.
    pub fn reveal(&self, transitions: &mut TransitionEngine) {
        if transitions.value(Self::fader()).unwrap_or(0.0) > 0.0 {
            transitions.run(
                Self::fader(),
                Tween::fade_out(self.fade_secs).with_easing(self.easing),
                None,
            );
        }
    }
}
