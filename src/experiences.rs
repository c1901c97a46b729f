// The levels of the game and the steps each one runs through.

use std::sync::Arc;

use bevy::prelude::*;

use crate::card::CardPlugin;
use crate::config::FlowConfig;
use crate::director::FlowPlugin;
use crate::flow::FlowGraph;
use crate::levels::{LevelCatalog, LevelId, Scene};
use crate::menu::{MenuAction, MenuPlugin, MenuSelected};
use crate::registry::ServiceRegistry;
use crate::services::{Condition, Switch};
use crate::steps::{AwaitCondition, Choice, LevelExit, ResumeLevel, Timed, TitleCard};

const TITLE_HOLD: f32 = 1.5;
const PROLOGUE_INTRO: f32 = 3.0;
const AWAKEN_DELAY: f32 = 5.0;

/// Set once the player has pressed continue at the end of the prologue.
pub const PROLOGUE_SEEN: &str = "prologue_seen";

/// Held while Space or Enter is down.
#[derive(Resource, Debug, Clone, Default)]
pub struct ContinueKey(pub Switch);

impl Condition for ContinueKey {
    fn is_true(&self) -> bool {
        self.0.is_on()
    }
}

pub struct ExperiencesPlugin {
    pub config: FlowConfig,
}

impl Plugin for ExperiencesPlugin {
    fn build(&self, app: &mut App) {
        let key = ContinueKey::default();
        let shared = key.clone();
        app.insert_resource(key)
            .add_plugins((
                FlowPlugin::new(self.config.clone(), move || catalog(shared.clone())),
                MenuPlugin,
                CardPlugin,
            ))
            .add_systems(PreUpdate, read_continue_key);
    }
}

fn read_continue_key(keys: Option<Res<ButtonInput<KeyCode>>>, key: Res<ContinueKey>) {
    let held = keys.is_some_and(|keys| keys.any_pressed([KeyCode::Space, KeyCode::Enter]));
    key.0.set(held);
}

/// Every level, sharing one continue key.
pub fn catalog(key: ContinueKey) -> LevelCatalog {
    LevelCatalog::new()
        .shared(move |registry: &mut ServiceRegistry| {
            registry.register(Arc::new(key.clone()));
        })
        .level(LevelId::Menu, menu)
        .level(LevelId::Prologue, prologue)
        .level(LevelId::Awaken, awaken)
}

fn menu() -> Scene {
    let mut graph = FlowGraph::new("menu");
    let title = graph.add(TitleCard::new(TITLE_HOLD));
    let start = graph.add(LevelExit::to(LevelId::Prologue));
    let resume = graph.add(ResumeLevel::new(LevelId::Prologue));
    let choice = graph.add(Choice::<MenuSelected>::new("menu_choice", move |action| {
        match action {
            MenuAction::Start => Some(start),
            MenuAction::Continue => Some(resume),
        }
    }));
    graph.link(title, choice);
    Scene::new(LevelId::Menu, graph)
}

fn prologue() -> Scene {
    let mut graph = FlowGraph::new("prologue");
    let steps = [
        graph.add(TitleCard::new(TITLE_HOLD)),
        graph.add(Timed::new("prologue_intro", PROLOGUE_INTRO)),
        graph.add(AwaitCondition::<ContinueKey>::new("press_continue").with_milestone(PROLOGUE_SEEN)),
        graph.add(LevelExit::to(LevelId::Awaken).with_badge(LevelId::Prologue)),
    ];
    graph.chain(&steps);
    Scene::new(LevelId::Prologue, graph)
}

fn awaken() -> Scene {
    let mut graph = FlowGraph::new("awaken");
    let steps = [
        graph.add(TitleCard::new(TITLE_HOLD)),
        graph.add(Timed::new("awaken_timer", AWAKEN_DELAY)),
        graph.add(LevelExit::to(LevelId::Menu).with_badge(LevelId::Awaken)),
    ];
    graph.chain(&steps);
    Scene::new(LevelId::Awaken, graph)
}
