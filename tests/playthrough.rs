// Headless playthrough of the whole game loop.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use threshold::experiences::{ContinueKey, PROLOGUE_SEEN, catalog};
use threshold::flags::{FlagStore, JsonFileBackend, keys};
use threshold::menu::{MenuAction, MenuSelected};
use threshold::{Director, FlowConfig, FlowPlugin, LevelId};

const FRAME: Duration = Duration::from_millis(100);

fn app(config: FlowConfig, key: ContinueKey) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .insert_resource(TimeUpdateStrategy::ManualDuration(FRAME))
        .add_plugins(FlowPlugin::new(config, move || catalog(key.clone())));
    app
}

fn run_frames(app: &mut App, frames: usize) {
    for _ in 0..frames {
        app.update();
    }
}

fn level(app: &App) -> LevelId {
    *app.world().resource::<State<LevelId>>().get()
}

fn press(app: &App, action: MenuAction) -> usize {
    app.world()
        .resource::<Director>()
        .runtime()
        .bus()
        .publish::<MenuSelected>(action)
}

#[test]
fn full_loop_from_menu_back_to_menu() {
    let dir = tempfile::tempdir().expect("temp dir");
    let flags_path = dir.path().join("flags.json");
    let config = FlowConfig {
        flags_path: Some(flags_path.clone()),
        ..FlowConfig::default()
    };
    let key = ContinueKey::default();
    let mut app = app(config, key.clone());

    run_frames(&mut app, 40);
    assert_eq!(level(&app), LevelId::Menu);
    assert_eq!(press(&app, MenuAction::Start), 1);

    run_frames(&mut app, 20);
    assert_eq!(level(&app), LevelId::Prologue);

    // Intro done; the prologue now waits for the continue key.
    run_frames(&mut app, 80);
    assert_eq!(level(&app), LevelId::Prologue);
    key.0.set(true);
    run_frames(&mut app, 20);
    key.0.set(false);
    assert_eq!(level(&app), LevelId::Awaken);

    run_frames(&mut app, 120);
    assert_eq!(level(&app), LevelId::Menu);

    // Every level switch checkpoints the flags to disk.
    let saved = FlagStore::open(JsonFileBackend::new(&flags_path)).expect("flags on disk");
    assert!(saved.get_bool(&keys::milestone(PROLOGUE_SEEN)));
    assert!(saved.get_bool(&keys::badge_unlocked(LevelId::Prologue)));
    assert!(saved.get_bool(&keys::badge_unlocked(LevelId::Awaken)));
    assert_eq!(saved.get_string(keys::LAST_LEVEL_PLAYED), Some("awaken"));
}

#[test]
fn continue_resumes_the_last_level_played() {
    let dir = tempfile::tempdir().expect("temp dir");
    let flags_path = dir.path().join("flags.json");
    let mut flags = FlagStore::open(JsonFileBackend::new(&flags_path)).expect("empty flags");
    flags.set_string(keys::LAST_LEVEL_PLAYED, LevelId::Awaken.to_string());
    flags.flush().expect("flags written");

    let config = FlowConfig {
        flags_path: Some(flags_path),
        ..FlowConfig::default()
    };
    let mut app = app(config, ContinueKey::default());

    run_frames(&mut app, 40);
    assert_eq!(press(&app, MenuAction::Continue), 1);
    run_frames(&mut app, 20);
    assert_eq!(level(&app), LevelId::Awaken);
}

#[test]
fn menu_ignores_presses_during_the_title_card() {
    let mut app = app(FlowConfig::default(), ContinueKey::default());
    run_frames(&mut app, 5);
    assert_eq!(press(&app, MenuAction::Start), 0);
    run_frames(&mut app, 40);
    assert_eq!(level(&app), LevelId::Menu);
}
