// Main
use bevy::prelude::*;
use threshold::FlowConfig;
use threshold::experiences::ExperiencesPlugin;

const CONFIG_PATH: &str = "threshold.toml";

fn main() -> AppExit {
    let config = match FlowConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(err) => {
            // Logging is not up until the app is built.
            eprintln!("{CONFIG_PATH}: {err}");
            return AppExit::error();
        }
    };

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(ExperiencesPlugin { config })
        .add_systems(Startup, spawn_camera)
        .run()
}

fn spawn_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}
