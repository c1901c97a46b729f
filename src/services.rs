// Collaborator capabilities the flow consumes but does not implement.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bevy::prelude::*;
use parking_lot::Mutex;

/// Plays a named sound effect.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, name: &str);
}

/// An externally owned boolean: a timer, an input, a discovered surface.
pub trait Condition: Send + Sync {
    fn is_true(&self) -> bool;
}

/// Shared on/off condition. Clones flip the same switch.
#[derive(Debug, Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Condition for Switch {
    fn is_true(&self) -> bool {
        self.is_on()
    }
}

/// Sounds requested by nodes, drained each frame by [`play_queued_sounds`].
#[derive(Resource, Debug, Clone, Default)]
pub struct SoundQueue(Arc<Mutex<Vec<String>>>);

impl SoundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl SoundPlayer for SoundQueue {
    fn play(&self, name: &str) {
        self.0.lock().push(name.to_owned());
    }
}

const SOUND_DIR: &str = "sounds";

pub(crate) fn play_queued_sounds(
    mut commands: Commands,
    queue: Res<SoundQueue>,
    asset_server: Option<Res<AssetServer>>,
) {
    let names = queue.drain();
    let Some(asset_server) = asset_server else {
        // Headless: no audio backend, nothing to play.
        return;
    };
    for name in names {
        let source: Handle<AudioSource> = asset_server.load(format!("{SOUND_DIR}/{name}.ogg"));
        commands.spawn((AudioPlayer::new(source), PlaybackSettings::DESPAWN));
    }
}
