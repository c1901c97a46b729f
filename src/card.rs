// Full-screen title cards shown as each level starts.
//
// Opacity is driven by the title card surface; see `steps::TitleCard`.

use bevy::prelude::*;
use strum::IntoEnumIterator;

use crate::director::FadeSurface;
use crate::levels::LevelId;
use crate::steps::TITLE_CARD;

pub struct CardPlugin;

impl Plugin for CardPlugin {
    fn build(&self, app: &mut App) {
        for level in LevelId::iter() {
            app.add_systems(OnEnter(level), move |commands: Commands| {
                spawn_card(commands, level)
            });
        }
    }
}

fn spawn_card(mut commands: Commands, level: LevelId) {
    commands
        .spawn((
            FadeSurface(TITLE_CARD),
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                position_type: PositionType::Absolute,
                ..default()
            },
            BackgroundColor(Color::BLACK.with_alpha(0.0)),
            GlobalZIndex(100),
            Visibility::Hidden,
            DespawnOnExit(level),
        ))
        .with_children(|parent| {
            parent.spawn((
                FadeSurface(TITLE_CARD),
                Text::new(level.title()),
                TextFont {
                    font_size: 48.0,
                    ..default()
                },
                TextColor(Color::srgba(1.0, 1.0, 1.0, 0.0)),
            ));
        });
}
