// Main menu

use bevy::prelude::*;
use strum::IntoEnumIterator;

use crate::bus::Signal;
use crate::director::Director;
use crate::flags::keys;
use crate::levels::LevelId;

pub struct MenuPlugin;

impl Plugin for MenuPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(LevelId::Menu), setup_menu).add_systems(
            Update,
            (button_visuals, button_actions).run_if(in_state(LevelId::Menu)),
        );
    }
}

/// Published on the bus when a menu button is pressed.
pub struct MenuSelected;

impl Signal for MenuSelected {
    type Args = MenuAction;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Start,
    Continue,
}

const NORMAL_BUTTON: Color = Color::srgb(0.15, 0.15, 0.15);
const HOVERED_BUTTON: Color = Color::srgb(0.25, 0.25, 0.25);
const PRESSED_BUTTON: Color = Color::srgb(0.35, 0.35, 0.35);

#[derive(Component)]
enum MenuButton {
    Action(MenuAction),
    #[cfg(not(target_arch = "wasm32"))]
    Exit,
}

struct Badge {
    level: LevelId,
    fresh: bool,
}

fn setup_menu(mut commands: Commands, mut director: ResMut<Director>) {
    let flags = director.runtime().flags();
    let can_continue = flags.get_string(keys::LAST_LEVEL_PLAYED).is_some();
    let badges: Vec<Badge> = LevelId::iter()
        .filter(|level| flags.get_bool(&keys::badge_unlocked(*level)))
        .map(|level| Badge {
            level,
            fresh: !flags.get_bool(&keys::badge_notified(level)),
        })
        .collect();

    // Shown once; the next visit lists the badge without the marker.
    let flags = director.runtime_mut().flags_mut();
    for badge in badges.iter().filter(|badge| badge.fresh) {
        flags.set_bool(keys::badge_notified(badge.level), true);
    }

    // Root container.
    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                row_gap: Val::Px(24.0),
                ..default()
            },
            DespawnOnExit(LevelId::Menu),
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new(LevelId::Menu.title()),
                TextFont {
                    font_size: 56.0,
                    ..default()
                },
                TextColor(Color::WHITE),
                Node {
                    margin: UiRect::bottom(Val::Px(32.0)),
                    ..default()
                },
            ));

            spawn_button(parent, "Start", MenuButton::Action(MenuAction::Start));

            if can_continue {
                spawn_button(parent, "Continue", MenuButton::Action(MenuAction::Continue));
            }

            // Exit button (native only).
            #[cfg(not(target_arch = "wasm32"))]
            spawn_button(parent, "Exit", MenuButton::Exit);

            for badge in &badges {
                let label = if badge.fresh {
                    format!("{} cleared (new!)", badge.level.title())
                } else {
                    format!("{} cleared", badge.level.title())
                };
                parent.spawn((
                    Text::new(label),
                    TextFont {
                        font_size: 18.0,
                        ..default()
                    },
                    TextColor(Color::srgba(0.8, 0.8, 0.8, 1.0)),
                ));
            }
        });
}

fn spawn_button(parent: &mut ChildSpawnerCommands, label: &str, marker: MenuButton) {
    parent
        .spawn((
            marker,
            Button,
            Node {
                width: Val::Px(200.0),
                height: Val::Px(50.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                border: UiRect::all(Val::Px(2.0)),
                ..default()
            },
            BorderColor::all(Color::srgba(1.0, 1.0, 1.0, 0.3)),
            BackgroundColor(NORMAL_BUTTON),
        ))
        .with_children(|btn| {
            btn.spawn((
                Text::new(label),
                TextFont {
                    font_size: 24.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
        });
}

fn button_visuals(
    mut query: Query<
        (&Interaction, &mut BackgroundColor, &mut BorderColor),
        (Changed<Interaction>, With<MenuButton>),
    >,
) {
    for (interaction, mut bg, mut border) in &mut query {
        match *interaction {
            Interaction::Pressed => {
                *bg = PRESSED_BUTTON.into();
                *border = BorderColor::all(Color::WHITE);
            }
            Interaction::Hovered => {
                *bg = HOVERED_BUTTON.into();
                *border = BorderColor::all(Color::WHITE);
            }
            Interaction::None => {
                *bg = NORMAL_BUTTON.into();
                *border = BorderColor::all(Color::srgba(1.0, 1.0, 1.0, 0.3));
            }
        }
    }
}

fn button_actions(
    query: Query<(&Interaction, &MenuButton), Changed<Interaction>>,
    director: Res<Director>,
    #[cfg(not(target_arch = "wasm32"))] mut exit: MessageWriter<AppExit>,
) {
    for (interaction, button) in &query {
        if *interaction != Interaction::Pressed {
            continue;
        }
        match button {
            MenuButton::Action(action) => {
                let heard = director.runtime().bus().publish::<MenuSelected>(*action);
                if heard == 0 {
                    debug!("menu {action:?} pressed before the menu was ready");
                }
            }
            #[cfg(not(target_arch = "wasm32"))]
            MenuButton::Exit => {
                exit.write(AppExit::Success);
            }
        }
    }
}
