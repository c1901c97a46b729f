// Transitions: cancellable fades of surface values

use std::collections::HashMap;
use std::fmt;

use bevy::log::{trace, warn};
use bevy::math::curve::{Curve, EaseFunction, EasingCurve};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::task::Completion;

pub const OPACITY: &str = "opacity";

/// Opaque (surface, channel) pair that deduplicates runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionHandle {
    pub surface: &'static str,
    pub channel: &'static str,
}

impl TransitionHandle {
    pub const fn new(surface: &'static str, channel: &'static str) -> Self {
        Self { surface, channel }
    }

    pub const fn opacity(surface: &'static str) -> Self {
        Self::new(surface, OPACITY)
    }
}

impl fmt::Display for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.surface, self.channel)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    #[default]
    SmoothStep,
    CubicInOut,
    SineInOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let function = match self {
            Easing::Linear => return t,
            Easing::SmoothStep => EaseFunction::SmoothStep,
            Easing::CubicInOut => EaseFunction::CubicInOut,
            Easing::SineInOut => EaseFunction::SineInOut,
        };
        EasingCurve::new(0.0_f32, 1.0_f32, function).sample_clamped(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    pub from: f32,
    pub to: f32,
    pub duration: f32,
    pub delay: f32,
    pub easing: Easing,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: f32) -> Self {
        Self {
            from,
            to,
            duration,
            delay: 0.0,
            easing: Easing::Linear,
        }
    }

    pub fn fade_in(duration: f32) -> Self {
        Self::new(0.0, 1.0, duration)
    }

    pub fn fade_out(duration: f32) -> Self {
        Self::new(1.0, 0.0, duration)
    }

    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    fn sample(&self, t: f32) -> f32 {
        self.from + (self.to - self.from) * self.easing.apply(t)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Surface {
    pub visible: bool,
    /// Reaching this value at the end of a run deactivates the surface.
    pub hidden_at: Option<f32>,
    values: HashMap<&'static str, f32>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface that deactivates whenever a run ends on `sentinel`.
    pub fn hidden_at(sentinel: f32) -> Self {
        Self {
            hidden_at: Some(sentinel),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, channel: &'static str, value: f32) -> Self {
        self.values.insert(channel, value);
        self
    }

    pub fn shown(mut self) -> Self {
        self.visible = true;
        self
    }

    pub fn value(&self, channel: &str) -> Option<f32> {
        self.values.get(channel).copied()
    }

    pub fn opacity(&self) -> f32 {
        self.value(OPACITY).unwrap_or(0.0)
    }
}

type OnComplete = Box<dyn FnOnce() + Send + Sync>;

struct Run {
    tween: Tween,
    elapsed: f32,
    completion: Completion,
    on_complete: Option<OnComplete>,
}

#[derive(Default)]
pub struct TransitionEngine {
    surfaces: HashMap<&'static str, Surface>,
    runs: HashMap<TransitionHandle, Run>,
}

impl TransitionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a surface. Runs against a replaced surface keep going.
    pub fn attach(&mut self, name: &'static str, surface: Surface) {
        self.surfaces.insert(name, surface);
    }

    /// Removes a surface and cancels every run targeting it.
    pub fn detach(&mut self, name: &str) -> Option<Surface> {
        self.runs.retain(|handle, run| {
            let keep = handle.surface != name;
            if !keep {
                run.completion.cancel();
            }
            keep
        });
        self.surfaces.remove(name)
    }

    pub fn surface(&self, name: &str) -> Option<&Surface> {
        self.surfaces.get(name)
    }

    pub fn surfaces(&self) -> impl Iterator<Item = (&'static str, &Surface)> {
        self.surfaces.iter().map(|(name, surface)| (*name, surface))
    }

    pub fn value(&self, handle: TransitionHandle) -> Option<f32> {
        self.surfaces.get(handle.surface)?.value(handle.channel)
    }

    /// Jumps a channel to `value` without animating, cancelling any run.
    pub fn set(&mut self, handle: TransitionHandle, value: f32) {
        self.cancel(handle);
        if let Some(surface) = self.surfaces.get_mut(handle.surface) {
            surface.values.insert(handle.channel, value);
        }
    }

    pub fn set_visible(&mut self, surface: &str, visible: bool) {
        if let Some(surface) = self.surfaces.get_mut(surface) {
            surface.visible = visible;
        }
    }

    pub fn is_running(&self, handle: TransitionHandle) -> bool {
        self.runs.contains_key(&handle)
    }

    pub fn running(&self) -> usize {
        self.runs.len()
    }

    /// Cancels the run on `handle`, if any. Its completion callback is dropped.
    pub fn cancel(&mut self, handle: TransitionHandle) -> bool {
        match self.runs.remove(&handle) {
            Some(run) => {
                run.completion.cancel();
                true
            }
            None => false,
        }
    }

    /// Starts animating `handle`, cancelling any run already on it. A zero
    /// duration finishes, callback included, before this returns.
    pub fn run(
        &mut self,
        handle: TransitionHandle,
        tween: Tween,
        on_complete: Option<OnComplete>,
    ) -> Completion {
        let Some(surface) = self.surfaces.get_mut(handle.surface) else {
            warn!("{}", FlowError::InvalidTransitionTarget(handle.to_string()));
            return Completion::cancelled();
        };

        if let Some(previous) = self.runs.remove(&handle) {
            trace!("{handle}: replacing in-flight run");
            previous.completion.cancel();
        }

        surface.visible = true;
        surface.values.insert(handle.channel, tween.from);

        let completion = Completion::pending();
        if tween.duration <= 0.0 {
            finish(surface, handle, &tween);
            completion.complete();
            if let Some(callback) = on_complete {
                callback();
            }
            return completion;
        }

        self.runs.insert(
            handle,
            Run {
                tween,
                elapsed: 0.0,
                completion: completion.clone(),
                on_complete,
            },
        );
        completion
    }

    pub fn advance(&mut self, dt: f32) {
        let mut finished = Vec::new();
        for (handle, run) in self.runs.iter_mut() {
            if run.completion.is_cancelled() {
                finished.push(*handle);
                continue;
            }
            run.elapsed += dt;
            let active = run.elapsed - run.tween.delay;
            if active < 0.0 {
                continue;
            }
            let t = (active / run.tween.duration).min(1.0);
            if let Some(surface) = self.surfaces.get_mut(handle.surface) {
                surface.values.insert(handle.channel, run.tween.sample(t));
            }
            if t >= 1.0 {
                finished.push(*handle);
            }
        }

        let mut callbacks = Vec::new();
        for handle in finished {
            let Some(mut run) = self.runs.remove(&handle) else {
                continue;
            };
            if run.completion.is_cancelled() {
                continue;
            }
            if let Some(surface) = self.surfaces.get_mut(handle.surface) {
                finish(surface, handle, &run.tween);
            }
            run.completion.complete();
            callbacks.extend(run.on_complete.take());
        }
        // Callbacks run after bookkeeping so they observe final values.
        for callback in callbacks {
            callback();
        }
    }
}

fn finish(surface: &mut Surface, handle: TransitionHandle, tween: &Tween) {
    surface.values.insert(handle.channel, tween.to);
    if surface.hidden_at == Some(tween.to) {
        surface.visible = false;
    }
}
