// Threshold: a flow substrate for short interactive experiences.
pub mod bus;
pub mod card;
pub mod config;
pub mod context;
pub mod director;
pub mod error;
pub mod experiences;
pub mod flags;
pub mod flow;
pub mod levels;
pub mod menu;
pub mod node;
pub mod registry;
pub mod services;
pub mod steps;
pub mod task;
pub mod transition;

pub use bus::{EventBus, Signal, Subscription};
pub use config::FlowConfig;
pub use context::{FlowContext, Runtime};
pub use director::{Director, FadeSurface, FlowPlugin};
pub use error::{FlowError, FlowResult};
pub use flags::FlagStore;
pub use flow::FlowGraph;
pub use levels::{LevelCatalog, LevelId, LevelSwitcher, Scene};
pub use node::{Advance, NodeId, NodeState, NodeTiming, StateNode};
pub use registry::{Provider, SceneServices, ServiceRegistry};
pub use task::{CancelToken, Completion, Task, TaskPoll};
pub use transition::{Easing, Surface, TransitionEngine, TransitionHandle, Tween};
