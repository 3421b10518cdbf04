//! The automation loop: phases, session state, and the bot thread.

pub mod context;
pub mod engine;
pub mod runner;

pub use context::{BotStatus, Phase, SessionContext, StatusHandle};
pub use engine::{zone_accepts, BarLocator, Engine, SavedBar, TemplateBar};
pub use runner::BotHandle;
