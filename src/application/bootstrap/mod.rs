mod agent;
mod collector;

pub use agent::AgentBootstrap;
pub use collector::{CollectorBootstrap, CollectorHandle};
