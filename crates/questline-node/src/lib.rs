pub mod api;
pub mod broadcast;
pub mod config;
pub mod logging;
pub mod node;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use config::NodeConfig;
pub use node::{NodeStats, QuestlineNode};
