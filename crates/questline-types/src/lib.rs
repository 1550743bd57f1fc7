pub mod amount;
pub mod error;
pub mod id;
pub mod task;

pub use amount::TokenAmount;
pub use error::{QuestlineError, Result};
pub use id::{ChannelId, TaskId, UserId};
pub use task::{CompletionStatus, PostbackEvent, Rarity, TaskType};
