pub mod channels;
pub mod news;
pub mod settings;
pub mod tasks;
pub mod users;

pub use channels::{Channel, ChannelRegistry};
pub use news::{NewsDraft, NewsFeed, NewsItem};
pub use settings::Settings;
pub use tasks::{Task, TaskDraft, TaskRegistry, UserTask};
pub use users::{User, UserDirectory, UserStats, SIGNUP_REFERRAL_BONUS};
