mod alert;
mod channel;
mod content;
mod story;
mod subscription;
mod summary;

pub use alert::{Alert, NewAlert, SchedulePolicy, Strategy, WaitPolicy};
pub use channel::{Channel, ChannelKind, DiscordConfig, EmailConfig, NewChannel, PhoneConfig, SlackConfig};
pub use content::{normalize_url, Content, NewContent};
pub use story::{Story, NewStory};
pub use subscription::Subscription;
pub use summary::{CleanupCounts, RunSummary};
