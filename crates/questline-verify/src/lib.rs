pub mod client;
pub mod verifier;

pub use client::{
    BotApiClient, InlineButton, Media, MediaKind, MembershipClient, MembershipStatus,
    MessageSender, OutboundMessage,
};
pub use verifier::SubscriptionVerifier;
