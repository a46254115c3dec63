//! Social posting domain models

mod account;
mod codec;
mod post;
mod settings;

pub use account::{
    AccountType, NewSocialAccount, Platform, SocialAccount, TokenGrant, needs_refresh,
};
pub use post::{
    EngagementCounts, NewSocialPost, PostAnalytics, PostStatus, SocialPost, engagement_rate,
};
pub use settings::PostingSettings;

pub(crate) use codec::text_column;
