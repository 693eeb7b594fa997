mod aggregator;
mod model;

pub use aggregator::{FeedBundle, FeedSlot, aggregate};
pub use model::{
    ActionItem, ActivityItem, DiscussionItem, FeedStore, FileItem, PgFeedStore,
};
