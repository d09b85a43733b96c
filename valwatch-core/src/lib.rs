pub mod article;
pub mod check;
pub mod config;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod poller;
pub mod schedule;
pub mod storage;
pub mod thread;

pub use article::{extract, ArticleRecord};
pub use check::{check_articles, check_threads, Accepted};
pub use config::{ArticleSettings, ThreadLayout, ThreadSettings, WatchConfig};
pub use error::{ExtractError, FetchError, PollError, StoreError};
pub use fetch::{ForumClient, NewsClient};
pub use notify::{build_article_payload, build_thread_payload, Accent, Payload};
pub use poller::{
    poll_articles, poll_threads, retry_backoff, spawn_poller, Delivery, Event, PollConfig, PollerHandle,
    Sources, Stores,
};
pub use schedule::CheckSchedule;
pub use storage::{ArticleStore, ThreadStore, THREAD_STORE_CAPACITY};
pub use thread::{
    parse_candidate, summarize_comments, CommentSummary, Rejected, TagFilter, ThreadCandidate,
    ThreadRecord, NO_COMMENTS,
};
