use std::time::Duration;

use chrono::Local;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::article::ArticleRecord;
use crate::check::{self, Accepted};
use crate::config::{ArticleSettings, ThreadSettings, WatchConfig};
use crate::error::PollError;
use crate::fetch::{ForumClient, NewsClient};
use crate::notify::Payload;
use crate::schedule::CheckSchedule;
use crate::storage::{ArticleStore, ThreadStore};
use crate::thread::ThreadRecord;

/// Largest exponent applied to the retry backoff.
const MAX_BACKOFF_SHIFT: u8 = 16;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Delay before retry number `attempt` (1-based): `base_ms` doubled per
/// earlier attempt, with the doubling capped.
pub fn retry_backoff(base_ms: u64, attempt: u8) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(base_ms.saturating_mul(1u64 << shift))
}

/// A payload on its way out, with the channel used to report whether it got there.
///
/// Dropping a `Delivery` without calling [`Delivery::confirm`] counts as a
/// failed delivery.
#[derive(Debug)]
pub struct Delivery {
    pub payload: Payload,
    ack: oneshot::Sender<bool>,
}

impl Delivery {
    fn new(payload: Payload) -> (Self, oneshot::Receiver<bool>) {
        let (ack, rx) = oneshot::channel();
        (Self { payload, ack }, rx)
    }

    pub fn confirm(self, delivered: bool) {
        let _ = self.ack.send(delivered);
    }
}

#[derive(Debug)]
pub enum Event {
    NewArticle(Delivery),
    NewThreads(Vec<Delivery>),
}

pub struct Sources {
    pub news: NewsClient,
    pub forum: ForumClient,
}

pub struct Stores {
    pub articles: ArticleStore,
    pub threads: ThreadStore,
}

pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<Stores>,
}

impl PollerHandle {
    /// Stops the poller and hands back the stores in their latest state.
    pub async fn stop(self) -> Result<Stores, PollError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(PollError::from)
    }
}

/// Fetches the news page and runs the article check against `store`.
pub async fn poll_articles(
    news: &NewsClient,
    store: &ArticleStore,
    settings: &ArticleSettings,
) -> Option<Accepted<ArticleRecord>> {
    match news.fetch_listing().await {
        Ok(html) => check::check_articles(&html, store, settings),
        Err(err) => {
            warn!(error = %err, "failed to fetch news page");
            None
        }
    }
}

/// Fetches recent threads and runs the thread check against `store`.
///
/// Replies are only fetched for threads that survive parsing and filtering.
pub async fn poll_threads(
    forum: &ForumClient,
    store: &ThreadStore,
    settings: &ThreadSettings,
) -> Vec<Accepted<ThreadRecord>> {
    let candidates = match forum.search_recent().await {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(error = %err, "failed to fetch threads");
            return Vec::new();
        }
    };

    let mut accepted = Vec::new();
    for record in check::select_new_threads(&candidates, store, settings) {
        let comments = match forum.top_comments(&record.id, settings.comment_limit).await {
            Ok(comments) => comments,
            Err(err) => {
                warn!(id = %record.id, error = %err, "failed to fetch top comments");
                Vec::new()
            }
        };
        accepted.push(check::complete_thread(record, &comments, settings.comment_limit));
    }
    accepted
}

/// Records a delivered article and persists the store.
///
/// A failed write is logged and otherwise ignored: the payload is already out.
pub async fn commit_article(store: &mut ArticleStore, record: &ArticleRecord) {
    check::remember_article(store, record);
    if let Err(err) = store.persist().await {
        warn!(%err, "failed to persist article store");
    }
}

pub async fn commit_threads(store: &mut ThreadStore, records: &[ThreadRecord]) {
    check::remember_threads(store, records);
    if let Err(err) = store.persist().await {
        warn!(%err, "failed to persist thread store");
    }
}

/// Waits for each record's delivery report and keeps the delivered ones.
async fn delivered<R>(pending: Vec<(R, oneshot::Receiver<bool>)>) -> Vec<R> {
    let mut out = Vec::with_capacity(pending.len());
    for (record, ack) in pending {
        if ack.await.unwrap_or(false) {
            out.push(record);
        } else {
            warn!("payload not delivered, it will be offered again next check");
        }
    }
    out
}

/// The update receiver was dropped.
struct ReceiverGone;

/// Hands an accepted article over and returns it once delivered.
async fn hand_over_article(
    update_tx: &mpsc::Sender<Event>,
    accepted: Accepted<ArticleRecord>,
) -> Result<Option<ArticleRecord>, ReceiverGone> {
    let (delivery, ack) = Delivery::new(accepted.payload);
    update_tx.send(Event::NewArticle(delivery)).await.map_err(|_| ReceiverGone)?;
    Ok(delivered(vec![(accepted.record, ack)]).await.pop())
}

async fn hand_over_threads(
    update_tx: &mpsc::Sender<Event>,
    accepted: Vec<Accepted<ThreadRecord>>,
) -> Result<Vec<ThreadRecord>, ReceiverGone> {
    let mut deliveries = Vec::with_capacity(accepted.len());
    let mut pending = Vec::with_capacity(accepted.len());
    for Accepted { record, payload } in accepted {
        let (delivery, ack) = Delivery::new(payload);
        deliveries.push(delivery);
        pending.push((record, ack));
    }
    update_tx.send(Event::NewThreads(deliveries)).await.map_err(|_| ReceiverGone)?;
    Ok(delivered(pending).await)
}

pub fn spawn_poller(
    sources: Sources,
    mut stores: Stores,
    config: WatchConfig,
    update_tx: mpsc::Sender<Event>,
) -> PollerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let interval = config.poll.to_poll_config().interval;
    let join = tokio::spawn(async move {
        let mut article_schedule = CheckSchedule::new(config.articles.check_hours.iter().copied());
        let mut thread_schedule = CheckSchedule::new(config.threads.check_hours.iter().copied());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Local::now().naive_local();

                    if thread_schedule.is_due(now) {
                        debug!(previous = ?thread_schedule.last_check(), "checking threads");
                        thread_schedule.mark(now);
                        let accepted = poll_threads(&sources.forum, &stores.threads, &config.threads).await;
                        if accepted.is_empty() {
                            info!("no new threads");
                        } else {
                            match hand_over_threads(&update_tx, accepted).await {
                                Ok(records) if records.is_empty() => {}
                                Ok(records) => commit_threads(&mut stores.threads, &records).await,
                                Err(ReceiverGone) => {
                                    warn!("update receiver dropped, stopping poller");
                                    break;
                                }
                            }
                        }
                    }

                    if article_schedule.is_due(now) {
                        debug!(previous = ?article_schedule.last_check(), "checking patch notes");
                        article_schedule.mark(now);
                        match poll_articles(&sources.news, &stores.articles, &config.articles).await {
                            Some(accepted) => match hand_over_article(&update_tx, accepted).await {
                                Ok(Some(record)) => commit_article(&mut stores.articles, &record).await,
                                Ok(None) => {}
                                Err(ReceiverGone) => {
                                    warn!("update receiver dropped, stopping poller");
                                    break;
                                }
                            },
                            None => info!("no new patch notes"),
                        }
                    }
                }
            }
        }

        stores
    });

    PollerHandle { cancel_tx, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Accent;

    fn payload() -> Payload {
        Payload {
            title: "Masters Madrid".into(),
            body: String::new(),
            url: "https://www.vlr.gg/1".into(),
            accent_color: Accent::ORANGE,
            thumbnail_url: None,
            announcement: None,
        }
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(retry_backoff(500, 1), Duration::from_millis(500));
        assert_eq!(retry_backoff(500, 3), Duration::from_millis(2000));
        assert_eq!(retry_backoff(1, 200), Duration::from_millis(1 << 16));
        assert_eq!(retry_backoff(u64::MAX, 255), Duration::from_millis(u64::MAX));
        assert_eq!(retry_backoff(0, 70), Duration::ZERO);
    }

    #[tokio::test]
    async fn only_confirmed_records_are_kept() {
        let (ok, ok_rx) = Delivery::new(payload());
        let (failed, failed_rx) = Delivery::new(payload());
        let (dropped, dropped_rx) = Delivery::new(payload());
        ok.confirm(true);
        failed.confirm(false);
        drop(dropped);

        let kept = delivered(vec![("a", ok_rx), ("b", failed_rx), ("c", dropped_rx)]).await;
        assert_eq!(kept, vec!["a"]);
    }
}
