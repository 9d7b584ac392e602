//! Catalog write-behind worker.
//!
//! A single task owns every write to the [`CatalogCache`]. Jobs run in FIFO
//! order, so a rebuild never interleaves with a refresh and the last refresh
//! for a product always reflects the latest committed row.
//!
//! Refreshes re-read the product from the primary store instead of trusting a
//! value handed over by the caller. Failed refreshes are retried with
//! exponential backoff; once retries run out the catalog is marked stale and
//! the next listing rebuilds it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use corner_shop_core::ProductId;

use super::{CacheError, CatalogCache};
use crate::config::CatalogConfig;
use crate::models::Product;
use crate::store::{RepositoryError, Store};

/// Errors from catalog synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The worker task has exited.
    #[error("catalog sync worker stopped")]
    Stopped,
}

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Attempts per refresh or rebuild after the first
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// TTL for the product detail cache
    pub detail_ttl: Duration,
}

impl SyncOptions {
    #[must_use]
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            max_retries: config.sync_max_retries,
            detail_ttl: config.detail_ttl,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            detail_ttl: Duration::from_secs(60),
        }
    }
}

enum SyncJob {
    Refresh {
        ids: Vec<ProductId>,
        ack: Option<oneshot::Sender<Result<(), SyncError>>>,
    },
    Rebuild {
        force: bool,
        ack: oneshot::Sender<Result<u64, SyncError>>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

struct Shared {
    cache: Arc<dyn CatalogCache>,
    stale: AtomicBool,
    details: Cache<ProductId, Product>,
    /// Bumped before every detail invalidation.
    detail_epoch: AtomicU64,
}

impl Shared {
    async fn forget_detail(&self, id: ProductId) {
        self.detail_epoch.fetch_add(1, Ordering::SeqCst);
        self.details.invalidate(&id).await;
    }

    fn forget_all_details(&self) {
        self.detail_epoch.fetch_add(1, Ordering::SeqCst);
        self.details.invalidate_all();
    }
}

/// Taken before a primary-store read whose result will be cached as a
/// product detail. See [`CatalogSync::remember_detail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailTicket(u64);

/// Handle to the catalog sync worker.
///
/// Cheap to clone. The worker exits once every handle is dropped.
#[derive(Clone)]
pub struct CatalogSync {
    jobs: mpsc::UnboundedSender<SyncJob>,
    shared: Arc<Shared>,
}

impl CatalogSync {
    /// Spawn the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn Store>,
        cache: Arc<dyn CatalogCache>,
        options: SyncOptions,
    ) -> Self {
        let details = Cache::builder()
            .max_capacity(1000)
            .time_to_live(options.detail_ttl)
            .build();

        let shared = Arc::new(Shared {
            cache,
            stale: AtomicBool::new(false),
            details,
            detail_epoch: AtomicU64::new(0),
        });

        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = SyncWorker {
            store,
            shared: Arc::clone(&shared),
            options,
        };
        tokio::spawn(worker.run(rx));

        Self { jobs, shared }
    }

    /// The cache this worker writes to, for readers.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn CatalogCache> {
        &self.shared.cache
    }

    /// Product detail cache. Refreshes invalidate its entries.
    #[must_use]
    pub fn details(&self) -> &Cache<ProductId, Product> {
        &self.shared.details
    }

    #[must_use]
    pub fn detail_ticket(&self) -> DetailTicket {
        DetailTicket(self.shared.detail_epoch.load(Ordering::SeqCst))
    }

    /// Cache `product`, read from the store after `ticket` was taken.
    ///
    /// If any invalidation ran since the ticket, the read may predate it, so
    /// the entry is dropped again instead of living out its TTL.
    pub async fn remember_detail(&self, ticket: DetailTicket, product: Product) {
        let id = product.id;
        self.shared.details.insert(id, product).await;
        if self.shared.detail_epoch.load(Ordering::SeqCst) != ticket.0 {
            debug!(product_id = %id, "Detail read raced a refresh, not caching");
            self.shared.forget_detail(id).await;
        }
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.shared.stale.load(Ordering::SeqCst)
    }

    /// Force the next listing to rebuild.
    pub fn mark_stale(&self) {
        self.shared.stale.store(true, Ordering::SeqCst);
    }

    /// Queue a refresh without waiting for it.
    pub fn enqueue_refresh(&self, ids: Vec<ProductId>) {
        if ids.is_empty() {
            return;
        }
        if self.jobs.send(SyncJob::Refresh { ids, ack: None }).is_err() {
            warn!("Catalog sync worker stopped; marking catalog stale");
            self.mark_stale();
        }
    }

    /// Refresh and wait until the entries are written or retries run out.
    ///
    /// # Errors
    ///
    /// Returns the last refresh error, or `SyncError::Stopped`.
    pub async fn refresh_and_wait(&self, ids: Vec<ProductId>) -> Result<(), SyncError> {
        let (ack, done) = oneshot::channel();
        self.send(SyncJob::Refresh {
            ids,
            ack: Some(ack),
        })?;
        done.await.map_err(|_| SyncError::Stopped)?
    }

    /// Wipe and reload the cache. Returns the entry count.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the store read or the cache write keeps failing.
    pub async fn rebuild(&self) -> Result<u64, SyncError> {
        self.request_rebuild(true).await
    }

    /// Rebuild only if the cache is empty or stale. Returns the entry count.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if a needed rebuild fails.
    pub async fn ensure_built(&self) -> Result<u64, SyncError> {
        self.request_rebuild(false).await
    }

    /// Wait until every job queued before this call has finished.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Stopped` if the worker has exited.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (ack, done) = oneshot::channel();
        self.send(SyncJob::Flush { ack })?;
        done.await.map_err(|_| SyncError::Stopped)
    }

    async fn request_rebuild(&self, force: bool) -> Result<u64, SyncError> {
        let (ack, done) = oneshot::channel();
        self.send(SyncJob::Rebuild { force, ack })?;
        done.await.map_err(|_| SyncError::Stopped)?
    }

    fn send(&self, job: SyncJob) -> Result<(), SyncError> {
        self.jobs.send(job).map_err(|_| SyncError::Stopped)
    }
}

struct SyncWorker {
    store: Arc<dyn Store>,
    shared: Arc<Shared>,
    options: SyncOptions,
}

impl SyncWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<SyncJob>) {
        debug!("Catalog sync worker started");
        while let Some(job) = rx.recv().await {
            match job {
                SyncJob::Refresh { ids, ack } => {
                    let result = self.refresh(&ids).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(result);
                    }
                }
                SyncJob::Rebuild { force, ack } => {
                    let _ = ack.send(self.rebuild(force).await);
                }
                SyncJob::Flush { ack } => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("Catalog sync worker stopped");
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn refresh(&self, ids: &[ProductId]) -> Result<(), SyncError> {
        let mut last_error = None;

        for &id in ids {
            let result = (|| async { self.refresh_one(id).await })
                .retry(self.options.backoff())
                .notify(|err: &SyncError, delay: Duration| {
                    warn!(product_id = %id, error = %err, delay = ?delay, "Catalog refresh failed, retrying");
                })
                .await;

            self.shared.details.invalidate(&id).await;

            if let Err(err) = result {
                error!(product_id = %id, error = %err, "Catalog refresh gave up; marking catalog stale");
                self.shared.stale.store(true, Ordering::SeqCst);
                last_error = Some(err);
            }
        }

        last_error.map_or(Ok(()), Err)
    }

    async fn refresh_one(&self, id: ProductId) -> Result<(), SyncError> {
        match self.store.get_product(id).await? {
            Some(product) => self.shared.cache.upsert(&product).await?,
            None => self.shared.cache.remove(id).await?,
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rebuild(&self, force: bool) -> Result<u64, SyncError> {
        if !force && !self.shared.stale.load(Ordering::SeqCst) {
            match self.shared.cache.len().await {
                Ok(count) if count > 0 => return Ok(count),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Catalog length check failed, rebuilding"),
            }
        }

        // Cleared up front so a refresh failing mid-rebuild stays recorded
        self.shared.stale.store(false, Ordering::SeqCst);

        let result = (|| async {
            let products = self.store.list_products().await?;
            self.shared.cache.replace_all(&products).await?;
            Ok::<u64, SyncError>(products.len() as u64)
        })
        .retry(self.options.backoff())
        .notify(|err: &SyncError, delay: Duration| {
            warn!(error = %err, delay = ?delay, "Catalog rebuild failed, retrying");
        })
        .await;

        self.shared.forget_all_details();

        match result {
            Ok(count) => {
                info!(count, "Catalog rebuilt");
                Ok(count)
            }
            Err(err) => {
                error!(error = %err, "Catalog rebuild gave up");
                self.shared.stale.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }
}
