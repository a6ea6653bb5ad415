//! Fetcher implementation with bounded concurrency and retry logic
//!
//! Every asset of a collection is processed independently: skip if the pool
//! already holds its bytes, otherwise reserve space, stream into a staging
//! file while hashing, enforce the minimum rate, verify and commit. Failures
//! of one asset never stop the others.

use futures::StreamExt;
use hoard_core::utils::Digester;
use hoard_core::{AssetDescriptor, FetchOptions, HoardError, HoardResult};
use hoard_pool::PoolStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::events::{FetchEvent, FetchFailure, FetchSummary, FileEvent, ProgressEvent, ResponseCode};
use crate::rate::RateMonitor;
use crate::transport::{HttpTransport, Transport};
use crate::FetchResult;

mod staging;

use staging::StagingFile;

/// Capacity of the event channel
const EVENT_BUFFER: usize = 256;
/// How often a stalled transfer is checked against the minimum rate
const RATE_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Downloads asset collections into a pool
#[derive(Debug, Clone)]
pub struct Fetcher {
    store: Arc<PoolStore>,
    transport: Arc<dyn Transport>,
}

/// Handle to a running fetch. Dropping it cancels the fetch.
#[derive(Debug)]
pub struct FetchTask {
    events: mpsc::Receiver<FetchEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<FetchSummary>,
    _cancel_on_drop: DropGuard,
}

enum Outcome {
    Succeeded,
    Skipped,
    Failed,
}

struct FetchContext {
    store: Arc<PoolStore>,
    transport: Arc<dyn Transport>,
    options: FetchOptions,
    total: usize,
    events: mpsc::Sender<FetchEvent>,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(store: Arc<PoolStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Fetcher using the reqwest transport
    pub fn with_http(store: Arc<PoolStore>) -> FetchResult<Self> {
        Ok(Self::new(store, Arc::new(HttpTransport::new()?)))
    }

    /// Start fetching a collection.
    ///
    /// Only structural problems fail here: invalid options, duplicate asset
    /// names, or an unusable pool. A malformed descriptor fails alone, like
    /// any other per-asset failure, through its `FileEvent`; check
    /// `PoolStore::are_assets_ready` afterwards.
    pub async fn start(
        &self,
        collection: Vec<AssetDescriptor>,
        options: FetchOptions,
    ) -> FetchResult<FetchTask> {
        options.validate()?;
        let mut seen = HashSet::new();
        for asset in &collection {
            if !seen.insert(asset.name.as_str()) {
                return Err(HoardError::InvalidAsset {
                    name: asset.name.clone(),
                    reason: "name appears more than once in the collection".to_string(),
                });
            }
        }
        tokio::fs::create_dir_all(self.store.tmp_dir())
            .await
            .map_err(|e| HoardError::io(format!("Pool staging directory {} is unusable", self.store.tmp_dir()), e))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let context = Arc::new(FetchContext {
            store: self.store.clone(),
            transport: self.transport.clone(),
            options,
            total: collection.len(),
            events: events_tx,
            cancel: cancel.clone(),
        });

        info!("Fetching {} asset(s) into {}", collection.len(), self.store.root());
        let handle = tokio::spawn(run_collection(context, collection));

        Ok(FetchTask {
            events: events_rx,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            handle,
        })
    }
}

impl FetchTask {
    /// Next event in emission order; `None` once the fetch has finished
    pub async fn next_event(&mut self) -> Option<FetchEvent> {
        self.events.recv().await
    }

    /// Stop scheduling attempts and abort in-flight transfers
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for completion, discarding events not yet consumed
    pub async fn wait(mut self) -> FetchResult<FetchSummary> {
        self.events.close();
        while self.events.recv().await.is_some() {}
        self.handle.await.map_err(|e| {
            HoardError::io(
                "Fetch task failed".to_string(),
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })
    }
}

async fn run_collection(context: Arc<FetchContext>, collection: Vec<AssetDescriptor>) -> FetchSummary {
    let semaphore = Arc::new(Semaphore::new(context.options.max_concurrent_transfers));
    let mut set = JoinSet::new();

    // Permits are taken here, in collection order, so transfers start in order
    for (index, asset) in collection.into_iter().enumerate() {
        let permit = tokio::select! {
            _ = context.cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let context = context.clone();
        set.spawn(async move { fetch_asset(&context, index, asset, permit).await });
    }

    let mut summary = FetchSummary::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Outcome::Succeeded) => summary.succeeded += 1,
            Ok(Outcome::Skipped) => summary.skipped += 1,
            Ok(Outcome::Failed) => summary.failed += 1,
            Err(e) => {
                warn!("Fetch worker failed: {}", e);
                summary.failed += 1;
            }
        }
    }
    summary.cancelled = context.cancel.is_cancelled();
    info!(
        "Fetch finished: {} fetched, {} already present, {} failed",
        summary.succeeded, summary.skipped, summary.failed
    );
    summary
}

async fn fetch_asset(
    context: &FetchContext,
    index: usize,
    asset: AssetDescriptor,
    permit: Option<OwnedSemaphorePermit>,
) -> Outcome {
    let Some(_permit) = permit else {
        let error = HoardError::Cancelled { name: asset.name.clone() };
        send_file_event(context, index, &asset, ResponseCode::Transport, Some(&error)).await;
        return Outcome::Failed;
    };

    // A malformed descriptor can never succeed, so it is not retried
    if let Err(error) = asset.validate() {
        warn!("Skipping invalid asset '{}': {}", asset.name, error);
        send_file_event(context, index, &asset, ResponseCode::Transport, Some(&error)).await;
        return Outcome::Failed;
    }

    let store = context.store.clone();
    let probe = asset.clone();
    match run_blocking(move || store.claim_existing(&probe)).await {
        Ok(Some(_)) => {
            debug!("'{}' already in pool, skipping", asset.name);
            send_file_event(context, index, &asset, ResponseCode::Skipped, None).await;
            return Outcome::Skipped;
        }
        Ok(None) => {}
        Err(e) => warn!("Pool lookup for '{}' failed: {}", asset.name, e),
    }

    let retry_count = context.options.file_retry_count;
    let mut response_code = ResponseCode::Transport;
    let mut last_error = None;
    // Shared across attempts so a retry does not reset the throttle
    let mut last_progress: Option<Instant> = None;

    for attempt in 0..=retry_count {
        if context.cancel.is_cancelled() {
            last_error = Some(HoardError::Cancelled { name: asset.name.clone() });
            break;
        }
        if attempt > 0 {
            let delay = context.options.retry.delay_for(attempt);
            tokio::select! {
                _ = context.cancel.cancelled() => {
                    last_error = Some(HoardError::Cancelled { name: asset.name.clone() });
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Fetching '{}' attempt {}/{}", asset.name, attempt + 1, retry_count + 1);
        match transfer(context, index, &asset, &mut response_code, &mut last_progress).await {
            Ok(()) => {
                send_file_event(context, index, &asset, response_code, None).await;
                return Outcome::Succeeded;
            }
            Err(e) => {
                let retryable = e.is_retryable();
                if attempt < retry_count && retryable {
                    warn!("Attempt {} for '{}' failed, retrying: {}", attempt + 1, asset.name, e);
                }
                last_error = Some(e);
                if !retryable {
                    break;
                }
            }
        }
    }

    let error = last_error.unwrap_or_else(|| HoardError::Cancelled { name: asset.name.clone() });
    warn!("Failed to fetch '{}': {}", asset.name, error);
    send_file_event(context, index, &asset, response_code, Some(&error)).await;
    Outcome::Failed
}

/// One attempt: open, reserve, stream, verify, commit
async fn transfer(
    context: &FetchContext,
    index: usize,
    asset: &AssetDescriptor,
    response_code: &mut ResponseCode,
    last_progress: &mut Option<Instant>,
) -> HoardResult<()> {
    *response_code = ResponseCode::Transport;
    let cancelled = || HoardError::Cancelled { name: asset.name.clone() };

    let response = tokio::select! {
        _ = context.cancel.cancelled() => return Err(cancelled()),
        response = context.transport.open(&asset.link) => response?,
    };
    *response_code = ResponseCode::Status(response.status);
    if !response.is_success() {
        return Err(HoardError::HttpStatus {
            link: asset.link.to_string(),
            status: response.status,
        });
    }

    let expected_total = asset.size.or(response.content_length);
    let store = context.store.clone();
    let reserve_bytes = expected_total.unwrap_or(0);
    let reservation = run_blocking(move || store.reserve_owned(reserve_bytes)).await?;

    let (mut staging, file) = StagingFile::create(context.store.tmp_dir(), index, &asset.name).await?;
    let mut writer = BufWriter::new(file);
    let mut digester = Digester::new(asset.hash.method);
    let mut transferred = 0u64;
    let mut monitor = context
        .options
        .minimum_transfer_rate
        .map(|rate| RateMonitor::new(rate, Instant::now()));
    let mut rate_check = tokio::time::interval(RATE_CHECK_INTERVAL);
    rate_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut body = response.body;

    loop {
        tokio::select! {
            _ = context.cancel.cancelled() => return Err(cancelled()),
            _ = rate_check.tick(), if monitor.is_some() => {
                if let Some(monitor) = monitor.as_mut() {
                    if let Err(observed) = monitor.check(Instant::now()) {
                        return Err(HoardError::TransferTooSlow {
                            name: asset.name.clone(),
                            observed,
                            required: monitor.rate().required_bytes(),
                            period_secs: monitor.rate().period.as_secs(),
                        });
                    }
                }
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    transferred += bytes.len() as u64;
                    if let Some(expected) = asset.size {
                        if transferred > expected {
                            return Err(HoardError::SizeMismatch {
                                name: asset.name.clone(),
                                expected,
                                actual: transferred,
                            });
                        }
                    }
                    digester.update(&bytes);
                    writer.write_all(&bytes).await.map_err(|e| {
                        HoardError::io(format!("Failed to write {}", staging.path()), e)
                    })?;
                    let now = Instant::now();
                    if let Some(monitor) = monitor.as_mut() {
                        monitor.record(now, bytes.len() as u64);
                    }
                    let due = last_progress
                        .map(|at| now.duration_since(at) >= context.options.progress_interval)
                        .unwrap_or(true);
                    if due {
                        *last_progress = Some(now);
                        send_progress(context, index, asset, transferred, expected_total);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            },
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| HoardError::io(format!("Failed to flush {}", staging.path()), e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| HoardError::io(format!("Failed to sync {}", staging.path()), e))?;

    if let Some(expected) = asset.size {
        if transferred != expected {
            return Err(HoardError::SizeMismatch {
                name: asset.name.clone(),
                expected,
                actual: transferred,
            });
        }
    }

    let actual = digester.finalize_hex();
    if !asset.hash.matches_hex(&actual) {
        return Err(HoardError::HashMismatch {
            name: asset.name.clone(),
            expected: asset.hash.normalized_hex(),
            actual,
        });
    }

    let store = context.store.clone();
    let committed = asset.clone();
    let staged = staging.path().to_path_buf();
    run_blocking(move || {
        store.commit_owned(reservation, &committed, staged.as_std_path(), &actual)
    })
    .await?;
    staging.disarm();
    info!("Fetched '{}' ({} bytes)", asset.name, transferred);
    Ok(())
}

/// Run a pool operation that touches the disk off the async workers
async fn run_blocking<T, F>(operation: F) -> HoardResult<T>
where
    F: FnOnce() -> HoardResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation).await.map_err(|e| {
        HoardError::io(
            "Pool task failed".to_string(),
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })?
}

/// Progress is best effort: dropped when the consumer lags
fn send_progress(
    context: &FetchContext,
    index: usize,
    asset: &AssetDescriptor,
    transferred: u64,
    total: Option<u64>,
) {
    let event = FetchEvent::Progress(ProgressEvent {
        index,
        total: context.total,
        file_name: asset.name.clone(),
        current_file_transferred: transferred,
        current_file_total: total,
    });
    let _ = context.events.try_send(event);
}

async fn send_file_event(
    context: &FetchContext,
    index: usize,
    asset: &AssetDescriptor,
    response_code: ResponseCode,
    error: Option<&HoardError>,
) {
    let event = FetchEvent::File(FileEvent {
        index,
        file_name: asset.name.clone(),
        response_code,
        error: error.map(FetchFailure::from),
    });
    // A closed channel means the caller stopped listening
    let _ = context.events.send(event).await;
}
