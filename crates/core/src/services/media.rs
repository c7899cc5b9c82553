//! Concurrent media upload fan-out.
//!
//! Each item is compressed, then uploaded, through a [`MediaPipeline`].
//! Overall progress weights compression at 30% and upload at 70% per item,
//! averaged across items.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use coterie_common::{AppError, AppResult};
use coterie_db::entities::post::{MediaItem, MediaKind};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default number of items processed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on items processed at once.
pub const MAX_CONCURRENCY: usize = 5;

const COMPRESS_WEIGHT: f64 = 0.3;
const UPLOAD_WEIGHT: f64 = 0.7;

/// A raw media file waiting to be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpload {
    pub file_name: String,
    pub kind: MediaKind,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Output of the compression phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedMedia {
    pub file_name: String,
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
    pub thumbnail: Option<Vec<u8>>,
}

/// Receives the fraction (0.0 to 1.0) of one phase of one item.
pub trait PhaseReporter: Send + Sync {
    fn report(&self, fraction: f64);
}

/// Compression and storage backend.
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Compress one file, reporting progress as it goes.
    async fn compress(
        &self,
        upload: MediaUpload,
        progress: &dyn PhaseReporter,
    ) -> AppResult<CompressedMedia>;

    /// Store a compressed file and return its public attachment.
    async fn upload(
        &self,
        media: CompressedMedia,
        progress: &dyn PhaseReporter,
    ) -> AppResult<MediaItem>;
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Compress,
    Upload,
}

/// Per-item phase fractions plus the caller's progress callback.
struct ProgressBoard<'a> {
    phases: Mutex<Vec<(f64, f64)>>,
    on_progress: &'a (dyn Fn(f64) + Send + Sync),
}

impl ProgressBoard<'_> {
    fn update(&self, index: usize, phase: Phase, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let overall = {
            let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = phases.get_mut(index) {
                match phase {
                    Phase::Compress => slot.0 = slot.0.max(fraction),
                    Phase::Upload => slot.1 = slot.1.max(fraction),
                }
            }
            overall_progress(&phases)
        };
        (self.on_progress)(overall);
    }
}

struct SlotReporter<'a, 'b> {
    board: &'a ProgressBoard<'b>,
    index: usize,
    phase: Phase,
}

impl PhaseReporter for SlotReporter<'_, '_> {
    fn report(&self, fraction: f64) {
        self.board.update(self.index, self.phase, fraction);
    }
}

/// Weighted mean progress over items given their `(compress, upload)` fractions.
#[must_use]
pub fn overall_progress(phases: &[(f64, f64)]) -> f64 {
    if phases.is_empty() {
        return 0.0;
    }
    let total: f64 = phases
        .iter()
        .map(|(c, u)| COMPRESS_WEIGHT * c + UPLOAD_WEIGHT * u)
        .sum();
    total / phases.len() as f64
}

/// Media upload service.
#[derive(Clone)]
pub struct MediaService {
    pipeline: Arc<dyn MediaPipeline>,
}

impl MediaService {
    /// Create a new media service.
    #[must_use]
    pub fn new(pipeline: Arc<dyn MediaPipeline>) -> Self {
        Self { pipeline }
    }

    /// Compress and upload every item with bounded concurrency.
    ///
    /// `concurrency` defaults to [`DEFAULT_CONCURRENCY`] and is clamped to
    /// `1..=MAX_CONCURRENCY`. Results come back in input order; a failed
    /// item does not stop the others.
    pub async fn upload_all<P>(
        &self,
        items: Vec<MediaUpload>,
        concurrency: Option<usize>,
        on_progress: P,
    ) -> Vec<AppResult<MediaItem>>
    where
        P: Fn(f64) + Send + Sync,
    {
        let concurrency = concurrency
            .unwrap_or(DEFAULT_CONCURRENCY)
            .clamp(1, MAX_CONCURRENCY);
        let semaphore = Semaphore::new(concurrency);
        let board = ProgressBoard {
            phases: Mutex::new(vec![(0.0, 0.0); items.len()]),
            on_progress: &on_progress,
        };

        debug!(count = items.len(), concurrency, "Starting media upload");

        let results = join_all(items.into_iter().enumerate().map(|(index, item)| {
            let semaphore = &semaphore;
            let board = &board;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                self.process(board, index, item).await
            }
        }))
        .await;

        for (index, result) in results.iter().enumerate() {
            if let Err(e) = result {
                warn!(index, error = %e, "Media item failed");
            }
        }
        results
    }

    async fn process(
        &self,
        board: &ProgressBoard<'_>,
        index: usize,
        item: MediaUpload,
    ) -> AppResult<MediaItem> {
        let compress = SlotReporter {
            board,
            index,
            phase: Phase::Compress,
        };
        let compressed = self.pipeline.compress(item, &compress).await?;
        compress.report(1.0);

        let upload = SlotReporter {
            board,
            index,
            phase: Phase::Upload,
        };
        let uploaded = self.pipeline.upload(compressed, &upload).await?;
        upload.report(1.0);

        Ok(uploaded)
    }
}
