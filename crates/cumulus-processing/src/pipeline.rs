//! Derivative pipeline - thumbnail retrieval and generation
//!
//! Derivatives are stored next to their source under
//! `<source_name><suffix>`, with suffixes read from settings on every call.
//! Generation is bounded by the shared [`WorkerPool`]; retrieval falls back
//! to a synchronous generation only for local-disk policies.

use crate::error::{GenerationError, ThumbError};
use crate::extension::{classify, extension, is_video, MediaKind};
use crate::image::{RenderedThumb, ThumbEncoding, ThumbnailBuilder};
use crate::pool::WorkerPool;
use crate::reclaim::{NoopReclaim, ReclaimHook};
use crate::video::FrameExtractor;
use bytes::Bytes;
use cumulus_core::constants::{
    DEFAULT_PREVIEW_FILE_SUFFIX, DEFAULT_PREVIEW_TIMEOUT, DEFAULT_THUMB_FILE_SUFFIX,
    DEFAULT_THUMB_HEIGHT, DEFAULT_THUMB_MAX_SRC_SIZE, DEFAULT_THUMB_WIDTH, PREVIEW_FILE_SUFFIX,
    PREVIEW_TIMEOUT, THUMB_FILE_SUFFIX, THUMB_GC_AFTER_GEN, THUMB_HEIGHT, THUMB_MAX_SRC_SIZE,
    THUMB_WIDTH,
};
use cumulus_core::models::format_pic_info;
use cumulus_core::{File, NodeMode, SettingsProvider, StoragePolicy, ThumbSize};
use cumulus_db::FileRepository;
use cumulus_storage::{
    read_to_end, ContentResponse, HandlerProvider, RequestScope, StorageError, StorageHandler,
    ThumbRequest,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// A derivative written by a generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub name: String,
    pub bytes: u64,
    /// Native size of the decoded source (thumbnails only).
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Extension is neither a handled image nor a handled video.
    Unsupported,
    /// Video of size zero.
    EmptySource,
    /// Image source above `thumb_max_src_size`.
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Generated(Derivative),
    Skipped(SkipReason),
}

/// Where the frame extractor reads a video from.
enum VideoSource {
    Local(PathBuf),
    /// Copy of a remote source; removed on drop.
    Staged(NamedTempFile),
}

impl VideoSource {
    fn path(&self) -> &Path {
        match self {
            VideoSource::Local(path) => path,
            VideoSource::Staged(file) => file.path(),
        }
    }
}

pub struct DerivativePipeline {
    pool: Arc<WorkerPool>,
    settings: Arc<dyn SettingsProvider>,
    files: Arc<dyn FileRepository>,
    handlers: Arc<dyn HandlerProvider>,
    frames: Arc<dyn FrameExtractor>,
    reclaim: Arc<dyn ReclaimHook>,
    node_mode: NodeMode,
}

impl DerivativePipeline {
    pub fn new(
        pool: Arc<WorkerPool>,
        settings: Arc<dyn SettingsProvider>,
        files: Arc<dyn FileRepository>,
        handlers: Arc<dyn HandlerProvider>,
        frames: Arc<dyn FrameExtractor>,
    ) -> Self {
        Self {
            pool,
            settings,
            files,
            handlers,
            frames,
            reclaim: Arc::new(NoopReclaim),
            node_mode: NodeMode::default(),
        }
    }

    pub fn with_node_mode(mut self, node_mode: NodeMode) -> Self {
        self.node_mode = node_mode;
        self
    }

    pub fn with_reclaim_hook(mut self, reclaim: Arc<dyn ReclaimHook>) -> Self {
        self.reclaim = reclaim;
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Bounding box for thumbnails, re-read from settings on every call.
    pub async fn thumb_size(&self) -> ThumbSize {
        let width = self.settings.get_int(THUMB_WIDTH, DEFAULT_THUMB_WIDTH).await;
        let height = self
            .settings
            .get_int(THUMB_HEIGHT, DEFAULT_THUMB_HEIGHT)
            .await;
        ThumbSize::new(clamp_dimension(width), clamp_dimension(height))
    }

    pub async fn thumb_name(&self, source_name: &str) -> String {
        let suffix = self
            .settings
            .get_or(THUMB_FILE_SUFFIX, DEFAULT_THUMB_FILE_SUFFIX)
            .await;
        format!("{}{}", source_name, suffix)
    }

    pub async fn preview_name(&self, source_name: &str) -> String {
        let suffix = self
            .settings
            .get_or(PREVIEW_FILE_SUFFIX, DEFAULT_PREVIEW_FILE_SUFFIX)
            .await;
        format!("{}{}", source_name, suffix)
    }

    async fn preview_timeout(&self) -> u32 {
        let seconds = self
            .settings
            .get_int(PREVIEW_TIMEOUT, DEFAULT_PREVIEW_TIMEOUT)
            .await;
        u32::try_from(seconds.max(0)).unwrap_or(u32::MAX)
    }

    async fn resolve_handler(
        &self,
        file: &File,
    ) -> Result<(StoragePolicy, Arc<dyn StorageHandler>), StorageError> {
        let policy = match self.files.get_policy(file.policy_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                return Err(StorageError::ConfigError(format!(
                    "Storage policy {} not found",
                    file.policy_id
                )))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };
        let handler = self.handlers.handler_for(&policy).await?;
        Ok((policy, handler))
    }

    /// Serve the thumbnail of a file.
    ///
    /// Files without picture-info have never had a thumbnail and are
    /// reported as missing. For local-disk policies a failed fetch triggers
    /// one synchronous regeneration followed by exactly one more fetch.
    #[tracing::instrument(skip(self, scope))]
    pub async fn get_thumb(
        &self,
        scope: &RequestScope,
        file_id: i64,
    ) -> Result<ContentResponse, ThumbError> {
        let mut file = match self.files.get_file(file_id).await {
            Ok(Some(file)) if file.has_pic_info() => file,
            Ok(_) => return Err(ThumbError::ObjectNotExist),
            Err(e) => {
                tracing::debug!(error = %e, "File lookup failed");
                return Err(ThumbError::ObjectNotExist);
            }
        };

        let (policy, handler) = self
            .resolve_handler(&file)
            .await
            .map_err(ThumbError::Policy)?;
        let size = self.thumb_size().await;
        let thumb_name = self.thumb_name(&file.source_name).await;
        let preview_timeout = self.preview_timeout().await;
        let expires_in = Duration::from_secs(u64::from(preview_timeout));

        let mut result =
            fetch_thumb(scope, handler.as_ref(), &file, &thumb_name, size, expires_in).await;

        if let Err(e) = &result {
            if policy.policy_type.is_local() {
                tracing::debug!(
                    error = %e,
                    source = %file.source_name,
                    "Thumbnail missing on local policy, regenerating"
                );
                self.generate_thumbnail(&scope.child(), &mut file).await;
                result =
                    fetch_thumb(scope, handler.as_ref(), &file, &thumb_name, size, expires_in)
                        .await;
            }
        }

        let mut response = result.map_err(ThumbError::Handler)?;
        if self.node_mode.is_master() {
            response.max_age = Some(preview_timeout);
        }
        Ok(response)
    }

    /// Generate the thumbnail of `file`, logging instead of returning errors.
    #[tracing::instrument(skip(self, scope, file), fields(file_id = ?file.id, source = %file.source_name))]
    pub async fn generate_thumbnail(&self, scope: &RequestScope, file: &mut File) {
        let start = std::time::Instant::now();
        match self.try_generate_thumbnail(scope, file).await {
            Ok(GenerationOutcome::Generated(derivative)) => {
                tracing::info!(
                    thumb = %derivative.name,
                    size_bytes = derivative.bytes,
                    pic_info = %file.pic_info,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Thumbnail generated"
                );
            }
            Ok(GenerationOutcome::Skipped(reason)) => {
                tracing::debug!(?reason, "Thumbnail generation skipped");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot generate thumbnail");
            }
        }
    }

    /// Generate the thumbnail of `file` and record its picture-info.
    ///
    /// Videos first get a preview frame, which then serves as the image
    /// source. The thumbnail name always derives from the original source.
    pub async fn try_generate_thumbnail(
        &self,
        scope: &RequestScope,
        file: &mut File,
    ) -> Result<GenerationOutcome, GenerationError> {
        let image_source = match classify(&file.source_name) {
            MediaKind::Video => match self.try_generate_preview_image(scope, file).await? {
                GenerationOutcome::Generated(preview) => preview.name,
                skipped @ GenerationOutcome::Skipped(_) => return Ok(skipped),
            },
            MediaKind::Image => {
                let max_size = self
                    .settings
                    .get_int(THUMB_MAX_SRC_SIZE, DEFAULT_THUMB_MAX_SRC_SIZE)
                    .await;
                if max_size > 0 && file.size > max_size as u64 {
                    return Ok(GenerationOutcome::Skipped(SkipReason::TooLarge));
                }
                file.source_name.clone()
            }
            MediaKind::Unsupported => {
                return Ok(GenerationOutcome::Skipped(SkipReason::Unsupported))
            }
        };

        let (_, handler) = self.resolve_handler(file).await?;
        let thumb_name = self.thumb_name(&file.source_name).await;
        let size = self.thumb_size().await;
        let encoding = ThumbEncoding::from_settings(self.settings.as_ref()).await;
        let reclaim_after = self.settings.get_bool(THUMB_GC_AFTER_GEN).await;

        let slot = self.pool.acquire().await;

        let data = read_to_end(handler.get(scope, &image_source).await?).await?;
        let RenderedThumb {
            width,
            height,
            bytes,
        } = tokio::task::spawn_blocking(move || ThumbnailBuilder::render(&data, size, encoding))
            .await?
            .map_err(|e| {
                GenerationError::Codec(format!("failed to parse image {:?}: {}", image_source, e))
            })?;

        let written = persist(scope, handler.as_ref(), &thumb_name, bytes).await;
        drop(slot);

        if reclaim_after {
            tracing::debug!("Reclaiming memory after thumbnail generation");
            self.reclaim.reclaim();
        }
        let written = written?;

        let pic_info = format_pic_info(width, height);
        if let Some(id) = file.id {
            if let Err(e) = self.files.update_pic_info(id, &pic_info).await {
                discard(handler.as_ref(), &thumb_name).await;
                return Err(GenerationError::Persistence(e.to_string()));
            }
        }
        file.pic_info = pic_info;

        Ok(GenerationOutcome::Generated(Derivative {
            name: thumb_name,
            bytes: written,
            dimensions: Some((width, height)),
        }))
    }

    /// Extract the first frame of a video, logging instead of returning errors.
    #[tracing::instrument(skip(self, scope, file), fields(file_id = ?file.id, source = %file.source_name))]
    pub async fn generate_preview_image(&self, scope: &RequestScope, file: &File) {
        match self.try_generate_preview_image(scope, file).await {
            Ok(GenerationOutcome::Generated(derivative)) => {
                tracing::info!(
                    preview = %derivative.name,
                    size_bytes = derivative.bytes,
                    "Preview image generated"
                );
            }
            Ok(GenerationOutcome::Skipped(reason)) => {
                tracing::debug!(?reason, "Preview generation skipped");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot generate preview image");
            }
        }
    }

    /// Store frame 0 of a video as `<source_name><preview suffix>`.
    pub async fn try_generate_preview_image(
        &self,
        scope: &RequestScope,
        file: &File,
    ) -> Result<GenerationOutcome, GenerationError> {
        if !is_video(&file.source_name) {
            return Ok(GenerationOutcome::Skipped(SkipReason::Unsupported));
        }
        if file.size == 0 {
            return Ok(GenerationOutcome::Skipped(SkipReason::EmptySource));
        }

        let (_, handler) = self.resolve_handler(file).await?;
        let preview_name = self.preview_name(&file.source_name).await;

        let _slot = self.pool.acquire().await;

        let source = stage_source(scope, handler.as_ref(), &file.source_name).await?;
        let frame = self
            .frames
            .extract_frame(source.path(), 0)
            .await
            .map_err(|e| {
                GenerationError::Codec(format!(
                    "failed to parse video {:?}: {:#}",
                    file.source_name, e
                ))
            })?;
        drop(source);

        let written = persist(scope, handler.as_ref(), &preview_name, frame).await?;

        Ok(GenerationOutcome::Generated(Derivative {
            name: preview_name,
            bytes: written,
            dimensions: None,
        }))
    }
}

fn clamp_dimension(value: i64) -> u32 {
    u32::try_from(value.max(1)).unwrap_or(u32::MAX)
}

async fn fetch_thumb(
    scope: &RequestScope,
    handler: &dyn StorageHandler,
    file: &File,
    thumb_name: &str,
    size: ThumbSize,
    expires_in: Duration,
) -> Result<ContentResponse, StorageError> {
    let request = ThumbRequest {
        source_name: &file.source_name,
        thumb_name,
        size,
        file,
        expires_in,
    };
    handler.thumb(scope, &request).await
}

/// Write a derivative, removing whatever was left behind if the write
/// failed or came up short.
async fn persist(
    scope: &RequestScope,
    handler: &dyn StorageHandler,
    name: &str,
    data: Vec<u8>,
) -> Result<u64, GenerationError> {
    let expected = data.len() as u64;
    match handler.put(scope, name, Bytes::from(data)).await {
        Ok(written) if written == expected => Ok(written),
        Ok(written) => {
            discard(handler, name).await;
            Err(GenerationError::ShortWrite { expected, written })
        }
        Err(e) => {
            discard(handler, name).await;
            Err(GenerationError::Handler(e))
        }
    }
}

/// Best-effort delete of a derivative, detached from the caller's scope.
async fn discard(handler: &dyn StorageHandler, name: &str) {
    let names = [name.to_string()];
    match handler.delete(&RequestScope::default(), &names).await {
        Ok(failed) if failed.is_empty() => {
            tracing::debug!(derivative = %name, "Derivative removed");
        }
        Ok(_) => tracing::warn!(derivative = %name, "Failed to remove derivative"),
        Err(e) => tracing::warn!(derivative = %name, error = %e, "Failed to remove derivative"),
    }
}

/// Local path of a video, staging it into a temp file when the backend has
/// no filesystem path.
async fn stage_source(
    scope: &RequestScope,
    handler: &dyn StorageHandler,
    source_name: &str,
) -> Result<VideoSource, GenerationError> {
    if let Some(path) = handler.local_path(source_name) {
        return Ok(VideoSource::Local(path));
    }

    let mut stream = handler.get(scope, source_name).await?;
    let suffix = extension(source_name)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    let staged = tempfile::Builder::new()
        .prefix("cumulus-video-")
        .suffix(&suffix)
        .tempfile()
        .map_err(StorageError::from)?;
    let mut out = tokio::fs::File::from_std(
        staged
            .as_file()
            .try_clone()
            .map_err(StorageError::from)?,
    );

    // Chunks go straight to disk; the source is never buffered whole.
    let size_bytes = scope
        .run(async {
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.flush().await?;
            Ok::<_, StorageError>(written)
        })
        .await?;
    drop(out);

    tracing::debug!(
        source = %source_name,
        size_bytes,
        "Video source staged for frame extraction"
    );
    Ok(VideoSource::Staged(staged))
}
