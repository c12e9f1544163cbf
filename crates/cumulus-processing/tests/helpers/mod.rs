//! Test helpers: in-memory collaborators for the derivative pipeline.
//!
//! Run from workspace root: `cargo test -p cumulus-processing`.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::{AppError, File, MemorySettings, NodeMode, PolicyType, StoragePolicy};
use cumulus_db::FileRepository;
use cumulus_processing::{DerivativePipeline, FrameExtractor, ReclaimHook, WorkerPool};
use cumulus_storage::{
    ByteStream, ContentResponse, HandlerProvider, RequestScope, StorageError, StorageHandler,
    StorageResult, ThumbRequest,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const POLICY_ID: i64 = 1;

/// Ordered record of collaborator calls shared by handler and extractor.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

pub fn file(id: Option<i64>, source_name: &str, size: u64) -> File {
    File {
        id,
        name: source_name.rsplit('/').next().unwrap_or(source_name).to_string(),
        source_name: source_name.to_string(),
        size,
        pic_info: String::new(),
        policy_id: POLICY_ID,
    }
}

#[derive(Default)]
pub struct MemoryFileRepository {
    files: Mutex<HashMap<i64, File>>,
    policies: Mutex<HashMap<i64, StoragePolicy>>,
    pub fail_updates: AtomicBool,
    pub fail_lookups: AtomicBool,
    pub updates: AtomicUsize,
}

impl MemoryFileRepository {
    pub fn insert_file(&self, file: File) {
        let id = file.id.expect("persisted file");
        self.files.lock().unwrap().insert(id, file);
    }

    pub fn insert_policy(&self, policy: StoragePolicy) {
        self.policies.lock().unwrap().insert(policy.id, policy);
    }

    pub fn stored(&self, id: i64) -> Option<File> {
        self.files.lock().unwrap().get(&id).cloned()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn get_file(&self, id: i64) -> Result<Option<File>, AppError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AppError::Internal("connection refused".to_string()));
        }
        Ok(self.files.lock().unwrap().get(&id).cloned())
    }

    async fn get_policy(&self, id: i64) -> Result<Option<StoragePolicy>, AppError> {
        Ok(self.policies.lock().unwrap().get(&id).cloned())
    }

    async fn update_pic_info(&self, id: i64, pic_info: &str) -> Result<(), AppError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Internal("update rejected".to_string()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        match files.get_mut(&id) {
            Some(file) => {
                file.pic_info = pic_info.to_string();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("File {} not found", id))),
        }
    }
}

/// In-memory storage handler that behaves like the backend of `policy_type`.
pub struct MemoryHandler {
    policy_type: PolicyType,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    events: EventLog,
    pub thumb_calls: AtomicUsize,
    /// Report one byte less than was written.
    pub short_write: AtomicBool,
    /// Keep half of the data, then fail the write.
    pub fail_puts: AtomicBool,
    /// Split reads into chunks of this many bytes; `0` yields one chunk.
    pub chunk_size: AtomicUsize,
    /// Stall every read this long before answering.
    pub read_delay: Mutex<Duration>,
    /// Expose sources through `local_path`.
    pub has_local_paths: bool,
}

impl MemoryHandler {
    pub fn new(policy_type: PolicyType, events: EventLog) -> Self {
        Self {
            policy_type,
            objects: Mutex::new(HashMap::new()),
            events,
            thumb_calls: AtomicUsize::new(0),
            short_write: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            chunk_size: AtomicUsize::new(0),
            read_delay: Mutex::new(Duration::ZERO),
            has_local_paths: policy_type.is_local(),
        }
    }

    pub fn insert(&self, name: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(name.to_string(), data);
    }

    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl StorageHandler for MemoryHandler {
    async fn get(&self, scope: &RequestScope, name: &str) -> StorageResult<ByteStream> {
        self.record(format!("get:{}", name));
        let delay = *self.read_delay.lock().unwrap();
        let data = scope
            .run(async {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.object(name)
                    .ok_or_else(|| StorageError::NotFound(name.to_string()))
            })
            .await?;

        let chunk_size = match self.chunk_size.load(Ordering::SeqCst) {
            0 => data.len().max(1),
            n => n,
        };
        let chunks: Vec<StorageResult<Bytes>> = data
            .chunks(chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn put(&self, scope: &RequestScope, name: &str, data: Bytes) -> StorageResult<u64> {
        self.record(format!("put:{}", name));
        scope
            .run(async {
                if self.fail_puts.load(Ordering::SeqCst) {
                    self.insert(name, data[..data.len() / 2].to_vec());
                    return Err(StorageError::UploadFailed("connection reset".to_string()));
                }
                let len = data.len() as u64;
                self.insert(name, data.to_vec());
                if self.short_write.load(Ordering::SeqCst) {
                    return Ok(len.saturating_sub(1));
                }
                Ok(len)
            })
            .await
    }

    async fn delete(&self, _scope: &RequestScope, names: &[String]) -> StorageResult<Vec<String>> {
        let mut objects = self.objects.lock().unwrap();
        for name in names {
            self.events.lock().unwrap().push(format!("delete:{}", name));
            objects.remove(name);
        }
        Ok(Vec::new())
    }

    async fn thumb(
        &self,
        _scope: &RequestScope,
        request: &ThumbRequest<'_>,
    ) -> StorageResult<ContentResponse> {
        self.thumb_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("thumb:{}", request.thumb_name));

        let data = self
            .object(request.thumb_name)
            .ok_or_else(|| StorageError::NotFound(request.thumb_name.to_string()))?;

        match self.policy_type {
            PolicyType::Local => {
                let stream = futures::stream::iter(vec![Ok(Bytes::from(data))]);
                Ok(ContentResponse::inline(Box::pin(stream)))
            }
            _ => Ok(ContentResponse::redirect(format!(
                "https://cdn.example.com/{}?expires={}",
                request.thumb_name,
                request.expires_in.as_secs()
            ))),
        }
    }

    fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.has_local_paths
            .then(|| PathBuf::from("/srv/cumulus").join(name))
    }

    fn policy_type(&self) -> PolicyType {
        self.policy_type
    }
}

/// Hands out one fixed handler for every policy.
pub struct StaticHandlerProvider {
    handler: Arc<MemoryHandler>,
}

impl StaticHandlerProvider {
    pub fn new(handler: Arc<MemoryHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl HandlerProvider for StaticHandlerProvider {
    async fn handler_for(&self, _policy: &StoragePolicy) -> StorageResult<Arc<dyn StorageHandler>> {
        Ok(self.handler.clone())
    }
}

/// Frame extractor returning a generated JPEG instead of running ffmpeg.
pub struct FakeFrameExtractor {
    events: EventLog,
    width: u32,
    height: u32,
    delay: Duration,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    running: AtomicUsize,
    pub peak: AtomicUsize,
    /// Contents of sources that existed on disk when extraction ran.
    pub staged: Mutex<Vec<Vec<u8>>>,
}

impl FakeFrameExtractor {
    pub fn new(events: EventLog, width: u32, height: u32) -> Self {
        Self {
            events,
            width,
            height,
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            staged: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl FrameExtractor for FakeFrameExtractor {
    async fn extract_frame(&self, source: &Path, frame_index: u32) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("extract:{}:{}", source.display(), frame_index));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Ok(data) = tokio::fs::read(source).await {
            self.staged.lock().unwrap().push(data);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Invalid data found when processing input");
        }
        Ok(jpeg_bytes(self.width, self.height))
    }
}

#[derive(Default)]
pub struct CountingReclaim {
    pub calls: AtomicUsize,
}

impl ReclaimHook for CountingReclaim {
    fn reclaim(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A pipeline wired to in-memory collaborators.
pub struct Harness {
    pub pipeline: DerivativePipeline,
    pub settings: Arc<MemorySettings>,
    pub repo: Arc<MemoryFileRepository>,
    pub handler: Arc<MemoryHandler>,
    pub frames: Arc<FakeFrameExtractor>,
    pub events: EventLog,
}

pub struct HarnessBuilder {
    policy_type: PolicyType,
    capacity: usize,
    node_mode: NodeMode,
    frame_delay: Duration,
    local_paths: Option<bool>,
    reclaim: Option<Arc<dyn ReclaimHook>>,
}

impl HarnessBuilder {
    pub fn new(policy_type: PolicyType) -> Self {
        Self {
            policy_type,
            capacity: 2,
            node_mode: NodeMode::Master,
            frame_delay: Duration::ZERO,
            local_paths: None,
            reclaim: None,
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn node_mode(mut self, node_mode: NodeMode) -> Self {
        self.node_mode = node_mode;
        self
    }

    pub fn frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn local_paths(mut self, enabled: bool) -> Self {
        self.local_paths = Some(enabled);
        self
    }

    pub fn reclaim(mut self, reclaim: Arc<dyn ReclaimHook>) -> Self {
        self.reclaim = Some(reclaim);
        self
    }

    pub fn build(self) -> Harness {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let settings = Arc::new(MemorySettings::new());

        let repo = Arc::new(MemoryFileRepository::default());
        let mut policy = StoragePolicy::local(POLICY_ID, "test");
        policy.policy_type = self.policy_type;
        repo.insert_policy(policy);

        let mut handler = MemoryHandler::new(self.policy_type, events.clone());
        if let Some(enabled) = self.local_paths {
            handler.has_local_paths = enabled;
        }
        let handler = Arc::new(handler);

        let frames =
            Arc::new(FakeFrameExtractor::new(events.clone(), 640, 360).with_delay(self.frame_delay));

        let mut pipeline = DerivativePipeline::new(
            Arc::new(WorkerPool::with_capacity(self.capacity)),
            settings.clone(),
            repo.clone(),
            Arc::new(StaticHandlerProvider::new(handler.clone())),
            frames.clone(),
        )
        .with_node_mode(self.node_mode);
        if let Some(reclaim) = self.reclaim {
            pipeline = pipeline.with_reclaim_hook(reclaim);
        }

        Harness {
            pipeline,
            settings,
            repo,
            handler,
            frames,
            events,
        }
    }
}

impl Harness {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}
