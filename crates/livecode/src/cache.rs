use crate::client::Executor;
use crate::error::LivecodeError;
use crate::render::{render_svg, DEFAULT_IMAGE};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::FutureExt;
use protocol::{RuntimeVariant, Shape};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const RENDER_KEY_PREFIX: &str = "render-";
pub const SKETCH_KEY_PREFIX: &str = "sketch-";
const SKETCH_KEY_SUFFIX: &str = "-sketch";

/// Shared key-value store behind the render cache. Implementations must
/// tolerate concurrent get/set from independent callers.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache poisoned"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// One file per key under `root`.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.svg", encode_file_name(key)))
    }
}

/// `[A-Za-z0-9-]` pass through; every other byte, `_` included, becomes
/// `_xx`, so distinct keys never share a file.
fn encode_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_{byte:02x}"));
        }
    }
    name
}

#[async_trait]
impl KeyValueCache for DirCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read cache entry {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create cache dir {}", self.root.display()))?;
        let path = self.path_for(key);
        let staging = path.with_extension("svg.tmp");
        tokio::fs::write(&staging, value)
            .await
            .with_context(|| format!("write cache entry {}", staging.display()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("commit cache entry {}", path.display()))?;
        Ok(())
    }
}

pub fn content_hash(code: &str) -> String {
    format!("{:x}", md5::compute(code.as_bytes()))
}

/// Standard-variant keys are `prefix + md5(code)`; the sketch variant gets
/// its own suffix so the two environments never share an entry.
pub fn cache_key(prefix: &str, code: &str, variant: RuntimeVariant) -> String {
    let mut key = format!("{prefix}{}", content_hash(code));
    if variant.is_sketch() {
        key.push_str(SKETCH_KEY_SUFFIX);
    }
    key
}

/// Renders code to SVG, reusing cached renders. Never fails: anything that
/// goes wrong degrades to [`DEFAULT_IMAGE`].
#[derive(Clone)]
pub struct RenderCache {
    cache: Arc<dyn KeyValueCache>,
    executor: Arc<dyn Executor>,
    prefix: String,
}

impl RenderCache {
    pub fn new(cache: Arc<dyn KeyValueCache>, executor: Arc<dyn Executor>) -> Self {
        Self {
            cache,
            executor,
            prefix: RENDER_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn key(&self, code: &str, variant: RuntimeVariant) -> String {
        cache_key(&self.prefix, code, variant)
    }

    pub async fn render(&self, code: &str, variant: RuntimeVariant) -> String {
        let key = self.key(code, variant);
        if let Some(svg) = self.lookup(&key).await {
            tracing::debug!(event = "render_cache_hit", key = %key);
            return svg;
        }

        let rendered = AssertUnwindSafe(self.render_fresh(code, variant))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(LivecodeError::RenderFailure("render task panicked".to_string()).into())
            });
        match rendered {
            Ok(Some(svg)) => {
                if let Err(err) = self.cache.set(&key, svg.as_bytes()).await {
                    tracing::warn!(event = "render_cache_store_failed", key = %key, error = %err);
                }
                svg
            }
            Ok(None) => DEFAULT_IMAGE.to_string(),
            Err(err) => {
                tracing::warn!(event = "render_failed", key = %key, error = %err);
                DEFAULT_IMAGE.to_string()
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(svg) if !svg.is_empty() => Some(svg),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(event = "render_cache_corrupt", key, error = %err);
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(event = "render_cache_read_failed", key, error = %err);
                None
            }
        }
    }

    /// `Ok(None)` when the run failed; failed runs are never cached.
    async fn render_fresh(
        &self,
        code: &str,
        variant: RuntimeVariant,
    ) -> anyhow::Result<Option<String>> {
        let result = self.executor.execute(code, variant).await?;
        if !result.is_success() {
            tracing::info!(
                event = "render_skipped",
                error_code = ?result.error_code,
                "execution did not succeed"
            );
            return Ok(None);
        }
        let svg = render_guarded(&result.shapes)?;
        Ok(Some(svg).filter(|svg| !svg.is_empty()))
    }
}

fn render_guarded(shapes: &[Shape]) -> Result<String, LivecodeError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| render_svg(shapes)))
        .map_err(|_| LivecodeError::RenderFailure("renderer panicked".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ExecutionResult, FailureReason};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExecutor {
        calls: AtomicUsize,
        outcomes: Mutex<Vec<anyhow::Result<ExecutionResult>>>,
    }

    impl FakeExecutor {
        fn new(outcomes: Vec<anyhow::Result<ExecutionResult>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcomes: Mutex::new(outcomes),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(
            &self,
            _code: &str,
            _variant: RuntimeVariant,
        ) -> anyhow::Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                anyhow::bail!("no scripted outcome");
            }
            outcomes.remove(0)
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        async fn execute(
            &self,
            _code: &str,
            _variant: RuntimeVariant,
        ) -> anyhow::Result<ExecutionResult> {
            panic!("executor blew up");
        }
    }

    /// Store whose reads return `stored` (or fail) and whose writes may fail.
    struct UnreliableCache {
        stored: Option<Vec<u8>>,
        fail_get: bool,
        fail_set: bool,
        writes: AtomicUsize,
    }

    impl UnreliableCache {
        fn new(stored: Option<Vec<u8>>, fail_get: bool, fail_set: bool) -> Arc<Self> {
            Arc::new(Self {
                stored,
                fail_get,
                fail_set,
                writes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl KeyValueCache for UnreliableCache {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            if self.fail_get {
                anyhow::bail!("cache backend unreachable");
            }
            Ok(self.stored.clone())
        }

        async fn set(&self, _key: &str, _value: &[u8]) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                anyhow::bail!("cache backend read-only");
            }
            Ok(())
        }
    }

    fn success_with_circle() -> ExecutionResult {
        let mut result = ExecutionResult::default();
        result.add_shape(Shape::new("circle").attr("r", 50).attr("fill", "red"));
        result.finish(Some(0));
        result
    }

    fn connection_failure() -> ExecutionResult {
        ExecutionResult::connection_failed()
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().expect("runtime")
    }

    #[test]
    fn second_render_is_served_from_cache() {
        runtime().block_on(async {
            let store = Arc::new(MemoryCache::new());
            let executor = FakeExecutor::new(vec![Ok(success_with_circle())]);
            let cache = RenderCache::new(store.clone(), executor.clone());

            let first = cache.render("circle()", RuntimeVariant::Standard).await;
            let second = cache.render("circle()", RuntimeVariant::Standard).await;

            assert!(first.contains(r#"<circle r="50" fill="red" />"#));
            assert_eq!(first, second);
            assert_eq!(executor.calls(), 1);
            assert_eq!(store.len(), 1);
        });
    }

    #[test]
    fn failed_execution_returns_placeholder_and_leaves_cache_alone() {
        runtime().block_on(async {
            let store = Arc::new(MemoryCache::new());
            let executor =
                FakeExecutor::new(vec![Ok(connection_failure()), Ok(success_with_circle())]);
            let cache = RenderCache::new(store.clone(), executor.clone());

            let first = cache.render("circle()", RuntimeVariant::Standard).await;
            assert_eq!(first, DEFAULT_IMAGE);
            assert!(store.is_empty());

            let second = cache.render("circle()", RuntimeVariant::Standard).await;
            assert!(second.contains("<circle"));
            assert_eq!(store.len(), 1);
            assert_eq!(executor.calls(), 2);
        });
    }

    #[test]
    fn executor_errors_and_panics_degrade_to_placeholder() {
        runtime().block_on(async {
            let store = Arc::new(MemoryCache::new());
            let failing = FakeExecutor::new(vec![Err(anyhow::anyhow!("sandbox exploded"))]);
            let cache = RenderCache::new(store.clone(), failing);
            assert_eq!(cache.render("x", RuntimeVariant::Standard).await, DEFAULT_IMAGE);

            let cache = RenderCache::new(store.clone(), Arc::new(PanickingExecutor));
            assert_eq!(cache.render("x", RuntimeVariant::Standard).await, DEFAULT_IMAGE);
            assert!(store.is_empty());
        });
    }

    #[test]
    fn nonzero_exit_is_not_cached() {
        runtime().block_on(async {
            let store = Arc::new(MemoryCache::new());
            let mut result = success_with_circle();
            result.finish(Some(2));
            assert_eq!(result.error_code, Some(FailureReason::NonzeroExit));
            let cache = RenderCache::new(store.clone(), FakeExecutor::new(vec![Ok(result)]));
            assert_eq!(cache.render("x", RuntimeVariant::Standard).await, DEFAULT_IMAGE);
            assert!(store.is_empty());
        });
    }

    #[test]
    fn warm_entry_skips_execution() {
        runtime().block_on(async {
            let store = Arc::new(MemoryCache::new());
            let key = cache_key(RENDER_KEY_PREFIX, "draw()", RuntimeVariant::Standard);
            store.set(&key, b"<svg>cached</svg>").await.unwrap();
            let executor = FakeExecutor::new(Vec::new());
            let cache = RenderCache::new(store, executor.clone());
            assert_eq!(
                cache.render("draw()", RuntimeVariant::Standard).await,
                "<svg>cached</svg>"
            );
            assert_eq!(executor.calls(), 0);
        });
    }

    #[test]
    fn undecodable_cached_value_is_a_miss() {
        runtime().block_on(async {
            let store = UnreliableCache::new(Some(vec![0xff, 0xfe, 0x00]), false, false);
            let executor = FakeExecutor::new(vec![Ok(success_with_circle())]);
            let cache = RenderCache::new(store.clone(), executor.clone());
            let svg = cache.render("circle()", RuntimeVariant::Standard).await;
            assert!(svg.contains("<circle"));
            assert_eq!(executor.calls(), 1);
            assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn failing_lookup_is_a_miss() {
        runtime().block_on(async {
            let store = UnreliableCache::new(Some(b"<svg>stale</svg>".to_vec()), true, false);
            let executor = FakeExecutor::new(vec![Ok(success_with_circle())]);
            let cache = RenderCache::new(store, executor.clone());
            let svg = cache.render("circle()", RuntimeVariant::Standard).await;
            assert!(svg.contains("<circle"));
            assert_eq!(executor.calls(), 1);
        });
    }

    #[test]
    fn failing_store_still_returns_render() {
        runtime().block_on(async {
            let store = UnreliableCache::new(None, false, true);
            let executor = FakeExecutor::new(vec![Ok(success_with_circle())]);
            let cache = RenderCache::new(store.clone(), executor);
            let svg = cache.render("circle()", RuntimeVariant::Standard).await;
            assert!(svg.contains(r#"<circle r="50" fill="red" />"#));
            assert_ne!(svg, DEFAULT_IMAGE);
            assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn keys_are_content_addressed_and_variant_aware() {
        let standard = cache_key(SKETCH_KEY_PREFIX, "print(1)", RuntimeVariant::Standard);
        assert_eq!(standard, format!("sketch-{:x}", md5::compute(b"print(1)")));
        let sketch = cache_key(SKETCH_KEY_PREFIX, "print(1)", RuntimeVariant::Sketch);
        assert_ne!(standard, sketch);
        assert_eq!(
            standard,
            cache_key(SKETCH_KEY_PREFIX, "print(1)", RuntimeVariant::Standard)
        );
    }

    #[test]
    fn dir_cache_persists_entries() {
        let dir = std::env::temp_dir().join(format!("livecode-cache-{}", uuid::Uuid::new_v4()));
        runtime().block_on(async {
            let cache = DirCache::new(&dir);
            assert_eq!(cache.get("render-abc").await.unwrap(), None);
            cache.set("render-abc", b"<svg/>").await.unwrap();
            assert_eq!(cache.get("render-abc").await.unwrap(), Some(b"<svg/>".to_vec()));
        });
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn dir_cache_keeps_similar_keys_apart() {
        assert_eq!(encode_file_name("render-ab12-sketch"), "render-ab12-sketch");
        assert_eq!(encode_file_name("a.b"), "a_2eb");
        assert_eq!(encode_file_name("a_b"), "a_5fb");

        let dir = std::env::temp_dir().join(format!("livecode-cache-{}", uuid::Uuid::new_v4()));
        runtime().block_on(async {
            let cache = DirCache::new(&dir);
            cache.set("a.b", b"<svg>dot</svg>").await.unwrap();
            cache.set("a_b", b"<svg>underscore</svg>").await.unwrap();
            cache.set("a/b", b"<svg>slash</svg>").await.unwrap();
            assert_eq!(cache.get("a.b").await.unwrap(), Some(b"<svg>dot</svg>".to_vec()));
            assert_eq!(cache.get("a_b").await.unwrap(), Some(b"<svg>underscore</svg>".to_vec()));
            assert_eq!(cache.get("a/b").await.unwrap(), Some(b"<svg>slash</svg>".to_vec()));
        });
        std::fs::remove_dir_all(&dir).ok();
    }
}
