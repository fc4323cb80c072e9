//! Per-consumer image load session.
//!
//! A session follows a changing target URL and publishes the image for the
//! latest target only. Results for superseded targets are dropped when they
//! arrive; the underlying request is not aborted.

use std::sync::Arc;

use image::DynamicImage;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::domain::entities::{LoadedImage, SessionPhase};
use crate::domain::ports::{CacheResult, ImageResolverPort};

/// Value observed by consumers: the image for the current target, if settled.
pub type PublishedImage = Option<Arc<DynamicImage>>;

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    generation: u64,
}

struct SessionInner {
    resolver: Arc<dyn ImageResolverPort>,
    state: Mutex<SessionState>,
    image_tx: watch::Sender<PublishedImage>,
}

impl SessionInner {
    fn complete(&self, generation: u64, url: &str, result: CacheResult<LoadedImage>) {
        let mut state = self.state.lock();
        if state.generation != generation || state.phase.url() != Some(url) {
            trace!(url, "Discarding result for superseded target");
            return;
        }

        match result {
            Ok(loaded) => {
                debug!(url, source = %loaded.source, "Image settled");
                state.phase = SessionPhase::Settled(url.to_string());
                self.image_tx.send_replace(Some(loaded.image));
            }
            Err(e) => {
                debug!(url, error = %e, "Image resolution failed");
                state.phase = SessionPhase::Failed(url.to_string());
            }
        }
    }

    fn clear_published(&self) {
        self.image_tx.send_if_modified(|current| current.take().is_some());
    }
}

/// Resolves a consumer's target URL through an injected resolver and
/// publishes the result over a `watch` channel.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct ImageLoadSession {
    inner: Arc<SessionInner>,
    runtime: Handle,
}

impl std::fmt::Debug for ImageLoadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoadSession")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl ImageLoadSession {
    /// Creates an idle session that spawns resolutions on the current runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(resolver: Arc<dyn ImageResolverPort>) -> Self {
        Self::with_runtime(resolver, Handle::current())
    }

    /// Creates an idle session that spawns resolutions on `runtime`.
    /// `set_target` may then be called from threads outside the runtime.
    #[must_use]
    pub fn with_runtime(resolver: Arc<dyn ImageResolverPort>, runtime: Handle) -> Self {
        let (image_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner {
                resolver,
                state: Mutex::new(SessionState::default()),
                image_tx,
            }),
            runtime,
        }
    }

    /// Points the session at `url`, or detaches it with `None`.
    ///
    /// Re-targeting the URL that is already resolving or settled does nothing.
    /// A failed target is retried. Any published image is withdrawn as soon as
    /// the target changes.
    pub fn set_target(&self, url: Option<&str>) {
        let Some(url) = url else {
            self.detach();
            return;
        };

        let mut state = self.inner.state.lock();
        if matches!(
            &state.phase,
            SessionPhase::Resolving(current) | SessionPhase::Settled(current) if current == url
        ) {
            trace!(url, "Target unchanged");
            return;
        }

        state.generation += 1;
        let generation = state.generation;

        match self.inner.resolver.cached(url) {
            Ok(Some(loaded)) => {
                trace!(url, "Settled from memory");
                state.phase = SessionPhase::Settled(url.to_string());
                self.inner.image_tx.send_replace(Some(loaded.image));
                return;
            }
            Ok(None) => {}
            Err(e) => {
                debug!(url, error = %e, "Rejected image target");
                state.phase = SessionPhase::Failed(url.to_string());
                self.inner.clear_published();
                return;
            }
        }

        state.phase = SessionPhase::Resolving(url.to_string());
        self.inner.clear_published();
        drop(state);

        let inner = self.inner.clone();
        let url = url.to_string();
        self.runtime.spawn(async move {
            let result = inner.resolver.resolve_uncached(&url).await;
            inner.complete(generation, &url, result);
        });
    }

    fn detach(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == SessionPhase::Idle {
            return;
        }
        state.generation += 1;
        state.phase = SessionPhase::Idle;
        self.inner.clear_published();
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase.clone()
    }

    /// Returns the current target URL.
    #[must_use]
    pub fn target(&self) -> Option<String> {
        self.inner.state.lock().phase.url().map(str::to_string)
    }

    /// Returns the published image, if any.
    #[must_use]
    pub fn current_image(&self) -> PublishedImage {
        self.inner.image_tx.borrow().clone()
    }

    /// Subscribes to published image changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PublishedImage> {
        self.inner.image_tx.subscribe()
    }
}
