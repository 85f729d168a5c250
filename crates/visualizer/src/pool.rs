use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glcontext::Context;
use parking_lot::Mutex;
use tracing::debug;

use crate::caps::VideoInfo;
use crate::frame::VideoFrame;

/// Options a pool configuration can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOption {
    VideoMeta,
    GlSyncMeta,
    GlTextureUploadMeta,
}

/// Metadata APIs downstream may request in an allocation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaApi {
    Video,
    GlSync,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("buffer pool has no configuration")]
    NotConfigured,
    #[error("buffer size {size} is smaller than a {expected}-byte frame")]
    SizeTooSmall { size: usize, expected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub caps: VideoInfo,
    pub size: usize,
    pub min_buffers: u32,
    pub max_buffers: u32,
    options: Vec<PoolOption>,
}

impl PoolConfig {
    pub fn new(caps: VideoInfo, size: usize, min_buffers: u32, max_buffers: u32) -> Self {
        Self {
            caps,
            size,
            min_buffers,
            max_buffers,
            options: Vec::new(),
        }
    }

    pub fn add_option(&mut self, option: PoolOption) {
        if !self.options.contains(&option) {
            self.options.push(option);
        }
    }

    pub fn has_option(&self, option: PoolOption) -> bool {
        self.options.contains(&option)
    }

    pub fn options(&self) -> &[PoolOption] {
        &self.options
    }
}

#[derive(Debug)]
enum PoolKind {
    System,
    Gl(Context),
}

/// Allocator of output frames. Clones share the pool.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    kind: PoolKind,
    config: Mutex<Option<PoolConfig>>,
    allocated: AtomicUsize,
}

impl BufferPool {
    /// A plain system-memory pool, as a downstream element might propose.
    pub fn system() -> Self {
        Self::with_kind(PoolKind::System)
    }

    /// A pool whose buffers are GL memory of `context`.
    pub fn gl(context: Context) -> Self {
        Self::with_kind(PoolKind::Gl(context))
    }

    fn with_kind(kind: PoolKind) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                kind,
                config: Mutex::new(None),
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_gl(&self) -> bool {
        matches!(self.inner.kind, PoolKind::Gl(_))
    }

    pub fn gl_context(&self) -> Option<&Context> {
        match &self.inner.kind {
            PoolKind::Gl(context) => Some(context),
            PoolKind::System => None,
        }
    }

    pub fn set_config(&self, config: PoolConfig) -> Result<(), PoolError> {
        let expected = config.caps.size();
        if config.size < expected {
            return Err(PoolError::SizeTooSmall {
                size: config.size,
                expected,
            });
        }
        *self.inner.config.lock() = Some(config);
        Ok(())
    }

    pub fn config(&self) -> Option<PoolConfig> {
        self.inner.config.lock().clone()
    }

    /// Allocates a zeroed frame in the configured format.
    pub fn acquire_frame(&self) -> Result<VideoFrame, PoolError> {
        let config = self.inner.config.lock();
        let config = config.as_ref().ok_or(PoolError::NotConfigured)?;
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(VideoFrame::new(config.caps))
    }

    /// Frames handed out so far.
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    pub fn ptr_eq(&self, other: &BufferPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// One pool entry of an allocation query.
#[derive(Debug, Clone)]
pub struct AllocationProposal {
    pub pool: Option<BufferPool>,
    pub size: usize,
    pub min_buffers: u32,
    pub max_buffers: u32,
}

/// Downstream's answer to "how should output buffers be allocated".
#[derive(Debug, Clone)]
pub struct AllocationQuery {
    pub caps: VideoInfo,
    pools: Vec<AllocationProposal>,
    metas: Vec<MetaApi>,
}

impl AllocationQuery {
    pub fn new(caps: VideoInfo) -> Self {
        Self {
            caps,
            pools: Vec::new(),
            metas: Vec::new(),
        }
    }

    pub fn add_allocation_pool(&mut self, proposal: AllocationProposal) {
        self.pools.push(proposal);
    }

    pub fn set_nth_allocation_pool(&mut self, index: usize, proposal: AllocationProposal) {
        self.pools[index] = proposal;
    }

    pub fn allocation_pools(&self) -> &[AllocationProposal] {
        &self.pools
    }

    pub fn add_allocation_meta(&mut self, api: MetaApi) {
        if !self.metas.contains(&api) {
            self.metas.push(api);
        }
    }

    pub fn has_allocation_meta(&self, api: MetaApi) -> bool {
        self.metas.contains(&api)
    }
}

/// Picks and configures the output pool for `query`.
///
/// A GL pool proposed downstream is kept; anything else is replaced by a GL
/// pool bound to `context`. The chosen pool is written back to the query as
/// entry 0 (replacing an existing proposal) and returned.
pub fn negotiate_pool(
    query: &mut AllocationQuery,
    context: &Context,
) -> Result<BufferPool, PoolError> {
    let frame_size = query.caps.size();
    let proposed = query.allocation_pools().first().cloned();
    let update = proposed.is_some();

    let (pool, size, min, max) = match proposed {
        Some(AllocationProposal {
            pool: Some(pool),
            size,
            min_buffers,
            max_buffers,
        }) if pool.is_gl() => (pool, size.max(frame_size), min_buffers, max_buffers),
        Some(proposal) => {
            debug!(
                proposed_gl = false,
                size = frame_size,
                "replacing proposed pool with a GL pool"
            );
            (
                BufferPool::gl(context.clone()),
                frame_size,
                proposal.min_buffers,
                proposal.max_buffers,
            )
        }
        None => (BufferPool::gl(context.clone()), frame_size, 0, 0),
    };

    let mut config = PoolConfig::new(query.caps, size, min, max);
    config.add_option(PoolOption::VideoMeta);
    if query.has_allocation_meta(MetaApi::GlSync) {
        config.add_option(PoolOption::GlSyncMeta);
    }
    config.add_option(PoolOption::GlTextureUploadMeta);
    pool.set_config(config)?;

    let proposal = AllocationProposal {
        pool: Some(pool.clone()),
        size,
        min_buffers: min,
        max_buffers: max,
    };
    if update {
        query.set_nth_allocation_pool(0, proposal);
    } else {
        query.add_allocation_pool(proposal);
    }
    debug!(size, min, max, "configured output pool");
    Ok(pool)
}
