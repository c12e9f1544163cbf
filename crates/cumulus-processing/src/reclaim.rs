//! Post-generation memory reclamation

/// Invoked after a thumbnail is rendered when `thumb_gc_after_gen` is on.
///
/// Decoder buffers are already dropped at that point; a hook can ask the
/// allocator to return memory to the OS.
pub trait ReclaimHook: Send + Sync {
    fn reclaim(&self);
}

/// Does nothing; Rust frees buffers deterministically on drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReclaim;

impl ReclaimHook for NoopReclaim {
    fn reclaim(&self) {}
}
