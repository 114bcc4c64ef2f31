// Memory reclamation capability
//
// Rust has no collector to force. What the process can do is hand freed heap
// pages back to the OS, which is what the allocator reclaimer does on glibc.

/// Capability to force a reclamation pass.
pub trait Reclaimer: Send + Sync {
    /// Whether `collect` does anything on this platform
    fn supports_collection(&self) -> bool;

    /// Run one reclamation pass; returns true if memory was handed back
    fn collect(&self) -> bool;
}

/// Trims the glibc allocator's free lists back to the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllocatorReclaimer;

impl Reclaimer for AllocatorReclaimer {
    fn supports_collection(&self) -> bool {
        cfg!(all(target_os = "linux", target_env = "gnu"))
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn collect(&self) -> bool {
        // SAFETY: malloc_trim only walks the allocator's own arenas and takes
        // the arena locks itself.
        unsafe { libc::malloc_trim(0) != 0 }
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn collect(&self) -> bool {
        false
    }
}

/// Reclaimer that never does anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReclaimer;

impl Reclaimer for NoopReclaimer {
    fn supports_collection(&self) -> bool {
        false
    }

    fn collect(&self) -> bool {
        false
    }
}
