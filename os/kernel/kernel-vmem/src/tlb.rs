//! Translation lookaside buffer maintenance.
//!
//! Whoever rewrites a live leaf entry must drop the cached translation of
//! that page before the new entry is relied upon.

use kernel_memory_addresses::{Size4K, VirtualPage};

/// Invalidation of cached translations after a leaf entry changed.
pub trait TranslationCache {
    /// Drop any cached translation of `page` on the current core.
    fn invalidate_page(&self, page: VirtualPage<Size4K>);
}

impl<T: TranslationCache + ?Sized> TranslationCache for &T {
    #[inline]
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        (**self).invalidate_page(page);
    }
}

/// `invlpg` on the executing core.
///
/// Requires CPL 0; executing it in user mode raises `#GP`.
#[cfg(target_arch = "x86_64")]
#[derive(Copy, Clone, Debug, Default)]
pub struct Invlpg;

#[cfg(target_arch = "x86_64")]
impl TranslationCache for Invlpg {
    #[inline]
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        // SAFETY: invalidation only drops cached state; privilege per type docs.
        unsafe {
            core::arch::asm!(
                "invlpg [{}]",
                in(reg) page.base().as_u64(),
                options(nostack, preserves_flags)
            );
        }
    }
}
