use crate::{PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Virtual page base for size `S`.
///
/// This is the unit of translation-cache invalidation: after a fault is
/// resolved, the page (not the exact faulting address) is flushed.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    /// The page containing `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(addr: VirtualAddress) -> Self {
        Self {
            base: addr.as_u64() & !S::OFFSET_MASK,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.base)
    }
}

impl<S: PageSize> fmt::Display for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{}>({:#018X})", S::as_str(), self.base)
    }
}
