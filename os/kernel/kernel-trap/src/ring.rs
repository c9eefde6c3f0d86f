/// CPU privilege rings (0–3).
///
/// The ring a trap came from is the **Current Privilege Level** of the
/// interrupted code, i.e. the low two bits of the saved `CS` selector.
///
/// | Ring | Typical Use |
/// |------|-------------|
/// | **Ring 0** | Kernel / supervisor mode |
/// | **Ring 1** | unused |
/// | **Ring 2** | unused |
/// | **Ring 3** | User-mode processes |
///
/// Only ring 3 counts as user mode; a trap from rings 0–2 is treated as
/// the kernel's own doing.
///
/// See also: Intel SDM Vol. 3A, §5.5 “Privilege Levels”.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Ring {
    /// Kernel or supervisor mode.
    Ring0 = 0,
    Ring1 = 1,
    Ring2 = 2,
    /// User-mode applications.
    Ring3 = 3,
}

impl Ring {
    /// Privilege level encoded in a segment selector.
    #[inline]
    #[must_use]
    pub const fn from_selector(selector: u64) -> Self {
        match selector & 0b11 {
            0 => Self::Ring0,
            1 => Self::Ring1,
            2 => Self::Ring2,
            _ => Self::Ring3,
        }
    }

    #[inline]
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn is_user(self) -> bool {
        matches!(self, Self::Ring3)
    }
}

impl From<Ring> for u8 {
    #[inline]
    fn from(r: Ring) -> Self {
        r.to_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_comes_from_the_selector_rpl_bits() {
        assert_eq!(Ring::from_selector(0x08), Ring::Ring0);
        assert_eq!(Ring::from_selector(0x1b), Ring::Ring3);
        assert_eq!(Ring::from_selector(0x23), Ring::Ring3);
        assert_eq!(Ring::from_selector(0x09), Ring::Ring1);
        assert!(Ring::Ring3.is_user());
        assert!(!Ring::Ring1.is_user());
        assert_eq!(u8::from(Ring::Ring2), 2);
    }
}
