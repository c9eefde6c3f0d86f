use crate::ring::Ring;

/// Register state saved by the common trap entry stub.
///
/// Layout must match the push order of the stub: general-purpose registers
/// first (last pushed at the lowest address), then the vector and error code
/// pushed by the per-vector stub, then what the CPU pushed itself.
///
/// ```text
///   +0    rax .. r15     (15 × 8)
///   +120  vector
///   +128  error_code     (0 for vectors without one)
///   +136  rip
///   +144  cs
///   +152  rflags
///   +160  rsp
///   +168  ss
/// ```
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct TrapFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

const _: () = assert!(core::mem::offset_of!(TrapFrame, vector) == 120);
const _: () = assert!(core::mem::offset_of!(TrapFrame, ss) == 168);

impl TrapFrame {
    /// Privilege level of the interrupted code.
    #[inline]
    #[must_use]
    pub const fn ring(&self) -> Ring {
        Ring::from_selector(self.cs)
    }
}
