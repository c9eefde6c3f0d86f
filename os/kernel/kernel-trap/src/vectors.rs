//! Trap vector numbers and their classification.

/// `#PF`.
pub const PAGE_FAULT_VECTOR: u64 = 0x0E; // 14

/// `int 0x80` system calls.
pub const SYSCALL_VECTOR: u64 = 0x80; // 128

/// First vector of the remapped hardware IRQs.
pub const T_IRQ0: u64 = 32;

pub const IRQ_TIMER: u64 = 0;
pub const IRQ_KBD: u64 = 1;
pub const IRQ_COM1: u64 = 4;
pub const IRQ_IDE: u64 = 14;
pub const IRQ_SPURIOUS: u64 = 31;

/// Devices with an external interrupt handler.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Device {
    /// Primary IDE controller.
    Ide,
    Keyboard,
    /// Serial port COM1.
    Serial,
}

/// What a trap vector means to the dispatcher.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TrapCause {
    Syscall,
    Timer,
    Device(Device),
    /// Secondary IDE line; some emulators raise it spuriously.
    SecondaryIde,
    /// IRQ 7 or the APIC spurious vector.
    Spurious,
    PageFault,
    /// Any other exception or interrupt.
    Other(u64),
}

impl TrapCause {
    #[must_use]
    pub const fn from_vector(vector: u64) -> Self {
        const TIMER: u64 = T_IRQ0 + IRQ_TIMER;
        const KBD: u64 = T_IRQ0 + IRQ_KBD;
        const COM1: u64 = T_IRQ0 + IRQ_COM1;
        const IRQ7: u64 = T_IRQ0 + 7;
        const IDE: u64 = T_IRQ0 + IRQ_IDE;
        const IDE2: u64 = T_IRQ0 + IRQ_IDE + 1;
        const SPURIOUS: u64 = T_IRQ0 + IRQ_SPURIOUS;

        match vector {
            SYSCALL_VECTOR => Self::Syscall,
            PAGE_FAULT_VECTOR => Self::PageFault,
            TIMER => Self::Timer,
            KBD => Self::Device(Device::Keyboard),
            COM1 => Self::Device(Device::Serial),
            IDE => Self::Device(Device::Ide),
            IDE2 => Self::SecondaryIde,
            IRQ7 | SPURIOUS => Self::Spurious,
            v => Self::Other(v),
        }
    }
}
