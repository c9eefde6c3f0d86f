#![allow(dead_code)]

use kernel_alloc::{FrameAllocError, FrameAllocator, PhysicalFrames, ReleaseOutcome};
use kernel_info::layout::MemoryLayout;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};
use kernel_trap::{Device, TickCounter, TrapEnvironment, TrapFrame, TrapProcess};
use kernel_vmem::testing::TestPhys;
use kernel_vmem::{AddressSpace, PageEntryBits, TranslationCache};
use std::cell::{Cell, RefCell};

pub const BASE: u64 = 0x0010_0000;
pub const RAM_FRAMES: usize = 256;

pub const USER_VA: VirtualAddress = VirtualAddress::new(0x0000_0000_0040_3000);
pub const USER_CS: u64 = 0x1b;
pub const KERNEL_CS: u64 = 0x08;

/// Present + write + user.
pub const USER_WRITE_PROTECTION: u64 = 0b111;

pub type Frames = FrameAllocator<&'static TestPhys, 1024>;

/// Simulated RAM with a fully initialized frame allocator.
///
/// The first frame belongs to the "kernel image" and serves as the shared
/// all-zero placeholder for lazy-zero mappings.
pub struct Machine {
    pub ram: &'static TestPhys,
    pub frames: &'static Frames,
}

impl Machine {
    pub fn new() -> Self {
        let ram: &'static TestPhys = Box::leak(Box::new(TestPhys::new(PhysicalAddress::new(BASE), RAM_FRAMES)));
        let layout = MemoryLayout::new(PhysicalAddress::new(BASE + 0x1000), ram.end()).unwrap();
        let allocator: &'static mut Frames = Box::leak(Box::new(Frames::new(ram, layout).unwrap()));

        let (boot_start, boot_end) = layout.boot_range();
        let (rest_start, rest_end) = layout.remaining_range();
        let mut boot = allocator.boot();
        boot.release_range(boot_start, boot_end);
        let frames = boot.into_shared(rest_start, rest_end);

        Self { ram, frames }
    }

    pub fn zero_page(&self) -> PhysicalAddress {
        PhysicalAddress::new(BASE)
    }

    /// A fresh, empty address space.
    pub fn new_space(&self) -> PhysicalPage<Size4K> {
        let mut alloc = self.frames;
        AddressSpace::create(self.ram, &mut alloc).unwrap().root_page()
    }

    pub fn map(&self, root: PhysicalPage<Size4K>, va: VirtualAddress, entry: PageEntryBits) {
        let mut alloc = self.frames;
        AddressSpace::from_root(self.ram, root)
            .map_4k(&mut alloc, va, entry)
            .unwrap();
    }

    pub fn leaf(&self, root: PhysicalPage<Size4K>, va: VirtualAddress) -> PageEntryBits {
        AddressSpace::from_root(self.ram, root).walk(va).unwrap().load()
    }

    /// A freshly allocated frame filled with a recognizable pattern.
    pub fn frame_with_pattern(&self, seed: u8) -> PhysicalPage<Size4K> {
        let frame = self.frames.allocate().unwrap();
        self.ram.write(frame, &pattern(seed));
        frame
    }

    /// Allocate every remaining frame.
    pub fn exhaust(&self) -> Vec<PhysicalPage<Size4K>> {
        std::iter::from_fn(|| self.frames.allocate().ok()).collect()
    }
}

pub fn pattern(seed: u8) -> [u8; 4096] {
    let mut bytes = [0u8; 4096];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = seed.wrapping_add((i % 251) as u8);
    }
    bytes
}

/// Counts allocations made through it.
pub struct CountingFrames<'a, F: PhysicalFrames> {
    inner: &'a F,
    allocations: Cell<usize>,
}

impl<'a, F: PhysicalFrames> CountingFrames<'a, F> {
    pub fn new(inner: &'a F) -> Self {
        Self {
            inner,
            allocations: Cell::new(0),
        }
    }

    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }
}

impl<F: PhysicalFrames> PhysicalFrames for CountingFrames<'_, F> {
    type Mapper = F::Mapper;

    fn mapper(&self) -> &F::Mapper {
        self.inner.mapper()
    }

    fn allocate(&self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        self.allocations.set(self.allocations.get() + 1);
        self.inner.allocate()
    }

    fn release(&self, frame: PhysicalAddress) -> ReleaseOutcome {
        self.inner.release(frame)
    }

    fn increment_share(&self, frame: PhysicalAddress) -> u32 {
        self.inner.increment_share(frame)
    }

    fn decrement_share(&self, frame: PhysicalAddress) -> u32 {
        self.inner.decrement_share(frame)
    }

    fn share_count(&self, frame: PhysicalAddress) -> u32 {
        self.inner.share_count(frame)
    }
}

pub struct TestProcess {
    pub pid: u32,
    pub name: String,
    pub killed: Cell<bool>,
    pub root: PhysicalPage<Size4K>,
}

impl TestProcess {
    pub fn new(pid: u32, name: &str, root: PhysicalPage<Size4K>) -> Self {
        Self {
            pid,
            name: name.to_owned(),
            killed: Cell::new(false),
            root,
        }
    }
}

impl TrapProcess for TestProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_killed(&self) -> bool {
        self.killed.get()
    }

    fn kill(&self) {
        self.killed.set(true);
    }

    fn page_table_root(&self) -> PhysicalPage<Size4K> {
        self.root
    }
}

/// Side effects the dispatcher caused, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Syscall,
    Device(Device),
    Acknowledge,
    Wakeup(u64),
    Invalidate(VirtualPage<Size4K>),
    Exit,
}

pub struct TestEnv {
    pub machine: Machine,
    pub cpu: usize,
    pub process: Option<TestProcess>,
    pub fault_address: VirtualAddress,
    pub ticks: TickCounter,
    /// The system call marks the process killed.
    pub syscall_kills: bool,
    pub events: RefCell<Vec<Event>>,
}

impl TestEnv {
    /// CPU 0 running pid 1 in a fresh address space.
    pub fn new() -> Self {
        let machine = Machine::new();
        let root = machine.new_space();
        Self {
            process: Some(TestProcess::new(1, "init", root)),
            machine,
            cpu: 0,
            fault_address: VirtualAddress::new(0),
            ticks: TickCounter::new(),
            syscall_kills: false,
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn without_process() -> Self {
        Self {
            process: None,
            ..Self::new()
        }
    }

    pub fn process(&self) -> &TestProcess {
        self.process.as_ref().unwrap()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

pub fn frame(vector: u64, error_code: u64, cs: u64) -> TrapFrame {
    TrapFrame {
        vector,
        error_code,
        cs,
        rip: 0x40_1234,
        ..TrapFrame::default()
    }
}

impl TranslationCache for TestEnv {
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        self.record(Event::Invalidate(page));
    }
}

impl TrapEnvironment for TestEnv {
    type Process = TestProcess;
    type Frames = Frames;

    fn cpu_id(&self) -> usize {
        self.cpu
    }

    fn current_process(&self) -> Option<&TestProcess> {
        self.process.as_ref()
    }

    fn frames(&self) -> &Frames {
        self.machine.frames
    }

    fn fault_address(&self) -> VirtualAddress {
        self.fault_address
    }

    fn ticks(&self) -> &TickCounter {
        &self.ticks
    }

    fn wakeup_ticks(&self, now: u64) {
        self.record(Event::Wakeup(now));
    }

    fn syscall(&self, tf: &mut TrapFrame) {
        self.record(Event::Syscall);
        tf.rax = 0;
        if self.syscall_kills {
            self.process().kill();
        }
    }

    fn device_interrupt(&self, device: Device) {
        self.record(Event::Device(device));
    }

    fn acknowledge_interrupt(&self) {
        self.record(Event::Acknowledge);
    }

    fn exit(&self) {
        self.record(Event::Exit);
    }
}
