use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::PhysMapper;

/// Header stored at the beginning of every **free** frame.
///
/// ```text
/// +----------------------+-------------------------+
/// | FreeFrame (header)   |   junk bytes            |
/// +----------------------+-------------------------+
/// ^ frame base           ^ frame base + 8
/// ```
#[repr(C)]
struct FreeFrame {
    /// Physical address of the next free frame, or [`END_OF_LIST`].
    next: u64,
}

const END_OF_LIST: u64 = u64::MAX;

/// LIFO stack of free frames, threaded through the frames themselves.
///
/// Order carries no meaning; push and pop are O(1) and need no memory
/// besides the frames on the list.
///
/// # Invariants
/// - Every frame on the list is owned by the list and mapped by the mapper
///   passed to [`push`](Self::push) and [`pop`](Self::pop).
/// - `len` equals the number of frames reachable from `head`.
pub(crate) struct FreeList {
    head: Option<PhysicalPage<Size4K>>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Put `frame` on top of the stack.
    ///
    /// # Safety
    /// - `frame` must not be on the list already and must not be used by
    ///   anybody else from now on.
    /// - `mapper` must reach `frame`.
    pub(crate) unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, frame: PhysicalPage<Size4K>) {
        let next = self.head.map_or(END_OF_LIST, |h| h.base().as_u64());
        let node = mapper.phys_to_ptr::<FreeFrame>(frame.base());
        // SAFETY: the frame is ours per contract; frames are 4 KiB aligned.
        unsafe { node.write(FreeFrame { next }) };
        self.head = Some(frame);
        self.len += 1;
    }

    /// Take the frame on top of the stack.
    ///
    /// # Safety
    /// `mapper` must reach every frame on the list.
    pub(crate) unsafe fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<PhysicalPage<Size4K>> {
        let frame = self.head?;
        let node = mapper.phys_to_ptr::<FreeFrame>(frame.base());
        // SAFETY: the header was written by `push` and nobody else owns the frame.
        let next = unsafe { node.read() }.next;
        self.head = (next != END_OF_LIST).then(|| PhysicalAddress::new(next).page());
        self.len -= 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::testing::TestPhys;

    #[test]
    fn pops_in_reverse_push_order() {
        let ram = TestPhys::new(PhysicalAddress::new(0x0010_0000), 3);
        let frames: Vec<_> = (0..3u64)
            .map(|i| PhysicalAddress::new(0x0010_0000 + i * 0x1000).page::<Size4K>())
            .collect();

        let mut list = FreeList::new();
        for f in &frames {
            unsafe { list.push(&ram, *f) };
        }
        assert_eq!(list.len(), 3);

        let popped: Vec<_> = std::iter::from_fn(|| unsafe { list.pop(&ram) }).collect();
        assert_eq!(popped, [frames[2], frames[1], frames[0]]);
        assert_eq!(list.len(), 0);
        assert!(unsafe { list.pop(&ram) }.is_none());
    }

    #[test]
    fn link_lives_in_the_first_bytes_of_the_frame() {
        let ram = TestPhys::new(PhysicalAddress::new(0x0010_0000), 2);
        let a = PhysicalAddress::new(0x0010_0000).page::<Size4K>();
        let b = PhysicalAddress::new(0x0010_1000).page::<Size4K>();

        let mut list = FreeList::new();
        unsafe {
            list.push(&ram, a);
            list.push(&ram, b);
        }

        let header = ram.read(b);
        assert_eq!(u64::from_ne_bytes(header[..8].try_into().unwrap()), 0x0010_0000);
        assert!(ram.read(b)[8..].iter().all(|&x| x == 0), "rest untouched");
    }
}
