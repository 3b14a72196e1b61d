//! Intrusive doubly-linked ring for run queues
//!
//! Nodes live inside the entities they link (`Links` is embedded as a field),
//! so insert and remove are O(1) and never allocate. The list is anchored on a
//! heap-allocated sentinel node: an empty list is a sentinel whose `next`
//! points back at itself.
//!
//! The owning entity is recovered from a node address through a constant
//! field offset supplied by the [`Linked`] impl. Use [`linked!`] to derive it:
//!
//! ```ignore
//! use strand_core::list::{Links, List};
//!
//! struct Job {
//!     id: u32,
//!     links: Links,
//! }
//!
//! strand_core::linked!(Job, links);
//!
//! let mut queue: List<Job> = List::new();
//! let job = Box::into_raw(Box::new(Job { id: 1, links: Links::new() }));
//! unsafe { queue.push_back(NonNull::new_unchecked(job)) };
//! ```
//!
//! # Contract
//!
//! The list does not own its members. Callers must guarantee that a node is
//! not linked into another ring when inserting it, and that a linked entity
//! is neither moved nor freed until it has been removed. There is no
//! defensive check for double insertion; [`Links::is_linked`] is the guard
//! callers use to enforce it.

use core::cell::Cell;
use core::fmt;
use core::marker::{PhantomData, PhantomPinned};
use core::ptr::{self, NonNull};

/// Linkage node embedded in a list member.
///
/// Both pointers are null while the node is unlinked.
pub struct Links {
    next: Cell<*mut Links>,
    prev: Cell<*mut Links>,
    _pin: PhantomPinned,
}

impl Links {
    /// Create an unlinked node
    pub const fn new() -> Self {
        Self {
            next: Cell::new(ptr::null_mut()),
            prev: Cell::new(ptr::null_mut()),
            _pin: PhantomPinned,
        }
    }

    /// Check if this node is currently part of a ring
    #[inline]
    pub fn is_linked(&self) -> bool {
        !self.next.get().is_null()
    }

    #[inline]
    fn unlink(&self) {
        self.next.set(ptr::null_mut());
        self.prev.set(ptr::null_mut());
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Links {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("next", &self.next.get())
            .field("prev", &self.prev.get())
            .finish()
    }
}

/// Types that embed a [`Links`] node at a fixed offset.
///
/// # Safety
///
/// `OFFSET` must be the byte offset of a `Links` field inside `Self`.
/// Implement through [`linked!`] rather than by hand.
pub unsafe trait Linked: Sized {
    /// Byte offset of the embedded `Links` field
    const OFFSET: usize;

    /// Address of the node embedded in `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `Self`.
    #[inline]
    unsafe fn links_of(ptr: NonNull<Self>) -> NonNull<Links> {
        NonNull::new_unchecked(ptr.as_ptr().byte_add(Self::OFFSET).cast::<Links>())
    }

    /// Recover the owning entity from its embedded node.
    ///
    /// # Safety
    ///
    /// `node` must be the `Links` field of a live `Self`.
    #[inline]
    unsafe fn from_links(node: NonNull<Links>) -> NonNull<Self> {
        NonNull::new_unchecked(node.as_ptr().byte_sub(Self::OFFSET).cast::<Self>())
    }
}

/// Implement [`Linked`] for a struct with a `Links` field.
#[macro_export]
macro_rules! linked {
    ($ty:ty, $field:ident) => {
        unsafe impl $crate::list::Linked for $ty {
            const OFFSET: usize = ::core::mem::offset_of!($ty, $field);
        }
    };
}

/// FIFO ring of intrusively linked `T`s
pub struct List<T: Linked> {
    sentinel: NonNull<Links>,
    len: usize,
    _marker: PhantomData<*const T>,
}

impl<T: Linked> List<T> {
    /// Create an empty list
    pub fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(Links::new()));
        // SAFETY: freshly allocated, we hold the only pointer.
        unsafe {
            (*sentinel).next.set(sentinel);
            (*sentinel).prev.set(sentinel);
            Self {
                sentinel: NonNull::new_unchecked(sentinel),
                len: 0,
                _marker: PhantomData,
            }
        }
    }

    #[inline]
    fn sentinel(&self) -> &Links {
        // SAFETY: the sentinel lives as long as the list.
        unsafe { self.sentinel.as_ref() }
    }

    /// True when the sentinel points at itself
    #[inline]
    pub fn is_empty(&self) -> bool {
        ptr::eq(self.sentinel().next.get(), self.sentinel.as_ptr())
    }

    /// Number of linked members
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// First member, if any
    pub fn front(&self) -> Option<NonNull<T>> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: a non-sentinel node is always embedded in a live `T`.
        unsafe { Some(T::from_links(NonNull::new_unchecked(self.sentinel().next.get()))) }
    }

    /// Last member, if any
    pub fn back(&self) -> Option<NonNull<T>> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: as in `front`.
        unsafe { Some(T::from_links(NonNull::new_unchecked(self.sentinel().prev.get()))) }
    }

    /// Link `item` at the tail.
    ///
    /// # Safety
    ///
    /// `item` must point to a live `T` that is not linked into any ring and
    /// stays pinned until removed.
    pub unsafe fn push_back(&mut self, item: NonNull<T>) {
        let node = T::links_of(item).as_ptr();
        let tail = self.sentinel().prev.get();
        Self::splice(node, tail, self.sentinel.as_ptr());
        self.len += 1;
    }

    /// Link `item` at the head.
    ///
    /// # Safety
    ///
    /// Same requirements as [`List::push_back`].
    pub unsafe fn push_front(&mut self, item: NonNull<T>) {
        let node = T::links_of(item).as_ptr();
        let head = self.sentinel().next.get();
        Self::splice(node, self.sentinel.as_ptr(), head);
        self.len += 1;
    }

    /// Insert `node` between the adjacent `prev` and `next`.
    #[inline]
    unsafe fn splice(node: *mut Links, prev: *mut Links, next: *mut Links) {
        (*node).prev.set(prev);
        (*node).next.set(next);
        (*prev).next.set(node);
        (*next).prev.set(node);
    }

    /// Unlink `item` from this list.
    ///
    /// Only the two neighbouring nodes are touched.
    ///
    /// # Safety
    ///
    /// `item` must currently be linked into *this* list.
    pub unsafe fn remove(&mut self, item: NonNull<T>) {
        let node = &*T::links_of(item).as_ptr();
        debug_assert!(node.is_linked(), "removing an unlinked node");
        let prev = node.prev.get();
        let next = node.next.get();
        (*next).prev.set(prev);
        (*prev).next.set(next);
        node.unlink();
        self.len -= 1;
    }

    /// Unlink and return the head
    pub fn pop_front(&mut self) -> Option<NonNull<T>> {
        let item = self.front()?;
        // SAFETY: `front` only yields members of this list.
        unsafe { self.remove(item) };
        Some(item)
    }

    /// Unlink and return the tail
    pub fn pop_back(&mut self) -> Option<NonNull<T>> {
        let item = self.back()?;
        // SAFETY: `back` only yields members of this list.
        unsafe { self.remove(item) };
        Some(item)
    }

    /// Iterate members from head to tail
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: self.sentinel().next.get(),
            end: self.sentinel.as_ptr(),
            _list: PhantomData,
        }
    }

    /// Walk the ring and check every back-pointer and the cached length.
    #[doc(hidden)]
    pub fn assert_valid(&self) {
        let mut count = 0;
        let mut prev = self.sentinel.as_ptr();
        let mut node = self.sentinel().next.get();
        while !ptr::eq(node, self.sentinel.as_ptr()) {
            // SAFETY: every node reachable from the sentinel is linked.
            unsafe {
                assert!(ptr::eq((*node).prev.get(), prev), "broken prev link");
                prev = node;
                node = (*node).next.get();
            }
            count += 1;
        }
        assert!(ptr::eq(self.sentinel().prev.get(), prev), "broken tail link");
        assert_eq!(count, self.len, "length out of sync");
    }
}

impl<T: Linked> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Linked> Drop for List<T> {
    fn drop(&mut self) {
        // Members outlive the list; leave them unlinked rather than dangling.
        let end = self.sentinel.as_ptr();
        let mut node = self.sentinel().next.get();
        while !ptr::eq(node, end) {
            // SAFETY: members are live while linked.
            unsafe {
                let next = (*node).next.get();
                (*node).unlink();
                node = next;
            }
        }
        // SAFETY: allocated by `Box::into_raw` in `new`.
        unsafe { drop(Box::from_raw(self.sentinel.as_ptr())) };
    }
}

impl<T: Linked> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("len", &self.len)
            .field("sentinel", &self.sentinel)
            .finish()
    }
}

/// Iterator over list members
pub struct Iter<'a, T: Linked> {
    node: *mut Links,
    end: *mut Links,
    _list: PhantomData<&'a List<T>>,
}

impl<T: Linked> Iterator for Iter<'_, T> {
    type Item = NonNull<T>;

    fn next(&mut self) -> Option<NonNull<T>> {
        if ptr::eq(self.node, self.end) {
            return None;
        }
        // SAFETY: the shared borrow of the list keeps the ring stable.
        unsafe {
            let node = NonNull::new_unchecked(self.node);
            self.node = (*self.node).next.get();
            Some(T::from_links(node))
        }
    }
}
