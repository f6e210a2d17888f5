//! Recency list backing the partition LRU.
//!
//! A doubly linked list with sentinel head and tail nodes. The LRU keeps a
//! raw pointer to every node in its key map, so promoting or removing a
//! partition is O(1) without searching the list.
//!
//! ```text
//!   head ⇄ [most recent] ⇄ ... ⇄ [least recent] ⇄ tail
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr;

/// A node in the recency list.
///
/// Sentinel nodes leave `val` uninitialized.
pub(crate) struct Node<T> {
    val: MaybeUninit<T>,
    prev: *mut Node<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn new(val: T) -> Self {
        Node {
            val: MaybeUninit::new(val),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    fn new_sentinel() -> Self {
        Node {
            val: MaybeUninit::uninit(),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    /// # Safety
    ///
    /// Must not be called on a sentinel.
    pub(crate) unsafe fn value(&self) -> &T {
        // SAFETY: caller guarantees this is a value node
        unsafe { self.val.assume_init_ref() }
    }

    /// # Safety
    ///
    /// Must not be called on a sentinel.
    pub(crate) unsafe fn value_mut(&mut self) -> &mut T {
        // SAFETY: caller guarantees this is a value node
        unsafe { self.val.assume_init_mut() }
    }
}

/// Unbounded doubly linked list ordered from most to least recently used.
///
/// Capacity is enforced by the owner; the list only keeps order.
pub(crate) struct RecencyList<T> {
    len: usize,
    head: *mut Node<T>,
    tail: *mut Node<T>,
}

impl<T> RecencyList<T> {
    pub(crate) fn new() -> Self {
        let head = Box::into_raw(Box::new(Node::new_sentinel()));
        let tail = Box::into_raw(Box::new(Node::new_sentinel()));
        // SAFETY: head and tail were just allocated and are valid
        unsafe {
            (*head).next = tail;
            (*tail).prev = head;
        }
        RecencyList { len: 0, head, tail }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `val` as the most recent entry and returns its node.
    pub(crate) fn push_front(&mut self, val: T) -> *mut Node<T> {
        let node = Box::into_raw(Box::new(Node::new(val)));
        // SAFETY: node is freshly allocated and not linked anywhere yet
        unsafe { self.attach_front(node) };
        self.len += 1;
        node
    }

    /// Makes `node` the most recent entry.
    ///
    /// # Safety
    ///
    /// `node` must be a value node of this list.
    pub(crate) unsafe fn move_to_front(&mut self, node: *mut Node<T>) {
        // SAFETY: head is valid for the lifetime of the list
        if unsafe { (*self.head).next } == node {
            return;
        }
        // SAFETY: caller guarantees node is linked into this list
        unsafe {
            self.detach(node);
            self.attach_front(node);
        }
    }

    /// Unlinks `node`, frees it and returns its value.
    ///
    /// # Safety
    ///
    /// `node` must be a value node of this list. It is dangling afterwards.
    pub(crate) unsafe fn remove(&mut self, node: *mut Node<T>) -> T {
        // SAFETY: caller guarantees node is a linked value node
        unsafe {
            self.detach(node);
            self.len -= 1;
            let node = *Box::from_raw(node);
            node.val.assume_init()
        }
    }

    /// Removes and returns the least recent entry.
    pub(crate) fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: the list is non-empty, so tail.prev is a value node
        unsafe {
            let last = (*self.tail).prev;
            Some(self.remove(last))
        }
    }

    /// The least recent entry, if any.
    pub(crate) fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: the list is non-empty, so tail.prev is a value node
        unsafe { Some((*(*self.tail).prev).value()) }
    }

    /// Iterates from most to least recent.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            // SAFETY: head is valid for the lifetime of the list
            next: unsafe { (*self.head).next },
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    pub(crate) fn clear(&mut self) {
        while self.pop_back().is_some() {}
    }

    unsafe fn detach(&mut self, node: *mut Node<T>) {
        // SAFETY: caller guarantees node is linked, so prev and next are valid
        unsafe {
            (*(*node).prev).next = (*node).next;
            (*(*node).next).prev = (*node).prev;
        }
    }

    unsafe fn attach_front(&mut self, node: *mut Node<T>) {
        // SAFETY: head and head.next are valid; caller guarantees node is unlinked
        unsafe {
            (*node).next = (*self.head).next;
            (*node).prev = self.head;
            (*self.head).next = node;
            (*(*node).next).prev = node;
        }
    }
}

impl<T> Drop for RecencyList<T> {
    fn drop(&mut self) {
        self.clear();
        // SAFETY: head and tail were allocated in `new` and are freed once here;
        // their values are uninitialized and need no drop
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RecencyList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over a [`RecencyList`], most recent first.
pub(crate) struct Iter<'a, T> {
    next: *mut Node<T>,
    remaining: usize,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        // SAFETY: `remaining` value nodes follow, so `next` is a value node
        // that outlives the shared borrow of the list
        unsafe {
            let node = &*self.next;
            self.next = node.next;
            self.remaining -= 1;
            Some(node.value())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &RecencyList<u32>) -> Vec<u32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_push_front_orders_by_recency() {
        let mut list = RecencyList::new();
        assert!(list.is_empty());
        list.push_front(1);
        list.push_front(2);
        list.push_front(3);
        assert_eq!(list.len(), 3);
        assert_eq!(collect(&list), vec![3, 2, 1]);
        assert_eq!(list.back(), Some(&1));
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::new();
        let one = list.push_front(1);
        list.push_front(2);
        list.push_front(3);
        unsafe { list.move_to_front(one) };
        assert_eq!(collect(&list), vec![1, 3, 2]);
        // already at the front
        unsafe { list.move_to_front(one) };
        assert_eq!(collect(&list), vec![1, 3, 2]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_remove_and_pop_back() {
        let mut list = RecencyList::new();
        list.push_front(1);
        let two = list.push_front(2);
        list.push_front(3);
        assert_eq!(unsafe { list.remove(two) }, 2);
        assert_eq!(collect(&list), vec![3, 1]);
        assert_eq!(list.pop_back(), Some(1));
        assert_eq!(list.pop_back(), Some(3));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_clear_drops_values() {
        use std::rc::Rc;
        let tracker = Rc::new(());
        let mut list = RecencyList::new();
        for _ in 0..4 {
            list.push_front(Rc::clone(&tracker));
        }
        assert_eq!(Rc::strong_count(&tracker), 5);
        list.clear();
        assert_eq!(Rc::strong_count(&tracker), 1);
        list.push_front(Rc::clone(&tracker));
        drop(list);
        assert_eq!(Rc::strong_count(&tracker), 1);
    }
}
