//! Non-owning block view handed out by a workspace.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// A borrowed scratch block: a raw slice into the workspace arena plus the
/// free-list slot it came from.
///
/// Views are move-only and deliberately do not implement `Clone`;
/// `Workspace::release` consumes the view, so a released block cannot be
/// touched again and a double release does not compile.
pub struct WorkspaceView<'a, S> {
    ptr: *mut S,
    len: usize,
    slot: usize,
    _arena: PhantomData<&'a mut [S]>,
}

// The arena outlives the view ('a) and the block is exclusively owned by
// one team between take and release, so handing the view across that team's
// workers is sound.
unsafe impl<'a, S: Send> Send for WorkspaceView<'a, S> {}
unsafe impl<'a, S: Sync> Sync for WorkspaceView<'a, S> {}

impl<'a, S> WorkspaceView<'a, S> {
    pub(crate) fn new(ptr: *mut S, len: usize, slot: usize) -> Self {
        Self {
            ptr,
            len,
            slot,
            _arena: PhantomData,
        }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// Block length in units of `S`.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'a, S> Deref for WorkspaceView<'a, S> {
    type Target = [S];

    #[inline(always)]
    fn deref(&self) -> &[S] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl<'a, S> DerefMut for WorkspaceView<'a, S> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [S] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}
