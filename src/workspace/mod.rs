//! Team-shared scratch memory with free-list block recycling.
//!
//! A [`WorkspaceManager`] owns one arena of scalars, divided into one *row*
//! per workspace slot (see [`TeamUtils`]), each row divided into `max_used`
//! equally sized blocks. A team claims a row for the duration of a kernel
//! ([`WorkspaceManager::get_workspace`]), then takes and releases blocks from
//! that row as cheap named scratch buffers. Blocks are recycled through a
//! per-row free list, so a kernel that needs hundreds of temporaries over its
//! lifetime only pays for the `max_used` it holds at once.
//!
//! Every take and release is collective across the team: a barrier, the
//! free-list update on a single worker, and another barrier, so all workers
//! agree on the block before anyone touches it.
//!
//! Free-list bookkeeping lives in a side table of per-block link indices,
//! never inside the payload, so blocks taken back to back from a fresh row
//! are physically contiguous. Macro blocks and the `*_contiguous` operations
//! rely on exactly that layout.
//!
//! Debug builds track per-row usage (current, high water, per-name take and
//! release counts) and poison freshly taken blocks with
//! [`Scalar::invalid`]; [`WorkspaceManager::report`] renders the accounting,
//! flagging names whose takes and releases disagree.

pub mod view;

pub use crate::team::utils::DEFAULT_OVERPROVISION_FACTOR;
pub use view::WorkspaceView;

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(debug_assertions)]
use std::collections::BTreeMap;
#[cfg(debug_assertions)]
use std::sync::Mutex;

use crate::pack::{Pack, Scalar};
use crate::team::utils::TeamUtils;
use crate::team::{parallel_for_each_team, TeamMember, TeamPolicy, Topology};

// Rows are touched by different teams concurrently; their heads must not
// share cache lines.
#[repr(align(64))]
struct RowHead(AtomicUsize);

// One heap allocation holding every row. The owning Box is dismantled at
// construction and rebuilt in Drop, so all block pointers derive from one
// raw base that never aliases a live reference to the buffer. Block
// disjointness is enforced by the free list plus the row claim in
// TeamUtils.
struct Arena<T> {
    base: *mut T,
    len: usize,
}

impl<T> Arena<T> {
    fn new(buffer: Vec<T>) -> Self {
        let len = buffer.len();
        let base = Box::into_raw(buffer.into_boxed_slice()) as *mut T;
        Self { base, len }
    }
}

impl<T> Drop for Arena<T> {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.base, self.len,
            )));
        }
    }
}

unsafe impl<T: Send> Send for Arena<T> {}
unsafe impl<T: Send + Sync> Sync for Arena<T> {}

#[cfg(debug_assertions)]
#[derive(Default)]
struct RowMeta {
    num_used: usize,
    high_water: usize,
    active: Vec<bool>,
    slot_names: Vec<String>,
    counts: BTreeMap<String, [usize; 2]>,
}

/// Owner of the scratch arena and its per-row free lists.
pub struct WorkspaceManager<T: Scalar> {
    tu: TeamUtils<T>,
    size: usize,
    max_used: usize,
    row_heads: Box<[RowHead]>,
    next: Box<[AtomicUsize]>,
    arena: Arena<T>,
    #[cfg(debug_assertions)]
    meta: Box<[Mutex<RowMeta>]>,
}

impl<T: Scalar> WorkspaceManager<T> {
    /// Allocate a manager sized for `policy`: one row per workspace slot,
    /// `max_used` blocks of `size` scalars per row.
    pub fn new(size: usize, max_used: usize, policy: &TeamPolicy, topology: Topology) -> Self {
        Self::with_team_utils(TeamUtils::new(policy, topology), size, max_used)
    }

    /// [`new`](Self::new) with an explicit slot overprovision factor
    /// (default [`DEFAULT_OVERPROVISION_FACTOR`]).
    pub fn new_with_overprovision(
        size: usize,
        max_used: usize,
        policy: &TeamPolicy,
        topology: Topology,
        overprov_factor: f64,
    ) -> Self {
        Self::with_team_utils(
            TeamUtils::new_with_overprovision(policy, topology, overprov_factor),
            size,
            max_used,
        )
    }

    /// Build on pre-sized team utilities. This is the constructor the others
    /// funnel into; it is also the deterministic one for tests and callers
    /// that size the pool themselves.
    pub fn with_team_utils(tu: TeamUtils<T>, size: usize, max_used: usize) -> Self {
        let len = tu.num_ws_slots() * max_used * size;
        Self::build(tu, size, max_used, vec![T::zero(); len])
    }

    /// Build over a caller-supplied buffer. The buffer must be exactly
    /// [`total_len_needed`](Self::total_len_needed) long.
    pub fn with_storage(
        buffer: Vec<T>,
        size: usize,
        max_used: usize,
        policy: &TeamPolicy,
        topology: Topology,
    ) -> Self {
        let tu = TeamUtils::new(policy, topology);
        assert_eq!(
            buffer.len(),
            tu.num_ws_slots() * max_used * size,
            "storage buffer does not match the workspace layout"
        );
        Self::build(tu, size, max_used, buffer)
    }

    /// Scalars a caller-supplied buffer must hold for this configuration.
    pub fn total_len_needed(
        size: usize,
        max_used: usize,
        policy: &TeamPolicy,
        topology: Topology,
    ) -> usize {
        TeamUtils::<T>::new(policy, topology).num_ws_slots() * max_used * size
    }

    fn build(tu: TeamUtils<T>, size: usize, max_used: usize, buffer: Vec<T>) -> Self {
        assert!(size > 0, "blocks must hold at least one scalar");
        assert!(max_used > 0, "rows must hold at least one block");
        let rows = tu.num_ws_slots();
        debug_assert_eq!(buffer.len(), rows * max_used * size);

        let row_heads = (0..rows).map(|_| RowHead(AtomicUsize::new(0))).collect();
        let next = (0..rows * max_used)
            .map(|i| AtomicUsize::new(i % max_used + 1))
            .collect();
        #[cfg(debug_assertions)]
        let meta = (0..rows)
            .map(|_| {
                Mutex::new(RowMeta {
                    active: vec![false; max_used],
                    slot_names: vec![String::new(); max_used],
                    ..RowMeta::default()
                })
            })
            .collect();

        Self {
            tu,
            size,
            max_used,
            row_heads,
            next,
            arena: Arena::new(buffer),
            #[cfg(debug_assertions)]
            meta,
        }
    }

    /// Scalars per block.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Blocks per row.
    pub fn max_used(&self) -> usize {
        self.max_used
    }

    /// Rows in the arena.
    pub fn num_ws_slots(&self) -> usize {
        self.tu.num_ws_slots()
    }

    /// Claim a row for `team` and wrap it as a [`Workspace`]. The row is
    /// returned to the pool when the workspace drops.
    pub fn get_workspace<'m, M: TeamMember>(&'m self, team: &'m M) -> Workspace<'m, T, M> {
        let ws_idx = self.tu.get_workspace_idx(team);
        Workspace {
            mgr: self,
            team,
            ws_idx,
        }
    }

    /// Explicit form of dropping the workspace.
    pub fn release_workspace<M: TeamMember>(&self, ws: Workspace<'_, T, M>) {
        drop(ws);
    }

    /// Re-initialize every row's free list. Host-side, between independent
    /// uses of the manager; no team may hold a row while this runs.
    pub fn reset_all(&self) {
        let policy = TeamPolicy::new(self.num_ws_slots(), 1);
        parallel_for_each_team(&policy, |team| self.reset_row(team.league_rank()));
    }

    /// Render the usage accounting. In release builds only the layout line
    /// is available; debug builds add per-row usage and per-name take and
    /// release counts, flagging mismatches.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "workspace: {} rows x {} blocks x {} scalars",
            self.num_ws_slots(),
            self.max_used,
            self.size
        );
        #[cfg(debug_assertions)]
        {
            let mut totals: BTreeMap<String, [usize; 2]> = BTreeMap::new();
            for (r, meta) in self.meta.iter().enumerate() {
                let m = meta.lock().unwrap();
                let _ = writeln!(out, "row {}: in use {}, high water {}", r, m.num_used, m.high_water);
                for (name, c) in &m.counts {
                    let t = totals.entry(name.clone()).or_default();
                    t[0] += c[0];
                    t[1] += c[1];
                }
            }
            for (name, [takes, releases]) in &totals {
                let leak = if takes != releases { "  <-- POSSIBLE LEAK" } else { "" };
                let _ = writeln!(out, "  {}: taken {}, released {}{}", name, takes, releases, leak);
            }
        }
        out
    }

    #[inline(always)]
    fn link(&self, row: usize, slot: usize) -> &AtomicUsize {
        &self.next[row * self.max_used + slot]
    }

    // Free-list updates run on one worker of the team that holds the row;
    // the claim/release fences in TeamUtils order them across teams.
    fn pop_slot(&self, row: usize) -> usize {
        let slot = self.row_heads[row].0.load(Ordering::SeqCst);
        debug_assert!(
            slot < self.max_used,
            "row {} has no free blocks (max_used = {})",
            row,
            self.max_used
        );
        let next = self.link(row, slot).load(Ordering::SeqCst);
        self.row_heads[row].0.store(next, Ordering::SeqCst);
        slot
    }

    // Contiguous fast path: when the next k free-list entries are known to
    // be in ascending order, the head jumps k entries in one store instead
    // of walking the links. Debug builds verify the order; release builds
    // trust the caller's contract.
    fn pop_contiguous(&self, row: usize, k: usize) -> usize {
        let first = self.row_heads[row].0.load(Ordering::SeqCst);
        debug_assert!(
            first + k <= self.max_used,
            "row {} has fewer than {} free blocks (max_used = {})",
            row,
            k,
            self.max_used
        );
        #[cfg(debug_assertions)]
        for i in 0..k {
            assert_eq!(
                self.link(row, first + i).load(Ordering::SeqCst),
                first + i + 1,
                "row {}: free list was not contiguous",
                row
            );
        }
        self.row_heads[row].0.store(first + k, Ordering::SeqCst);
        first
    }

    fn push_slot(&self, row: usize, slot: usize) {
        let head = self.row_heads[row].0.load(Ordering::SeqCst);
        self.link(row, slot).store(head, Ordering::SeqCst);
        self.row_heads[row].0.store(slot, Ordering::SeqCst);
    }

    fn reset_row(&self, row: usize) {
        for i in 0..self.max_used {
            self.link(row, i).store(i + 1, Ordering::SeqCst);
        }
        self.row_heads[row].0.store(0, Ordering::SeqCst);
        #[cfg(debug_assertions)]
        {
            let mut m = self.meta[row].lock().unwrap();
            m.num_used = 0;
            m.active.fill(false);
        }
    }

    fn block_ptr(&self, row: usize, slot: usize) -> *mut T {
        debug_assert!(row < self.num_ws_slots() && slot < self.max_used);
        unsafe { self.arena.base.add((row * self.max_used + slot) * self.size) }
    }

    fn view_t(&self, row: usize, slot: usize, nblocks: usize) -> WorkspaceView<'_, T> {
        WorkspaceView::new(self.block_ptr(row, slot), nblocks * self.size, slot)
    }

    #[cfg(debug_assertions)]
    fn poison(&self, row: usize, slot: usize, nblocks: usize) {
        let ptr = self.block_ptr(row, slot);
        for k in 0..nblocks * self.size {
            unsafe { ptr.add(k).write(T::invalid()) };
        }
    }

    #[cfg(debug_assertions)]
    fn note_take(&self, row: usize, slot: usize, name: &str) {
        let mut m = self.meta[row].lock().unwrap();
        m.num_used += 1;
        assert!(
            m.num_used <= self.max_used,
            "row {}: more than max_used = {} blocks taken at once",
            row,
            self.max_used
        );
        m.high_water = m.high_water.max(m.num_used);
        assert!(!m.active[slot], "row {}: block {} taken twice", row, slot);
        m.active[slot] = true;
        m.slot_names[slot] = name.to_string();
        m.counts.entry(name.to_string()).or_default()[0] += 1;
    }

    #[cfg(debug_assertions)]
    fn note_release(&self, row: usize, slot: usize) {
        let mut m = self.meta[row].lock().unwrap();
        assert!(m.active[slot], "row {}: releasing block {} which is not taken", row, slot);
        m.active[slot] = false;
        m.num_used -= 1;
        let name = m.slot_names[slot].clone();
        m.counts.get_mut(&name).unwrap()[1] += 1;
    }
}

/// A row of the arena, claimed by one team. Dropping it returns the row's
/// slot to the pool (after a team barrier when sharing is active).
pub struct Workspace<'a, T: Scalar, M: TeamMember> {
    mgr: &'a WorkspaceManager<T>,
    team: &'a M,
    ws_idx: usize,
}

impl<'a, T: Scalar, M: TeamMember> Workspace<'a, T, M> {
    /// The arena row this team holds.
    pub fn slot_index(&self) -> usize {
        self.ws_idx
    }

    fn take_slot(&self, name: &str) -> usize {
        self.team.team_barrier();
        let slot = self.team.single(|| {
            let s = self.mgr.pop_slot(self.ws_idx);
            #[cfg(debug_assertions)]
            {
                self.mgr.note_take(self.ws_idx, s, name);
                self.mgr.poison(self.ws_idx, s, 1);
            }
            #[cfg(not(debug_assertions))]
            let _ = name;
            s
        });
        self.team.team_barrier();
        slot
    }

    fn release_slot(&self, slot: usize) {
        self.team.team_barrier();
        self.team.single(|| {
            #[cfg(debug_assertions)]
            self.mgr.note_release(self.ws_idx, slot);
            self.mgr.push_slot(self.ws_idx, slot);
        });
        self.team.team_barrier();
    }

    /// Take one block as a scalar view.
    pub fn take(&self, name: &str) -> WorkspaceView<'_, T> {
        let slot = self.take_slot(name);
        self.mgr.view_t(self.ws_idx, slot, 1)
    }

    /// Take one block viewed as packs of `N` lanes. The block length must
    /// divide evenly into packs.
    pub fn take_packed<const N: usize>(&self, name: &str) -> WorkspaceView<'_, Pack<T, N>> {
        debug_assert_eq!(
            self.mgr.size % N,
            0,
            "block length {} is not a whole number of {}-lane packs",
            self.mgr.size,
            N
        );
        let slot = self.take_slot(name);
        let ptr = self.mgr.block_ptr(self.ws_idx, slot) as *mut Pack<T, N>;
        WorkspaceView::new(ptr, self.mgr.size / N, slot)
    }

    /// Take `K` blocks in one collective step. The blocks come off the free
    /// list individually and need not be contiguous.
    pub fn take_many<const K: usize>(&self, names: [&str; K]) -> [WorkspaceView<'_, T>; K] {
        self.team.team_barrier();
        let slots: [usize; K] = self.team.single(|| {
            std::array::from_fn(|i| {
                let s = self.mgr.pop_slot(self.ws_idx);
                #[cfg(debug_assertions)]
                {
                    self.mgr.note_take(self.ws_idx, s, names[i]);
                    self.mgr.poison(self.ws_idx, s, 1);
                }
                #[cfg(not(debug_assertions))]
                let _ = names[i];
                s
            })
        });
        self.team.team_barrier();
        slots.map(|s| self.mgr.view_t(self.ws_idx, s, 1))
    }

    /// Take `K` blocks assuming the next `K` free-list entries are
    /// physically adjacent. The head advances `K` entries in one step, with
    /// no per-entry list traversal.
    ///
    /// # Safety
    ///
    /// The caller must know the row's free list is in contiguous ascending
    /// order for at least `K` entries, as it is after construction,
    /// [`reset`](Self::reset), or a matched `*_contiguous` release. Debug
    /// builds verify this; release builds trust it.
    pub unsafe fn take_many_contiguous_unsafe<const K: usize>(
        &self,
        names: [&str; K],
    ) -> [WorkspaceView<'_, T>; K] {
        self.team.team_barrier();
        let first = self.team.single(|| {
            let first = self.mgr.pop_contiguous(self.ws_idx, K);
            #[cfg(debug_assertions)]
            for (i, name) in names.iter().enumerate() {
                self.mgr.note_take(self.ws_idx, first + i, name);
                self.mgr.poison(self.ws_idx, first + i, 1);
            }
            #[cfg(not(debug_assertions))]
            let _ = names;
            first
        });
        self.team.team_barrier();
        std::array::from_fn(|i| self.mgr.view_t(self.ws_idx, first + i, 1))
    }

    /// Take `n_sub_blocks` adjacent blocks as one long view. Same free-list
    /// contiguity contract as
    /// [`take_many_contiguous_unsafe`](Self::take_many_contiguous_unsafe),
    /// verified in debug builds.
    pub fn take_macro_block(&self, name: &str, n_sub_blocks: usize) -> WorkspaceView<'_, T> {
        self.team.team_barrier();
        let first = self.team.single(|| {
            let first = self.mgr.pop_contiguous(self.ws_idx, n_sub_blocks);
            #[cfg(debug_assertions)]
            for k in 0..n_sub_blocks {
                self.mgr.note_take(self.ws_idx, first + k, name);
                self.mgr.poison(self.ws_idx, first + k, 1);
            }
            #[cfg(not(debug_assertions))]
            let _ = name;
            first
        });
        self.team.team_barrier();
        self.mgr.view_t(self.ws_idx, first, n_sub_blocks)
    }

    /// Reset the row's free list, then take the first `K` blocks. The
    /// returned views are always blocks `0..K` of the row, contiguous and
    /// ascending, regardless of prior churn. Any outstanding views into the
    /// row are invalidated and must not be used again.
    pub fn take_many_and_reset<const K: usize>(&self, names: [&str; K]) -> [WorkspaceView<'_, T>; K] {
        self.team.team_barrier();
        let slots: [usize; K] = self.team.single(|| {
            self.mgr.reset_row(self.ws_idx);
            std::array::from_fn(|i| {
                let s = self.mgr.pop_slot(self.ws_idx);
                #[cfg(debug_assertions)]
                {
                    self.mgr.note_take(self.ws_idx, s, names[i]);
                    self.mgr.poison(self.ws_idx, s, 1);
                }
                #[cfg(not(debug_assertions))]
                let _ = names[i];
                s
            })
        });
        self.team.team_barrier();
        slots.map(|s| self.mgr.view_t(self.ws_idx, s, 1))
    }

    /// Return a block to the row. Consumes the view, so a released block
    /// cannot be touched again.
    pub fn release<S>(&self, view: WorkspaceView<'_, S>) {
        self.release_slot(view.slot());
    }

    /// Release `K` adjacent blocks, restoring the free list to contiguous
    /// ascending order so a later contiguous take can succeed.
    pub fn release_many_contiguous<const K: usize, S>(&self, views: [WorkspaceView<'_, S>; K]) {
        let slots: [usize; K] = std::array::from_fn(|i| views[i].slot());
        #[cfg(debug_assertions)]
        for (i, &s) in slots.iter().enumerate() {
            assert_eq!(s, slots[0] + i, "row {}: views are not contiguous", self.ws_idx);
        }
        self.team.team_barrier();
        self.team.single(|| {
            for &s in slots.iter().rev() {
                #[cfg(debug_assertions)]
                self.mgr.note_release(self.ws_idx, s);
                self.mgr.push_slot(self.ws_idx, s);
            }
        });
        self.team.team_barrier();
    }

    /// Release a macro block taken with [`take_macro_block`](Self::take_macro_block).
    pub fn release_macro_block<S>(&self, view: WorkspaceView<'_, S>, n_sub_blocks: usize) {
        let first = view.slot();
        self.team.team_barrier();
        self.team.single(|| {
            for k in (0..n_sub_blocks).rev() {
                #[cfg(debug_assertions)]
                self.mgr.note_release(self.ws_idx, first + k);
                self.mgr.push_slot(self.ws_idx, first + k);
            }
        });
        self.team.team_barrier();
    }

    /// Re-initialize this row's free list. Outstanding views into the row
    /// are invalidated and must not be used again.
    pub fn reset(&self) {
        self.team.team_barrier();
        self.team.single(|| self.mgr.reset_row(self.ws_idx));
        self.team.team_barrier();
    }
}

impl<'a, T: Scalar, M: TeamMember> Drop for Workspace<'a, T, M> {
    fn drop(&mut self) {
        self.mgr.tu.release_workspace_idx(self.team, self.ws_idx);
    }
}
