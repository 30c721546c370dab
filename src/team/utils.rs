//! Sizing and workspace-slot assignment for a league of teams.
//!
//! A [`WorkspaceManager`](crate::workspace::WorkspaceManager) allocates one
//! scratch row per *slot*, not per team: when the league is larger than the
//! number of teams that can be resident at once, teams must share rows.
//! [`TeamUtils`] computes the slot pool size once per manager and hands out
//! collision-free slot indices to running teams.
//!
//! Three regimes, cheapest first:
//!
//! 1. No sharing needed: the slot index is the league rank, release is free.
//! 2. Host sharing: a pool thread runs one team at a time, so an index
//!    derived from the thread id is collision-free without atomics.
//! 3. Device-flavored sharing: teams claim a slot flag by compare-and-swap,
//!    falling back to seeded random probing under contention.

use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicI32, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::pack::Scalar;
use crate::team::{max_concurrency, TeamMember, TeamPolicy, Topology};

/// Slot pools may hold slightly more rows than there are resident teams;
/// the slack cuts claim contention when team start/stop is ragged.
pub const DEFAULT_OVERPROVISION_FACTOR: f64 = 1.25;

/// Per-league sizing facts plus the slot claim flags.
///
/// The scalar type parameter matters only through
/// [`Scalar::IS_SINGLE_PRECISION`]: on Device topology, double-precision
/// work halves the usable concurrency.
pub struct TeamUtils<T: Scalar> {
    topology: Topology,
    team_size: usize,
    max_threads: usize,
    num_teams: usize,
    num_ws_slots: usize,
    need_ws_sharing: bool,
    open_ws_slots: Box<[AtomicI32]>,
    _scalar: PhantomData<T>,
}

impl<T: Scalar> TeamUtils<T> {
    /// Size for `policy` using the live pool width and the default
    /// overprovision factor.
    pub fn new(policy: &TeamPolicy, topology: Topology) -> Self {
        Self::with_concurrency(max_concurrency(), policy, topology, DEFAULT_OVERPROVISION_FACTOR)
    }

    /// [`new`](Self::new) with an explicit overprovision factor.
    pub fn new_with_overprovision(
        policy: &TeamPolicy,
        topology: Topology,
        overprov_factor: f64,
    ) -> Self {
        Self::with_concurrency(max_concurrency(), policy, topology, overprov_factor)
    }

    /// Fully explicit constructor; `concurrency` stands in for the pool
    /// width, which makes the sizing arithmetic testable on any machine.
    ///
    /// With [`Topology::Host`] and a league larger than the slot pool, slot
    /// indices are derived from live pool thread ids, which is
    /// collision-free only if the pool running the teams is no wider than
    /// `concurrency`. Understating the width can hand two concurrent teams
    /// the same slot; debug builds assert against it at claim time.
    pub fn with_concurrency(
        concurrency: usize,
        policy: &TeamPolicy,
        topology: Topology,
        overprov_factor: f64,
    ) -> Self {
        assert!(overprov_factor >= 1.0, "overprovision factor must be at least 1");

        let halve = topology == Topology::Device && !T::IS_SINGLE_PRECISION;
        let max_threads = concurrency / if halve { 2 } else { 1 };

        let num_teams = (max_threads / policy.team_size).min(policy.league_size);
        assert!(
            num_teams > 0,
            "league of {} teams of {} workers cannot run on {} threads",
            policy.league_size,
            policy.team_size,
            max_threads
        );

        let num_ws_slots = if topology == Topology::Device && policy.league_size > num_teams {
            policy
                .league_size
                .min((overprov_factor * num_teams as f64) as usize)
        } else {
            num_teams
        };
        let need_ws_sharing = policy.league_size > num_ws_slots;

        let open_ws_slots = if need_ws_sharing && topology == Topology::Device {
            (0..num_ws_slots).map(|_| AtomicI32::new(0)).collect()
        } else {
            Box::default()
        };

        Self {
            topology,
            team_size: policy.team_size,
            max_threads,
            num_teams,
            num_ws_slots,
            need_ws_sharing,
            open_ws_slots,
            _scalar: PhantomData,
        }
    }

    /// Usable pool width after the double-precision halving.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Teams that can be resident at once.
    pub fn num_teams(&self) -> usize {
        self.num_teams
    }

    /// Scratch rows the workspace manager must allocate.
    pub fn num_ws_slots(&self) -> usize {
        self.num_ws_slots
    }

    /// True when more teams exist than slots, so slots are claimed and
    /// released rather than owned.
    pub fn need_ws_sharing(&self) -> bool {
        self.need_ws_sharing
    }

    /// Claim a slot index for this team. Every resident team holds a
    /// distinct index until it calls
    /// [`release_workspace_idx`](Self::release_workspace_idx).
    pub fn get_workspace_idx(&self, team: &impl TeamMember) -> usize {
        if !self.need_ws_sharing {
            return team.league_rank();
        }
        match self.topology {
            Topology::Host => {
                // one team per pool thread at a time
                let tid = rayon::current_thread_index().unwrap_or(0);
                debug_assert!(
                    tid < self.max_threads,
                    "pool thread {} exceeds the {} threads this pool was sized for",
                    tid,
                    self.max_threads
                );
                (tid / self.team_size) % self.num_ws_slots
            }
            Topology::Device => team.single(|| self.claim_slot(team.league_rank())),
        }
    }

    fn claim_slot(&self, league_rank: usize) -> usize {
        let mut idx = league_rank % self.num_ws_slots;
        if !self.try_claim(idx) {
            let mut rng = StdRng::seed_from_u64(league_rank as u64);
            loop {
                idx = rng.random_range(0..self.num_ws_slots);
                if self.try_claim(idx) {
                    break;
                }
            }
        }
        // the slot's prior contents must not be visible before the claim
        fence(Ordering::SeqCst);
        idx
    }

    fn try_claim(&self, idx: usize) -> bool {
        self.open_ws_slots[idx]
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Return a claimed slot to the pool. The whole team must be done with
    /// the slot's row, hence the leading barrier.
    pub fn release_workspace_idx(&self, team: &impl TeamMember, ws_idx: usize) {
        if !self.need_ws_sharing || self.topology == Topology::Host {
            return;
        }
        team.team_barrier();
        team.single(|| {
            fence(Ordering::SeqCst);
            self.open_ws_slots[ws_idx].store(0, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::{parallel_for_each_team, SerialTeam};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn trivial_mapping_when_slots_cover_league() {
        let policy = TeamPolicy::new(4, 1);
        let tu = TeamUtils::<f64>::with_concurrency(8, &policy, Topology::Host, 1.25);
        assert_eq!(tu.max_threads(), 8);
        assert_eq!(tu.num_teams(), 4);
        assert_eq!(tu.num_ws_slots(), 4);
        assert!(!tu.need_ws_sharing());

        let team = SerialTeam::new(2);
        assert_eq!(tu.get_workspace_idx(&team), 2);
        tu.release_workspace_idx(&team, 2);
    }

    #[test]
    fn double_precision_halves_device_concurrency() {
        let policy = TeamPolicy::new(16, 1);
        let tu64 = TeamUtils::<f64>::with_concurrency(8, &policy, Topology::Device, 1.0);
        assert_eq!(tu64.max_threads(), 4);
        let tu32 = TeamUtils::<f32>::with_concurrency(8, &policy, Topology::Device, 1.0);
        assert_eq!(tu32.max_threads(), 8);
        // host topology never halves
        let host = TeamUtils::<f64>::with_concurrency(8, &policy, Topology::Host, 1.0);
        assert_eq!(host.max_threads(), 8);
    }

    #[test]
    fn overprovision_rounds_toward_zero() {
        let policy = TeamPolicy::new(10, 1);
        let tu = TeamUtils::<f32>::with_concurrency(4, &policy, Topology::Device, 1.25);
        assert_eq!(tu.num_teams(), 4);
        // trunc(1.25 * 4) = 5
        assert_eq!(tu.num_ws_slots(), 5);
        assert!(tu.need_ws_sharing());

        let tu = TeamUtils::<f32>::with_concurrency(4, &policy, Topology::Device, 1.7);
        // trunc(1.7 * 4) = 6
        assert_eq!(tu.num_ws_slots(), 6);

        // the league caps the pool
        let tu = TeamUtils::<f32>::with_concurrency(4, &policy, Topology::Device, 5.0);
        assert_eq!(tu.num_ws_slots(), 10);
        assert!(!tu.need_ws_sharing());
    }

    #[test]
    fn host_never_overprovisions() {
        let policy = TeamPolicy::new(10, 1);
        let tu = TeamUtils::<f64>::with_concurrency(4, &policy, Topology::Host, 1.25);
        assert_eq!(tu.num_ws_slots(), 4);
        assert!(tu.need_ws_sharing());
    }

    // Host sharing derives slots from live pool thread ids; sized for the
    // real pool width, no two running teams may land on the same slot.
    #[test]
    fn host_sharing_maps_live_threads_without_collision() {
        let policy = TeamPolicy::new(64, 1);
        let tu = TeamUtils::<f64>::new(&policy, Topology::Host);
        if !tu.need_ws_sharing() {
            // pool wide enough to give every team its own slot
            return;
        }
        let in_use: Vec<AtomicUsize> =
            (0..tu.num_ws_slots()).map(|_| AtomicUsize::new(0)).collect();
        parallel_for_each_team(&policy, |team| {
            let idx = tu.get_workspace_idx(team);
            let prev = in_use[idx].fetch_add(1, Ordering::SeqCst);
            assert_eq!(prev, 0, "slot {idx} handed to two live teams");
            in_use[idx].fetch_sub(1, Ordering::SeqCst);
            tu.release_workspace_idx(team, idx);
        });
    }

    #[test]
    #[should_panic]
    fn zero_resident_teams_is_fatal() {
        let policy = TeamPolicy::new(4, 1);
        // halving drops a single-thread pool to zero usable threads
        let _ = TeamUtils::<f64>::with_concurrency(1, &policy, Topology::Device, 1.25);
    }

    #[test]
    fn claims_are_exclusive_until_released() {
        let policy = TeamPolicy::new(8, 1);
        let tu = TeamUtils::<f32>::with_concurrency(2, &policy, Topology::Device, 1.0);
        assert_eq!(tu.num_ws_slots(), 2);
        assert!(tu.need_ws_sharing());

        let t0 = SerialTeam::new(0);
        let t1 = SerialTeam::new(1);
        let i0 = tu.get_workspace_idx(&t0);
        let i1 = tu.get_workspace_idx(&t1);
        assert_ne!(i0, i1);

        // a third team can only claim after a release frees a slot
        tu.release_workspace_idx(&t0, i0);
        let t2 = SerialTeam::new(2);
        let i2 = tu.get_workspace_idx(&t2);
        assert_eq!(i2, i0);

        tu.release_workspace_idx(&t1, i1);
        tu.release_workspace_idx(&t2, i2);
    }
}
