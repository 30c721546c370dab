//! Team execution surface: leagues of cooperating workers.
//!
//! Kernels in this crate are written against the [`TeamMember`] capability
//! trait rather than a concrete thread pool: a league of teams is launched
//! with [`parallel_for_each_team`], each team sees its own `league_rank`,
//! and workers inside a team coordinate through `team_barrier` and `single`.
//!
//! On the host every team is a [`SerialTeam`] with exactly one worker, and
//! the league fans out across the rayon pool. The [`Topology`] descriptor
//! records which flavor of hardware the sizing heuristics should assume;
//! it changes slot-assignment policy (see [`utils`]) but not correctness.

pub mod utils;

use num::Zero;
use rayon::prelude::*;

/// Hardware flavor assumed by sizing heuristics.
///
/// `Host` means teams map to pool threads one to one and never outnumber
/// them. `Device` mimics an accelerator launch: many more teams than can be
/// resident at once, which makes workspace slot sharing necessary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Topology {
    Host,
    Device,
}

/// League shape: how many teams, and how many workers per team.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TeamPolicy {
    pub league_size: usize,
    pub team_size: usize,
}

impl TeamPolicy {
    pub fn new(league_size: usize, team_size: usize) -> Self {
        assert!(league_size > 0, "league must have at least one team");
        assert!(team_size > 0, "team must have at least one worker");
        Self { league_size, team_size }
    }

    /// Default policy for a problem with `ni` independent columns of `nk`
    /// elements each: one team per column. Host teams are single-worker;
    /// Device-flavored teams take a worker per element, rounded up to a
    /// 32-wide unit and capped at 128.
    pub fn default_policy(ni: usize, nk: usize, topology: Topology) -> Self {
        let team_size = match topology {
            Topology::Host => 1,
            Topology::Device => (32 * ((nk + 31) / 32)).min(128),
        };
        Self::new(ni, team_size)
    }
}

/// Capabilities a kernel may use from within its team.
pub trait TeamMember {
    /// Which team of the league this is.
    fn league_rank(&self) -> usize;

    /// This worker's rank within the team.
    fn team_rank(&self) -> usize;

    /// Workers in this team.
    fn team_size(&self) -> usize;

    /// All workers of the team rendezvous here.
    fn team_barrier(&self);

    /// Run `f` on exactly one worker of the team and return its result.
    /// Other workers observe the call but not the value; a barrier is still
    /// needed if they depend on its side effects.
    fn single<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Divide `0..n` among the team's workers and call `f` on each index
    /// this worker owns.
    fn thread_range_for(&self, n: usize, f: impl FnMut(usize));

    /// Divide `begin..end` among the workers, accumulate with `f`, and
    /// combine. The association order is unspecified.
    fn thread_range_reduce<V: Zero>(&self, begin: usize, end: usize, f: impl FnMut(usize, &mut V)) -> V;
}

/// The host team: one worker, no-op barriers.
#[derive(Copy, Clone, Debug)]
pub struct SerialTeam {
    league_rank: usize,
}

impl SerialTeam {
    pub fn new(league_rank: usize) -> Self {
        Self { league_rank }
    }
}

impl TeamMember for SerialTeam {
    #[inline(always)]
    fn league_rank(&self) -> usize {
        self.league_rank
    }

    #[inline(always)]
    fn team_rank(&self) -> usize {
        0
    }

    #[inline(always)]
    fn team_size(&self) -> usize {
        1
    }

    #[inline(always)]
    fn team_barrier(&self) {}

    #[inline(always)]
    fn single<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    #[inline(always)]
    fn thread_range_for(&self, n: usize, mut f: impl FnMut(usize)) {
        for k in 0..n {
            f(k);
        }
    }

    #[inline(always)]
    fn thread_range_reduce<V: Zero>(
        &self,
        begin: usize,
        end: usize,
        mut f: impl FnMut(usize, &mut V),
    ) -> V {
        let mut acc = V::zero();
        for k in begin..end {
            f(k, &mut acc);
        }
        acc
    }
}

/// Launch the league on the rayon pool: one [`SerialTeam`] per league rank,
/// teams running concurrently up to the pool width.
///
/// This is the only place the crate touches the execution engine directly.
pub fn parallel_for_each_team(policy: &TeamPolicy, f: impl Fn(&SerialTeam) + Send + Sync) {
    (0..policy.league_size)
        .into_par_iter()
        .for_each(|rank| f(&SerialTeam::new(rank)));
}

/// Width of the underlying thread pool.
pub fn max_concurrency() -> usize {
    rayon::current_num_threads()
}
