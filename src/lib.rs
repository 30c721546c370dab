//! Packed numeric containers and team-shared scratch workspaces.
//!
//! The crate has four pieces that build on each other:
//!
//! - [`pack`]: the [`Pack`]/[`Mask`] value types, fixed-width bundles of
//!   scalars with lane-wise arithmetic, masked assignment, and the
//!   [`where_`] expression proxy.
//! - [`team`]: the league/team execution surface the kernels are written
//!   against, backed by rayon on the host.
//! - [`reduce`]: serialized (bit-reproducible) and reassociating
//!   reductions over scalar or packed ranges, with garbage-lane handling at
//!   pack boundaries.
//! - [`workspace`]: the [`WorkspaceManager`], per-team scratch rows with
//!   free-list block recycling, handed out as scalar or pack-typed views.

pub mod pack;
pub mod reduce;
pub mod team;
pub mod workspace;

pub use pack::{where_, Mask, Pack, Scalar, ScalarTraits};
pub use team::{SerialTeam, TeamMember, TeamPolicy, Topology};
pub use workspace::{Workspace, WorkspaceManager, WorkspaceView};
