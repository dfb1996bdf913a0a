//! Zone membership: turns per-frame track positions into entry/exit events.

pub mod membership;

pub use membership::{Membership, MembershipState, ZoneConfig, ZoneMembershipDetector};
