//! Decision engine of the Hackle experimentation SDK.
//!
//! # Overview
//!
//! [`HackleCore`] decides A/B test variations, feature flag states and remote config values for
//! a [`HackleUser`] against the [`Workspace`] currently held by a [`WorkspaceFetcher`]. Decisions
//! walk an evaluation flow per entity (status, overrides, targeting, bucketing) and carry a
//! [`DecisionReason`] explaining the outcome.
//!
//! On top of the same engine, [`InAppMessageManager`](in_app_message::InAppMessageManager)
//! turns tracked events into in-app messages: it matches trigger rules, waits out configured
//! delays on a timer, re-checks eligibility and hands the message to the host's presenter.
//!
//! # Error Handling
//!
//! Internal errors are represented by the [`Error`] enum. The public decision methods never fail:
//! they log the error and fall back to the caller's default with [`DecisionReason::Exception`].
//! Such errors usually mean the workspace is inconsistent and deserve a developer's attention.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with target `hackle`.
//! Consider integrating a `log`-compatible logger implementation for better visibility into SDK
//! operations.

#![warn(rustdoc::missing_crate_level_docs)]

mod bucketer;
mod clock;
mod config;
mod decision;
mod error;
pub mod evaluation;
mod event;
mod hackle;
mod hasher;
mod id;
pub mod in_app_message;
pub mod model;
mod user;
mod value;
mod workspace;

#[cfg(test)]
mod testing;

pub use bucketer::{Bucketer, DefaultBucketer};
pub use clock::{Clock, SystemClock};
pub use config::{HackleConfig, InAppMessageConfig};
pub use decision::{
    Decision, DecisionReason, ExperimentDecision, FeatureFlagDecision, RemoteConfigDecision,
};
pub use error::{Error, Result};
pub use event::{Event, TrackEvent};
pub use hackle::HackleCore;
pub use hasher::{Hasher, Murmur3Hasher};
pub use user::{HackleUser, HackleUserBuilder, IdentifierType, Identifiers, UserResolver};
pub use value::{HackleValue, ValueType, Version};
pub use workspace::{Workspace, WorkspaceDto, WorkspaceFetcher, WorkspaceStore};
