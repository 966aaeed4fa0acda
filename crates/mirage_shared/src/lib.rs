//! # MIRAGE Shared
//!
//! Types that cross the tracking-engine boundary.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - a tracking engine or camera binding
//! - a renderer
//!
//! Engines produce [`PoseBatch`]es, the core subsystem consumes them and
//! renderers receive [`Pose`]s. Nothing else lives here.

#![deny(unsafe_code)]

pub mod math;
pub mod pose;

pub use math::{Pose, Quaternion, Vec3};
pub use pose::{AnchorKey, PoseBatch, PoseEvent};
