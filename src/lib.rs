//! # seavent
//!
//! Multi-step event authoring over a chat platform: a command opens a
//! per-user draft, a form fills it in, a preview with controls lets the
//! author edit, attach an image, save, publish, or cancel, and published
//! events track attendance through their own controls.
//!
//! The chat platform is behind the [`platform::Platform`] trait;
//! [`platform::LocalPlatform`] runs everything in-process.

pub mod artifacts;
pub mod attendance;
pub mod config;
pub mod controls;
pub mod db;
pub mod drafts;
pub mod error;
pub mod form;
pub mod model;
pub mod platform;
pub mod render;
pub mod subscription;
pub mod telemetry;
pub mod time;
pub mod workflow;
