//! Narrow interfaces to the simulated world
//!
//! Steps never move, animate, or voice anything themselves. They look up an
//! actor's capabilities in an [`ActorDirectory`], resolve positions through a
//! [`WaypointDirectory`], and await the collaborator while forwarding the run's
//! [`CancelToken`].

use std::ops::{Add, Sub};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::runtime::cancel::CancelToken;
use crate::runtime::error::Cancelled;

mod actors;
mod waypoints;

pub use actors::ActorDirectory;
pub use waypoints::{WaypointDirectory, WaypointEntry};

/// World-space position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Construct a vector from components
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`
    pub fn distance(self, other: Self) -> f32 {
        let d = self - other;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// One spoken line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Display name shown with the line
    pub speaker: String,
    /// Subtitle text
    pub text: String,
    /// Opaque voice clip handle, if any
    pub voice: Option<String>,
    /// Minimum time the line stays on screen
    pub min_display: Duration,
}

/// Locomotion and animation for one actor
#[async_trait]
pub trait Mover: Send + Sync {
    /// Walk to `position`, finishing within `stop_distance`
    async fn move_to(
        &self,
        position: Vec3,
        stop_distance: f32,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled>;

    /// Play animation state `name` from normalized `start_time`, optionally
    /// waiting until the state exits
    async fn play_animation(
        &self,
        name: &str,
        start_time: f32,
        wait_for_exit: bool,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled>;
}

/// Voice and subtitles for one actor
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Present `line` and resolve once it has finished
    async fn speak(&self, line: &Utterance, cancel: &CancelToken) -> Result<(), Cancelled>;
}

/// Something with a live world position (an actor root, a prop)
pub trait Anchor: Send + Sync {
    /// Current world position
    fn position(&self) -> Vec3;
}

impl Anchor for Vec3 {
    fn position(&self) -> Vec3 {
        *self
    }
}
