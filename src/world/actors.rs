//! Actor capability lookup

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Anchor, Mover, Speaker, Vec3};

/// Registry of actor capabilities keyed by opaque actor id
#[derive(Default)]
pub struct ActorDirectory {
    movers: RwLock<HashMap<String, Arc<dyn Mover>>>,
    speakers: RwLock<HashMap<String, Arc<dyn Speaker>>>,
    anchors: RwLock<HashMap<String, Arc<dyn Anchor>>>,
}

impl ActorDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register locomotion/animation for `actor`. Blank ids are ignored.
    pub fn register_mover(&self, actor: &str, mover: Arc<dyn Mover>) {
        if let Some(actor) = actor_key(actor) {
            self.movers.write().insert(actor, mover);
        }
    }

    /// Register speech for `actor`. Blank ids are ignored.
    pub fn register_speaker(&self, actor: &str, speaker: Arc<dyn Speaker>) {
        if let Some(actor) = actor_key(actor) {
            self.speakers.write().insert(actor, speaker);
        }
    }

    /// Register the world anchor of `actor`. Blank ids are ignored.
    pub fn register_anchor(&self, actor: &str, anchor: Arc<dyn Anchor>) {
        if let Some(actor) = actor_key(actor) {
            self.anchors.write().insert(actor, anchor);
        }
    }

    /// Locomotion/animation capability of `actor`
    pub fn mover(&self, actor: &str) -> Option<Arc<dyn Mover>> {
        self.movers.read().get(actor.trim()).cloned()
    }

    /// Speech capability of `actor`
    pub fn speaker(&self, actor: &str) -> Option<Arc<dyn Speaker>> {
        self.speakers.read().get(actor.trim()).cloned()
    }

    /// Current world position of `actor`
    pub fn anchor(&self, actor: &str) -> Option<Vec3> {
        self.anchors
            .read()
            .get(actor.trim())
            .map(|anchor| anchor.position())
    }
}

impl std::fmt::Debug for ActorDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorDirectory")
            .field("movers", &self.movers.read().keys().collect::<Vec<_>>())
            .field("speakers", &self.speakers.read().keys().collect::<Vec<_>>())
            .field("anchors", &self.anchors.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

fn actor_key(actor: &str) -> Option<String> {
    let actor = actor.trim();
    if actor.is_empty() {
        tracing::warn!("ignoring registration for blank actor id");
        None
    } else {
        Some(actor.to_string())
    }
}
