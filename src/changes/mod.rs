//! In-memory change-notification hub.
//!
//! Tracks active subscriptions per game and fans change events out to every
//! subscriber. Notifications are best-effort and advisory: the only correct
//! reaction is a full refetch of the game's data, so a missed or duplicated
//! delivery is harmless.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A serialized change event destined for a specific subscriber.
pub type ChangeTx = mpsc::UnboundedSender<String>;

/// Which entity stream a change belongs to.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEntity {
    Game,
    Player,
    Event,
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// A single storage change, keyed by the game it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub entity: ChangeEntity,
    pub action: ChangeAction,
    pub game_id: Uuid,
    pub id: Uuid,
}

/// Tracks all active change subscriptions across all games.
#[derive(Debug, Clone, Default)]
pub struct ChangeHub {
    /// `game_id` → map of subscriber id → sender channel
    subscribers: Arc<DashMap<Uuid, DashMap<Uuid, ChangeTx>>>,
}

impl ChangeHub {
    /// Create a new empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Register a subscriber for a game's change stream.
    pub fn subscribe(&self, game_id: Uuid, subscriber_id: Uuid, tx: ChangeTx) {
        self.subscribers
            .entry(game_id)
            .or_default()
            .insert(subscriber_id, tx);
    }

    /// Remove a subscriber. Idempotent: unsubscribing twice, or after the
    /// game's channel map is already gone, is a no-op.
    pub fn unsubscribe(&self, game_id: Uuid, subscriber_id: Uuid) {
        if let Some(subs) = self.subscribers.get(&game_id) {
            subs.remove(&subscriber_id);
            if subs.is_empty() {
                drop(subs);
                self.subscribers.remove(&game_id);
            }
        }
    }

    /// Fan a change event out to every subscriber of its game.
    ///
    /// Send failures (a subscriber torn down mid-publish) are ignored; the
    /// receiver side cleans itself up on disconnect.
    pub fn publish(&self, event: &ChangeEvent) {
        if let Some(subs) = self.subscribers.get(&event.game_id) {
            let message = serde_json::to_string(event).unwrap_or_default();
            for entry in subs.iter() {
                let _ = entry.value().send(message.clone());
            }
        }
    }

    /// Drop every subscription for a game (used when the game is deleted).
    pub fn remove_game(&self, game_id: Uuid) {
        self.subscribers.remove(&game_id);
    }

    /// Check whether a specific subscriber is registered.
    #[must_use]
    pub fn is_subscribed(&self, game_id: Uuid, subscriber_id: Uuid) -> bool {
        self.subscribers
            .get(&game_id)
            .is_some_and(|subs| subs.contains_key(&subscriber_id))
    }

    /// Number of live subscribers for a game.
    #[must_use]
    pub fn subscriber_count(&self, game_id: Uuid) -> usize {
        self.subscribers.get(&game_id).map_or(0, |subs| subs.len())
    }
}
