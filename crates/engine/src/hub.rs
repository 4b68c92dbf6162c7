// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast hub: fan-out of alarm and command payloads to subscribers.
//!
//! Publishers run on worker tasks and must never block on a slow
//! consumer: sends are non-blocking, and a subscriber whose channel is
//! full or closed is marked dead and evicted on the next pass. Delivery
//! order across subscribers is unspecified; each publisher's payloads
//! are produced after its own state commit.

use parking_lot::Mutex;
use serde_json::{json, Value};
use sg_core::clock::epoch_ms_to_rfc3339;
use sg_core::{Command, CommandEvent, ConfigTree};
use tokio::sync::mpsc;

sg_core::define_id! {
    /// Identifier handed back on subscribe, used to unsubscribe.
    pub struct SubscriberId("sub-");
}

/// Logical broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Alarms,
    Commands,
}

sg_core::simple_display! {
    Channel {
        Alarms => "alarms",
        Commands => "commands",
    }
}

/// Buffered payloads per subscriber before it counts as too slow.
const SUBSCRIBER_BUFFER: usize = 256;

/// A live subscription: the receiving end plus the id to drop it with.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<Value>,
}

struct SubscriberEntry {
    id: SubscriberId,
    channel: Channel,
    tx: mpsc::Sender<Value>,
    dead: bool,
}

/// Fan-out registry for the two event channels.
#[derive(Default)]
pub struct BroadcastHub {
    subscribers: Mutex<Vec<SubscriberEntry>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. When `initial` is given it is delivered before
    /// any live payload.
    pub fn subscribe(&self, channel: Channel, initial: Option<Value>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = SubscriberId::new();
        if let Some(snapshot) = initial {
            // Channel is empty here, so this cannot fail
            let _ = tx.try_send(snapshot);
        }
        self.subscribers.lock().push(SubscriberEntry {
            id: id.clone(),
            channel,
            tx,
            dead: false,
        });
        tracing::debug!(subscriber = %id, channel = %channel, "subscribed");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: &SubscriberId) {
        self.subscribers.lock().retain(|entry| &entry.id != id);
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.subscribers.lock().iter().filter(|e| e.channel == channel && !e.dead).count()
    }

    /// Deliver a payload to every live subscriber of `channel`.
    ///
    /// Subscribers that failed on a previous pass are evicted first;
    /// failures on this pass only mark the entry dead.
    pub fn broadcast(&self, channel: Channel, payload: &Value) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|entry| !entry.dead);

        for entry in subscribers.iter_mut().filter(|e| e.channel == channel) {
            if entry.tx.try_send(payload.clone()).is_err() {
                tracing::debug!(subscriber = %entry.id, channel = %channel, "subscriber lagging, marking dead");
                entry.dead = true;
            }
        }
    }
}

/// Build the `command_log` wire payload for a command and (optionally)
/// one of its lifecycle events.
///
/// Display context comes from the configuration tree when the command's
/// datapoint still resolves, falling back to the labels captured in the
/// payload at validation time.
pub fn command_log_payload(
    config: &ConfigTree,
    command: &Command,
    event: Option<&CommandEvent>,
) -> Value {
    let mut container = None;
    let mut equipment = None;
    let mut datapoint_label = command.payload.datapoint_label.clone();

    if let Ok(dp) = config.resolve_datapoint_ref(&command.datapoint_ref, None, None) {
        datapoint_label.get_or_insert_with(|| dp.label.clone());
        let path = config.owner_path(dp);
        container = path.container.map(|c| c.name.clone());
        equipment = path.equipment.map(|e| e.name.clone());
    }

    let event_value = event.map(|e| {
        json!({
            "ts": epoch_ms_to_rfc3339(e.ts_ms),
            "status": e.status,
            "message": e.message,
        })
    });

    json!({
        "type": "command_log",
        "command": {
            "command_id": command.command_id,
            "time": epoch_ms_to_rfc3339(command.created_at_ms),
            "plc": command.plc_name,
            "container": container.unwrap_or_else(|| command.plc_name.clone()),
            "equipment": equipment
                .or_else(|| command.payload.equipment_label.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            "data_point_label": datapoint_label.unwrap_or_else(|| command.datapoint_ref.clone()),
            "bit_label": command.payload.bit_label,
            "bit": command.payload.bit,
            "value": command.payload.value,
            "status": command.status,
            "attempts": command.attempts,
            "username": command.username.clone().unwrap_or_else(|| "System".to_string()),
            "client_ip": command.client_ip.clone().unwrap_or_else(|| "Unknown".to_string()),
            "error_message": command.error,
        },
        "event": event_value,
    })
}

/// Build the initial snapshot payload delivered on subscribe.
pub fn snapshot_payload(channel: Channel, items: Vec<Value>, ts_ms: u64) -> Value {
    match channel {
        Channel::Alarms => json!({
            "type": "snapshot",
            "channel": "alarms",
            "active": items,
            "ts": epoch_ms_to_rfc3339(ts_ms),
        }),
        Channel::Commands => json!({
            "type": "snapshot",
            "channel": "commands",
            "items": items,
            "ts": epoch_ms_to_rfc3339(ts_ms),
        }),
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
