// MIT License - Copyright (c) 2026 envisalink-bridge contributors

pub mod partition;
pub mod system;
pub mod zone;

use std::collections::{HashMap, HashSet};

pub use partition::{ArmMode, Partition, PartitionEvent, PartitionStatusFlags, PartitionUpdate};
pub use system::{SystemEvent, SystemStatusFlags, SystemUpdate};
pub use zone::{Zone, ZoneEvent, ZoneStatusFlags, ZoneUpdate};

use crate::event::DeviceUpdate;
use crate::protocol::TpiMessage;

/// Last known device state for one connection.
///
/// The first update seen for each zone, partition and system condition
/// after [`DeviceTracker::reset`] is flagged `initial_update`: it describes
/// the state the panel was already in, not a change.
#[derive(Debug, Default)]
pub struct DeviceTracker {
    zones: HashMap<u16, Zone>,
    partitions: HashMap<u8, Partition>,
    system: SystemStatusFlags,
    seen_conditions: HashSet<&'static str>,
}

impl DeviceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything. Called whenever a new session is established.
    pub fn reset(&mut self) {
        self.zones.clear();
        self.partitions.clear();
        self.system = SystemStatusFlags::empty();
        self.seen_conditions.clear();
    }

    /// Apply a received message. Returns the resulting update, or `None`
    /// if the message does not describe device state.
    pub fn apply(&mut self, msg: &TpiMessage) -> Option<DeviceUpdate> {
        if let Some((id, partition, event)) = zone::parse_zone_message(msg) {
            let initial = !self.zones.contains_key(&id);
            let zone = self.zones.entry(id).or_insert_with(|| Zone::new(id));
            zone.update_status(event);
            return Some(DeviceUpdate::Zone(ZoneUpdate {
                zone: id,
                partition,
                code: msg.code,
                event,
                status: zone.status.into(),
                initial_update: initial,
            }));
        }

        if let Some(parsed) = partition::parse_partition_message(msg) {
            let id = parsed.partition;
            let initial = !self.partitions.contains_key(&id);
            let part = self.partitions.entry(id).or_insert_with(|| Partition::new(id));
            part.update_status(parsed.event, parsed.mode);
            return Some(DeviceUpdate::Partition(PartitionUpdate {
                partition: id,
                code: msg.code,
                event: parsed.event,
                mode: parsed.mode,
                user: parsed.user,
                status: part.status.into(),
                initial_update: initial,
            }));
        }

        if let Some((event, flags)) = system::parse_system_message(msg) {
            let initial = self.seen_conditions.insert(event.condition());
            self.system = event.apply(self.system);
            return Some(DeviceUpdate::System(SystemUpdate {
                code: msg.code,
                event,
                flags,
                status: self.system.into(),
                initial_update: initial,
            }));
        }

        None
    }

    pub fn zone(&self, id: u16) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn partition(&self, id: u8) -> Option<&Partition> {
        self.partitions.get(&id)
    }

    pub fn system(&self) -> SystemStatusFlags {
        self.system
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(code: u16, data: &str) -> TpiMessage {
        TpiMessage {
            code,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_first_update_per_zone_is_initial() {
        let mut tracker = DeviceTracker::new();

        let Some(DeviceUpdate::Zone(first)) = tracker.apply(&msg(609, "001")) else {
            panic!("expected zone update");
        };
        assert!(first.initial_update);
        assert!(first.status.open);

        let Some(DeviceUpdate::Zone(second)) = tracker.apply(&msg(610, "001")) else {
            panic!("expected zone update");
        };
        assert!(!second.initial_update);
        assert!(!second.status.open);

        // A different zone gets its own initial update
        let Some(DeviceUpdate::Zone(other)) = tracker.apply(&msg(610, "002")) else {
            panic!("expected zone update");
        };
        assert!(other.initial_update);
    }

    #[test]
    fn test_reset_restores_initial_marker() {
        let mut tracker = DeviceTracker::new();
        tracker.apply(&msg(650, "1"));
        let Some(DeviceUpdate::Partition(update)) = tracker.apply(&msg(652, "10")) else {
            panic!("expected partition update");
        };
        assert!(!update.initial_update);
        assert_eq!(update.mode, Some(ArmMode::Away));

        tracker.reset();
        assert!(tracker.partition(1).is_none());
        let Some(DeviceUpdate::Partition(update)) = tracker.apply(&msg(655, "1")) else {
            panic!("expected partition update");
        };
        assert!(update.initial_update);
    }

    #[test]
    fn test_system_conditions_share_initial_marker() {
        let mut tracker = DeviceTracker::new();
        let Some(DeviceUpdate::System(trouble)) = tracker.apply(&msg(802, "")) else {
            panic!("expected system update");
        };
        assert!(trouble.initial_update);
        assert!(trouble.status.ac_trouble);

        let Some(DeviceUpdate::System(restore)) = tracker.apply(&msg(803, "")) else {
            panic!("expected system update");
        };
        assert!(!restore.initial_update);
        assert!(tracker.system().is_empty());
    }

    #[test]
    fn test_default_tracker_starts_clear() {
        let mut tracker = DeviceTracker::default();
        let Some(DeviceUpdate::System(trouble)) = tracker.apply(&msg(800, "")) else {
            panic!("expected a system update");
        };
        assert!(trouble.initial_update);
        assert!(trouble.status.battery_trouble);
        assert!(!trouble.status.ac_trouble);
    }

    #[test]
    fn test_non_device_messages_ignored() {
        let mut tracker = DeviceTracker::new();
        assert!(tracker.apply(&msg(500, "000")).is_none());
        assert!(tracker.apply(&msg(505, "1")).is_none());
    }
}
