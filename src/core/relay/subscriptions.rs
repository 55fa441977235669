//! Routing table from beacon identifiers to subscriber addresses.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use uuid::Uuid;

/// Normalizes a beacon identifier for routing.
///
/// Identifiers are trimmed and uppercased. Anything that parses as a UUID is
/// rendered in canonical hyphenated form, so simple and hyphenated spellings
/// of the same UUID route identically.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    match Uuid::parse_str(trimmed) {
        Ok(uuid) => uuid.hyphenated().to_string().to_uppercase(),
        Err(_) => trimmed.to_uppercase(),
    }
}

/// Subscriber addresses keyed by normalized beacon identifier.
///
/// A subscriber is listed at most once per identifier, in subscription order.
/// Subscribers in `all_beacons` receive every record regardless of identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTable {
    by_uuid: BTreeMap<String, Vec<String>>,
    all_beacons: Vec<String>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole subscription set of `subscriber`.
    ///
    /// Afterwards the subscriber is listed under exactly `uuids` (already
    /// normalized) and, if `all_beacons` is set, in the characteristic-wide
    /// list. Entries the subscriber keeps retain their position.
    pub fn replace(&mut self, subscriber: &str, uuids: &BTreeSet<String>, all_beacons: bool) {
        for (uuid, subscribers) in self.by_uuid.iter_mut() {
            if !uuids.contains(uuid) {
                subscribers.retain(|s| s != subscriber);
            }
        }
        self.by_uuid.retain(|_, subscribers| !subscribers.is_empty());

        for uuid in uuids {
            let subscribers = self.by_uuid.entry(uuid.clone()).or_default();
            if !subscribers.iter().any(|s| s == subscriber) {
                subscribers.push(subscriber.to_string());
            }
        }

        let listed = self.all_beacons.iter().any(|s| s == subscriber);
        if all_beacons && !listed {
            self.all_beacons.push(subscriber.to_string());
        } else if !all_beacons && listed {
            self.all_beacons.retain(|s| s != subscriber);
        }
    }

    /// Removes `subscriber` from every list. Absence is not an error.
    pub fn remove_subscriber(&mut self, subscriber: &str) {
        self.replace(subscriber, &BTreeSet::new(), false);
    }

    /// Subscribers listed under a normalized identifier
    pub fn subscribers(&self, uuid: &str) -> &[String] {
        self.by_uuid.get(uuid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every address that should receive a record with this normalized identifier,
    /// each at most once.
    pub fn recipients(&self, uuid: &str) -> Vec<&str> {
        let mut recipients: Vec<&str> = self.subscribers(uuid).iter().map(String::as_str).collect();
        for subscriber in &self.all_beacons {
            if !recipients.contains(&subscriber.as_str()) {
                recipients.push(subscriber);
            }
        }
        recipients
    }

    /// Identifiers `subscriber` is currently listed under
    pub fn identifiers_for(&self, subscriber: &str) -> Vec<&str> {
        self.by_uuid
            .iter()
            .filter(|(_, subscribers)| subscribers.iter().any(|s| s == subscriber))
            .map(|(uuid, _)| uuid.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty() && self.all_beacons.is_empty()
    }
}

impl fmt::Display for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.by_uuid)?;
        if !self.all_beacons.is_empty() {
            write!(f, " all={:?}", self.all_beacons)?;
        }
        Ok(())
    }
}
