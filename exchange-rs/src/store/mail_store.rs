//! Shared, internally synchronized map from user address to mailbox
//!
//! Every operation takes the lock for its own duration only; callers never
//! see or hold it. Reads share the lock, mutations take it exclusively.

use super::{normalize_address, MailRecord, Mailbox};
use crate::events::{EventBus, ExchangeEvent};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Mailboxes keyed by normalized address
pub type Mailboxes = HashMap<String, Mailbox>;

pub struct MailStore {
    users: RwLock<Mailboxes>,
    events: EventBus,
}

impl MailStore {
    pub fn new(events: EventBus) -> Self {
        Self::from_mailboxes(Mailboxes::new(), events)
    }

    pub fn from_mailboxes(mailboxes: Mailboxes, events: EventBus) -> Self {
        Self {
            users: RwLock::new(mailboxes),
            events,
        }
    }

    pub async fn exists(&self, address: &str) -> bool {
        self.users
            .read()
            .await
            .contains_key(&normalize_address(address))
    }

    /// Create an empty mailbox; false if the user already exists
    pub async fn register(&self, address: &str) -> bool {
        let address = normalize_address(address);
        let mut users = self.users.write().await;
        if users.contains_key(&address) {
            return false;
        }
        info!("Registered user {}", address);
        users.insert(address, Mailbox::new());
        true
    }

    /// Deliver `record` to `address`, creating the mailbox on first use
    ///
    /// Returns false, leaving the mailbox untouched, when a record with the
    /// same id is already there.
    pub async fn add(&self, address: &str, record: MailRecord) -> bool {
        let address = normalize_address(address);
        let id = record.id.clone();

        let added = self
            .users
            .write()
            .await
            .entry(address.clone())
            .or_default()
            .add(record);

        if added {
            debug!("Mail {} added to {}'s inbox", id, address);
            self.events.publish(ExchangeEvent::MailAdded { owner: address, id });
        }
        added
    }

    pub async fn remove(&self, address: &str, id: &str) -> bool {
        let address = normalize_address(address);

        let removed = self
            .users
            .write()
            .await
            .get_mut(&address)
            .and_then(|mailbox| mailbox.remove(id))
            .is_some();

        if removed {
            debug!("Mail {} removed from {}'s inbox", id, address);
            self.events.publish(ExchangeEvent::MailRemoved {
                owner: address,
                id: id.to_string(),
            });
        }
        removed
    }

    pub async fn contains(&self, address: &str, id: &str) -> bool {
        self.users
            .read()
            .await
            .get(&normalize_address(address))
            .is_some_and(|mailbox| mailbox.contains(id))
    }

    pub async fn get(&self, address: &str, id: &str) -> Option<MailRecord> {
        self.users
            .read()
            .await
            .get(&normalize_address(address))
            .and_then(|mailbox| mailbox.get(id).cloned())
    }

    /// Every record in delivery order; empty for an unknown user
    pub async fn list_all(&self, address: &str) -> Vec<MailRecord> {
        self.users
            .read()
            .await
            .get(&normalize_address(address))
            .map(|mailbox| mailbox.records().to_vec())
            .unwrap_or_default()
    }

    /// Records with a timestamp strictly after `since`, in delivery order
    pub async fn list_since(&self, address: &str, since: &NaiveDateTime) -> Vec<MailRecord> {
        self.users
            .read()
            .await
            .get(&normalize_address(address))
            .map(|mailbox| mailbox.since(since))
            .unwrap_or_default()
    }

    pub async fn len(&self, address: &str) -> usize {
        self.users
            .read()
            .await
            .get(&normalize_address(address))
            .map_or(0, Mailbox::len)
    }

    /// Known user addresses, sorted
    pub async fn users(&self) -> Vec<String> {
        let mut users: Vec<_> = self.users.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Copy of the whole map, for comparisons and diagnostics
    pub async fn snapshot(&self) -> Mailboxes {
        self.users.read().await.clone()
    }

    /// Swap in a freshly loaded map wholesale
    pub async fn replace(&self, mailboxes: Mailboxes) {
        let count = mailboxes.len();
        *self.users.write().await = mailboxes;
        info!("Mail store replaced with {} users", count);
    }
}
