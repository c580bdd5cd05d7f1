//! Mail exchange: the store and its persistence, mutated together
//!
//! Every mutation runs inside one critical section and writes to disk
//! before touching memory, so an acknowledged send or delete is always
//! on disk, and a failed write leaves memory as it was. A crash between
//! the disk write and the memory update only loses in-memory state, which
//! the next load rebuilds from the file.

use crate::error::{ExchangeError, Result};
use crate::events::{EventBus, ExchangeEvent};
use crate::storage::CsvStorage;
use crate::store::{is_valid_address, normalize_address, MailRecord, MailStore};
use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct Exchange {
    store: MailStore,
    storage: CsvStorage,
    events: EventBus,
    /// Serializes mutations and reloads
    mutation: Mutex<()>,
}

impl Exchange {
    /// Load the storage file; fails if it is missing or malformed
    pub async fn open(storage: CsvStorage, events: EventBus) -> Result<Self> {
        let mailboxes = storage.load().await?;
        Ok(Self {
            store: MailStore::from_mailboxes(mailboxes, events.clone()),
            storage,
            events,
            mutation: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &MailStore {
        &self.store
    }

    pub fn storage(&self) -> &CsvStorage {
        &self.storage
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn is_registered(&self, address: &str) -> bool {
        self.store.exists(address).await
    }

    pub async fn list_all(&self, address: &str) -> Vec<MailRecord> {
        self.store.list_all(address).await
    }

    pub async fn list_since(&self, address: &str, since: &NaiveDateTime) -> Vec<MailRecord> {
        self.store.list_since(address, since).await
    }

    /// Deliver one copy of a new record to every recipient
    ///
    /// All recipients must be registered, otherwise nothing is delivered.
    pub async fn send(
        &self,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        timestamp: NaiveDateTime,
    ) -> Result<MailRecord> {
        let mut normalized: Vec<String> = Vec::with_capacity(recipients.len());
        for recipient in recipients.iter().map(|r| normalize_address(r)) {
            if !recipient.is_empty() && !normalized.contains(&recipient) {
                normalized.push(recipient);
            }
        }
        if normalized.is_empty() {
            return Err(ExchangeError::Protocol("missing recipients".to_string()));
        }

        let _guard = self.mutation.lock().await;

        let mut unknown = Vec::new();
        for recipient in &normalized {
            if !self.store.exists(recipient).await {
                unknown.push(recipient.clone());
            }
        }
        if !unknown.is_empty() {
            return Err(ExchangeError::UnknownRecipients(unknown));
        }

        let record = MailRecord::new(
            normalize_address(sender),
            normalized.clone(),
            subject,
            body,
            timestamp,
        );

        let rows: Vec<_> = normalized
            .iter()
            .map(|recipient| (recipient.clone(), record.clone()))
            .collect();
        self.storage.append_all(&rows).await?;

        for recipient in &normalized {
            self.store.add(recipient, record.clone()).await;
        }

        info!(
            "Mail {} from {} delivered to {}",
            record.id,
            record.sender,
            normalized.join(", ")
        );
        Ok(record)
    }

    /// Delete a record from the owner's own mailbox
    pub async fn delete(&self, owner: &str, id: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;

        if !self.store.contains(owner, id).await {
            return Err(ExchangeError::NotFound(format!(
                "mail {} in {}'s mailbox",
                id, owner
            )));
        }

        if !self.storage.delete_row(owner, id).await? {
            warn!(
                "Mail {} of {} was in memory but not in {}",
                id,
                owner,
                self.storage.path().display()
            );
        }
        self.store.remove(owner, id).await;

        info!("Mail {} deleted from {}'s mailbox", id, normalize_address(owner));
        Ok(())
    }

    /// Register a user durably; false if the user already exists
    pub async fn register(&self, address: &str) -> Result<bool> {
        let address = normalize_address(address);
        if !is_valid_address(&address) {
            return Err(ExchangeError::Protocol(format!(
                "invalid address {:?}",
                address
            )));
        }

        let _guard = self.mutation.lock().await;

        if self.store.exists(&address).await {
            return Ok(false);
        }
        self.storage.register_user(&address).await?;
        Ok(self.store.register(&address).await)
    }

    /// Reload the file and swap the whole store
    ///
    /// On failure the current store is kept as it is.
    pub async fn reload(&self) -> Result<usize> {
        let _guard = self.mutation.lock().await;

        let mailboxes = self.storage.load().await?;
        let users = mailboxes.len();
        self.store.replace(mailboxes).await;

        info!("Reloaded {} users from {}", users, self.storage.path().display());
        self.events.publish(ExchangeEvent::Reloaded { users });
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::{encode_row, sentinel_row, HEADER};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    async fn setup_exchange(users: &[&str]) -> (TempDir, Exchange) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storage.csv");

        let mut content = format!("{}\n", HEADER);
        for user in users {
            content.push_str(&sentinel_row(user));
            content.push('\n');
        }
        tokio::fs::write(&path, content).await.unwrap();

        let exchange = Exchange::open(CsvStorage::new(path), EventBus::new())
            .await
            .unwrap();
        (temp_dir, exchange)
    }

    #[tokio::test]
    async fn test_send_delivers_to_every_recipient_and_persists() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com", "b@mail.com", "c@mail.com"]).await;

        let record = exchange
            .send(
                "a@mail.com",
                &["B@mail.com".to_string(), "c@mail.com".to_string()],
                "Hi",
                "Body",
                at(9),
            )
            .await
            .unwrap();

        assert_eq!(exchange.list_all("b@mail.com").await, vec![record.clone()]);
        assert_eq!(exchange.list_all("c@mail.com").await, vec![record.clone()]);
        // Sender does not get a copy
        assert!(exchange.list_all("a@mail.com").await.is_empty());

        let on_disk = exchange.storage().load().await.unwrap();
        assert!(on_disk["b@mail.com"].contains(&record.id));
        assert!(on_disk["c@mail.com"].contains(&record.id));
    }

    #[tokio::test]
    async fn test_send_with_unknown_recipient_delivers_nothing() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com", "b@mail.com"]).await;
        let before = tokio::fs::read_to_string(exchange.storage().path())
            .await
            .unwrap();

        let result = exchange
            .send(
                "a@mail.com",
                &["b@mail.com".to_string(), "ghost@mail.com".to_string()],
                "Hi",
                "Body",
                at(9),
            )
            .await;

        match result {
            Err(ExchangeError::UnknownRecipients(unknown)) => {
                assert_eq!(unknown, vec!["ghost@mail.com".to_string()])
            }
            other => panic!("expected unknown recipients, got {:?}", other),
        }
        assert!(exchange.list_all("b@mail.com").await.is_empty());
        assert_eq!(
            tokio::fs::read_to_string(exchange.storage().path())
                .await
                .unwrap(),
            before
        );
    }

    #[tokio::test]
    async fn test_send_duplicate_recipient_gets_one_copy() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com", "b@mail.com"]).await;

        exchange
            .send(
                "a@mail.com",
                &["b@mail.com".to_string(), "B@MAIL.COM".to_string()],
                "Hi",
                "Body",
                at(9),
            )
            .await
            .unwrap();

        assert_eq!(exchange.list_all("b@mail.com").await.len(), 1);
        assert_eq!(exchange.storage().load().await.unwrap()["b@mail.com"].len(), 1);
    }

    #[tokio::test]
    async fn test_send_without_recipients_fails() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com"]).await;
        assert!(matches!(
            exchange.send("a@mail.com", &[" ".to_string()], "s", "b", at(9)).await,
            Err(ExchangeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_only_from_own_mailbox() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com", "b@mail.com"]).await;
        let record = exchange
            .send("a@mail.com", &["b@mail.com".to_string()], "s", "b", at(9))
            .await
            .unwrap();

        assert!(matches!(
            exchange.delete("a@mail.com", &record.id).await,
            Err(ExchangeError::NotFound(_))
        ));
        assert_eq!(exchange.list_all("b@mail.com").await.len(), 1);

        exchange.delete("b@mail.com", &record.id).await.unwrap();
        assert!(exchange.list_all("b@mail.com").await.is_empty());

        let on_disk = exchange.storage().load().await.unwrap();
        assert!(on_disk["b@mail.com"].is_empty());
    }

    #[tokio::test]
    async fn test_deleted_duplicate_stays_deleted_after_reload() {
        let (temp, exchange) = setup_exchange(&["a@mail.com", "b@mail.com"]).await;
        let record = MailRecord::with_id(
            "dup",
            "a@mail.com",
            vec!["b@mail.com".into()],
            "s",
            "b",
            at(9),
        );
        let row = encode_row("b@mail.com", &record);
        let path = temp.path().join("storage.csv");
        let mut content = tokio::fs::read_to_string(&path).await.unwrap();
        content.push_str(&format!("{}\n{}\n", row, row));
        tokio::fs::write(&path, content).await.unwrap();
        exchange.reload().await.unwrap();
        assert_eq!(exchange.store().len("b@mail.com").await, 1);

        exchange.delete("b@mail.com", "dup").await.unwrap();
        exchange.reload().await.unwrap();

        assert_eq!(exchange.store().len("b@mail.com").await, 0);
        assert!(exchange.is_registered("b@mail.com").await);
    }

    #[tokio::test]
    async fn test_register_persists_user() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com"]).await;

        assert!(exchange.register("New@mail.com").await.unwrap());
        assert!(!exchange.register("new@mail.com").await.unwrap());
        assert!(exchange.is_registered("new@mail.com").await);

        exchange.reload().await.unwrap();
        assert!(exchange.is_registered("new@mail.com").await);
    }

    #[tokio::test]
    async fn test_register_rejects_reserved_characters() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com"]).await;

        for bad in ["x\\y@mail.com", "x±y@mail.com", "x|y@mail.com", " "] {
            assert!(matches!(
                exchange.register(bad).await,
                Err(ExchangeError::Protocol(_))
            ));
        }
        assert_eq!(exchange.storage().load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com", "b@mail.com"]).await;
        exchange
            .send("a@mail.com", &["b@mail.com".to_string()], "s", "multi\nline|body", at(9))
            .await
            .unwrap();

        let first = exchange.store().snapshot().await;
        exchange.reload().await.unwrap();
        let second = exchange.store().snapshot().await;
        exchange.reload().await.unwrap();
        let third = exchange.store().snapshot().await;

        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_store() {
        let (_temp, exchange) = setup_exchange(&["a@mail.com"]).await;
        let mut events = exchange.events().subscribe();

        tokio::fs::write(exchange.storage().path(), "a@mail.com|broken\n")
            .await
            .unwrap();

        assert!(exchange.reload().await.is_err());
        assert!(exchange.is_registered("a@mail.com").await);
        assert!(events.try_recv().is_err());
    }
}
