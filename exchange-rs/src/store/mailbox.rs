//! A single user's mailbox

use super::MailRecord;
use chrono::NaiveDateTime;

/// Records delivered to one user, in delivery order, unique by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mailbox {
    records: Vec<MailRecord>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a record with the same id is already present
    pub fn add(&mut self, record: MailRecord) -> bool {
        if self.contains(&record.id) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<MailRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&MailRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[MailRecord] {
        &self.records
    }

    /// Records strictly newer than `since`
    pub fn since(&self, since: &NaiveDateTime) -> Vec<MailRecord> {
        self.records
            .iter()
            .filter(|r| r.is_after(since))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: &str, hour: u32) -> MailRecord {
        MailRecord::with_id(
            id,
            "a@mail.com",
            vec!["b@mail.com".to_string()],
            "subject",
            "body",
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut mailbox = Mailbox::new();
        assert!(mailbox.add(record("1", 9)));
        assert!(!mailbox.add(record("1", 10)));
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.get("1").unwrap().timestamp.format("%H").to_string(), "09");
    }

    #[test]
    fn test_remove() {
        let mut mailbox = Mailbox::new();
        mailbox.add(record("1", 9));
        mailbox.add(record("2", 10));

        assert!(mailbox.remove("missing").is_none());
        assert_eq!(mailbox.len(), 2);

        assert_eq!(mailbox.remove("1").unwrap().id, "1");
        assert!(!mailbox.contains("1"));
        assert_eq!(mailbox.records()[0].id, "2");
    }

    #[test]
    fn test_since_is_strict_and_ordered() {
        let mut mailbox = Mailbox::new();
        mailbox.add(record("1", 9));
        mailbox.add(record("2", 11));
        mailbox.add(record("3", 10));

        let cutoff = record("x", 9).timestamp;
        let ids: Vec<_> = mailbox.since(&cutoff).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let latest = record("x", 11).timestamp;
        assert!(mailbox.since(&latest).is_empty());
    }
}
