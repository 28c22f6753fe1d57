use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::errors::{ReminderError, ReminderResult};
use crate::models::PrayerName;
use crate::store::KeyValueStore;

const LEDGER_KEY_PREFIX: &str = "completed_prayers_";

/// Prayers the user has marked done, one stored set per calendar date.
pub struct CompletionLedger<S> {
    store: S,
    /// Serializes read-modify-write of the per-date sets.
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> CompletionLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn mark_satisfied(&self, date: NaiveDate, name: PrayerName) -> ReminderResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut names = self.read(date).await?;
        if names.insert(name) {
            self.write(date, &names).await?;
            info!("marked {} done for {date}", name.slug());
        }
        Ok(())
    }

    pub async fn unmark(&self, date: NaiveDate, name: PrayerName) -> ReminderResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut names = self.read(date).await?;
        if names.remove(&name) {
            self.write(date, &names).await?;
            info!("unmarked {} for {date}", name.slug());
        }
        Ok(())
    }

    /// Read failures count as "not satisfied" so reminders keep firing.
    pub async fn is_satisfied(&self, date: NaiveDate, name: PrayerName) -> bool {
        match self.read(date).await {
            Ok(names) => names.contains(&name),
            Err(err) => {
                warn!(
                    "ledger read for {date} failed, treating {} as pending: {err}",
                    name.slug()
                );
                false
            }
        }
    }

    async fn read(&self, date: NaiveDate) -> ReminderResult<BTreeSet<PrayerName>> {
        match self.store.get(&ledger_key(date)).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|err| {
                ReminderError::Persistence(format!("invalid ledger entry for {date}: {err}"))
            }),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn write(&self, date: NaiveDate, names: &BTreeSet<PrayerName>) -> ReminderResult<()> {
        let key = ledger_key(date);
        if names.is_empty() {
            return self.store.remove(&key).await;
        }
        let serialized = serde_json::to_string(names)?;
        self.store.set(&key, &serialized).await
    }
}

fn ledger_key(date: NaiveDate) -> String {
    format!("{LEDGER_KEY_PREFIX}{}", date.format("%Y-%m-%d"))
}
