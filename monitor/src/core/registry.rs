//! Active test registry
//!
//! Maps each `(file_path, test_name)` key to its execution entry while the
//! test is running or hanging. Both the output parser and the hang detector
//! write here, so every mutation is a guarded operation performed under one
//! lock acquisition: a caller can only change an entry whose status is one
//! it expects.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shared::{TestExecutionEntry, TestKey, TestOutcome, TestStatus};

#[derive(Debug, Default)]
pub struct ActiveTestRegistry {
    // BTreeMap keeps "first match" in completion lookups deterministic
    entries: Mutex<BTreeMap<TestKey, TestExecutionEntry>>,
}

impl ActiveTestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<TestKey, TestExecutionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the entry for its key, returning the previous one
    pub fn upsert(&self, entry: TestExecutionEntry) -> Option<TestExecutionEntry> {
        self.lock().insert(entry.key(), entry)
    }

    pub fn remove(&self, key: &TestKey) -> Option<TestExecutionEntry> {
        self.lock().remove(key)
    }

    pub fn get(&self, key: &TestKey) -> Option<TestExecutionEntry> {
        self.lock().get(key).cloned()
    }

    /// Move an entry to `to` only if its current status is in `expected`.
    /// Returns the updated entry when the transition happened.
    pub fn transition_if(&self, key: &TestKey, expected: &[TestStatus], to: TestStatus) -> Option<TestExecutionEntry> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        if !expected.contains(&entry.status) {
            return None;
        }
        entry.status = to;
        Some(entry.clone())
    }

    /// Remove an entry only if its current status is in `expected`
    pub fn take_if(&self, key: &TestKey, expected: &[TestStatus]) -> Option<TestExecutionEntry> {
        let mut entries = self.lock();
        if !entries.get(key).is_some_and(|entry| expected.contains(&entry.status)) {
            return None;
        }
        entries.remove(key)
    }

    /// Resolve a completion marker that carries only a test name.
    ///
    /// The first active entry (in key order) whose name contains, or is
    /// contained in, `test_name` is marked completed and removed. When two
    /// active names are substrings of one another the choice is ambiguous.
    pub fn complete_matching(
        &self,
        test_name: &str,
        duration: Duration,
        outcome: TestOutcome,
    ) -> Option<TestExecutionEntry> {
        let mut entries = self.lock();
        let key = entries
            .iter()
            .find(|(_, entry)| entry.status.is_active() && entry.matches_name(test_name))
            .map(|(key, _)| key.clone())?;

        let mut entry = entries.remove(&key)?;
        entry.status = TestStatus::Completed;
        entry.duration = duration;
        entry.outcome = Some(outcome);
        Some(entry)
    }

    /// Copy of every entry, in key order
    pub fn snapshot(&self) -> Vec<TestExecutionEntry> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn count_with_status(&self, status: TestStatus) -> usize {
        self.lock().values().filter(|entry| entry.status == status).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
