// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent registry of active tasks.
//!
//! The live count is kept next to the map so that `len` never has to walk
//! the shards. Admission and the global clean both go through
//! [`AdmissionGuard`], which holds the registry's admission lock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use chanfetch_core::{ChanfetchError, DownloadId, Source};

use crate::task::TaskState;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<DownloadId, Arc<TaskState>>,
    len: AtomicUsize,
    admission: Mutex<()>,
    /// Set by a successful clean, cleared by the next first insert.
    cleaned: AtomicBool,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, id: DownloadId) -> Option<Arc<TaskState>> {
        self.tasks.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Inserts or replaces a task. Returns `true` on first insert.
    pub fn store(&self, task: Arc<TaskState>) -> bool {
        match self.tasks.entry(task.id()) {
            Entry::Occupied(mut entry) => {
                entry.insert(task);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(task);
                self.len.fetch_add(1, Ordering::AcqRel);
                self.cleaned.store(false, Ordering::Release);
                true
            }
        }
    }

    /// Removes a task. Returns `true` if it was present.
    pub fn delete(&self, id: DownloadId) -> bool {
        self.load_and_delete(id).is_some()
    }

    pub fn load_and_delete(&self, id: DownloadId) -> Option<Arc<TaskState>> {
        let (_, task) = self.tasks.remove(&id)?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }

    /// Removes `task` only if it is still the registered instance for its id.
    pub fn delete_task(&self, task: &Arc<TaskState>) -> bool {
        let removed = self
            .tasks
            .remove_if(&task.id(), |_, current| Arc::ptr_eq(current, task));
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        removed.is_some()
    }

    /// Snapshot of the registered tasks, ordered by download id.
    pub fn range(&self) -> Vec<Arc<TaskState>> {
        let mut tasks: Vec<_> = self
            .tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        tasks.sort_by_key(|task| task.id());
        tasks
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for the admission lock.
    pub async fn lock_admission(&self) -> AdmissionGuard<'_> {
        AdmissionGuard {
            registry: self,
            _guard: self.admission.lock().await,
        }
    }
}

/// Proof that the admission lock is held.
pub struct AdmissionGuard<'a> {
    registry: &'a TaskRegistry,
    _guard: MutexGuard<'a, ()>,
}

impl AdmissionGuard<'_> {
    /// Registers a newly admitted task.
    pub fn admit(&self, task: Arc<TaskState>) -> bool {
        self.registry.store(task)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Drops every transfer the source tracks and wipes its staging area,
    /// once per stretch of emptiness. Returns `false` when nothing was done
    /// because no task was registered since the last clean.
    ///
    /// The registry must be empty. A failed clean is retried by the next call.
    pub async fn clean(&self, source: &dyn Source) -> Result<bool, ChanfetchError> {
        if !self.registry.is_empty() {
            return Err(ChanfetchError::Internal(format!(
                "refusing to clean with {} registered tasks",
                self.registry.len()
            )));
        }
        if self.registry.cleaned.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let result = async {
            source.remove_all_downloads().await?;
            source.clean_download_directory().await
        }
        .await;
        if let Err(err) = result {
            self.registry.cleaned.store(false, Ordering::Release);
            return Err(err);
        }
        info!("source downloads and staging directory cleaned");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::queued;
    use proptest::prelude::*;

    fn task(id: DownloadId) -> Arc<TaskState> {
        Arc::new(TaskState::new(&queued(id, 1), 5))
    }

    #[test]
    fn store_counts_first_insert_only() {
        let registry = TaskRegistry::new();
        assert!(registry.store(task(1)));
        assert!(!registry.store(task(1)));
        assert_eq!(registry.len(), 1);
        assert!(registry.load(1).is_some());
    }

    #[test]
    fn delete_counts_present_entries_only() {
        let registry = TaskRegistry::new();
        registry.store(task(1));
        assert!(registry.delete(1));
        assert!(!registry.delete(1));
        assert!(registry.is_empty());
        assert!(registry.load_and_delete(1).is_none());
    }

    #[test]
    fn range_is_sorted_snapshot() {
        let registry = TaskRegistry::new();
        for id in [3, 1, 2] {
            registry.store(task(id));
        }
        let ids: Vec<_> = registry.range().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn delete_task_ignores_replaced_instances() {
        let registry = TaskRegistry::new();
        let old = task(4);
        registry.store(Arc::clone(&old));
        let new = task(4);
        registry.store(Arc::clone(&new));
        assert!(!registry.delete_task(&old));
        assert_eq!(registry.len(), 1);
        assert!(registry.delete_task(&new));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn admission_guard_is_exclusive() {
        let registry = TaskRegistry::new();
        let guard = registry.lock_admission().await;
        assert!(registry.admission.try_lock().is_err());
        guard.admit(task(7));
        assert_eq!(guard.len(), 1);
        drop(guard);
        assert!(registry.admission.try_lock().is_ok());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Store(DownloadId),
        Delete(DownloadId),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..8).prop_map(Op::Store),
            (0i64..8).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn len_matches_range(ops in proptest::collection::vec(op(), 0..64)) {
            let registry = TaskRegistry::new();
            for op in ops {
                match op {
                    Op::Store(id) => { registry.store(task(id)); }
                    Op::Delete(id) => { registry.delete(id); }
                }
                prop_assert_eq!(registry.len(), registry.range().len());
            }
        }
    }
}
