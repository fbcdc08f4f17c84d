use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::models::{Mark, Scheme, SemesterResult, Subject};

#[async_trait]
pub trait ExamStore: Send + Sync {
    type Tx: ExamTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
pub trait ExamTransaction: Send {
    async fn scheme(&mut self, scheme_id: i64) -> Result<Option<Scheme>, StoreError>;

    async fn marks_for_scheme(&mut self, scheme_id: i64) -> Result<Vec<Mark>, StoreError>;

    async fn subject(&mut self, subject_id: i64) -> Result<Option<Subject>, StoreError>;

    async fn save_mark(&mut self, mark: &Mark) -> Result<(), StoreError>;

    async fn find_result(
        &mut self,
        student_id: &str,
        scheme_id: i64,
    ) -> Result<Option<SemesterResult>, StoreError>;

    /// Inserts the result, or overwrites the row with the same
    /// (student, scheme, attempt) key.
    async fn upsert_result(&mut self, result: &SemesterResult) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub schemes: HashMap<i64, Scheme>,
    pub subjects: HashMap<i64, Subject>,
    pub marks: Vec<Mark>,
    pub results: Vec<SemesterResult>,
}

// One transaction at a time holds the lock; uncommitted writes stay in `staged`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTransaction { guard, staged })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl ExamTransaction for MemoryTransaction {
    async fn scheme(&mut self, scheme_id: i64) -> Result<Option<Scheme>, StoreError> {
        Ok(self.staged.schemes.get(&scheme_id).cloned())
    }

    async fn marks_for_scheme(&mut self, scheme_id: i64) -> Result<Vec<Mark>, StoreError> {
        Ok(self
            .staged
            .marks
            .iter()
            .filter(|mark| mark.scheme_id == scheme_id)
            .cloned()
            .collect())
    }

    async fn subject(&mut self, subject_id: i64) -> Result<Option<Subject>, StoreError> {
        Ok(self.staged.subjects.get(&subject_id).cloned())
    }

    async fn save_mark(&mut self, mark: &Mark) -> Result<(), StoreError> {
        let stored = self
            .staged
            .marks
            .iter_mut()
            .find(|stored| stored.mark_id == mark.mark_id)
            .ok_or_else(|| StoreError::Other(format!("mark {} does not exist", mark.mark_id)))?;
        stored.grade_point = mark.grade_point;
        stored.grade_letter = mark.grade_letter.clone();
        Ok(())
    }

    async fn find_result(
        &mut self,
        student_id: &str,
        scheme_id: i64,
    ) -> Result<Option<SemesterResult>, StoreError> {
        Ok(self
            .staged
            .results
            .iter()
            .find(|result| result.student_id == student_id && result.scheme_id == scheme_id)
            .cloned())
    }

    async fn upsert_result(&mut self, result: &SemesterResult) -> Result<(), StoreError> {
        let existing = self.staged.results.iter_mut().find(|stored| {
            stored.student_id == result.student_id
                && stored.scheme_id == result.scheme_id
                && stored.attempt_no == result.attempt_no
        });

        match existing {
            Some(stored) => {
                stored.total_credits_registered = result.total_credits_registered;
                stored.total_credits_earned = result.total_credits_earned;
                stored.sgpa = result.sgpa;
                stored.updated_at = result.updated_at;
            }
            None => self.staged.results.push(result.clone()),
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
