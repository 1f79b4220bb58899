//! In-process implementation of every ledger and of the report source.
//!
//! State lives behind a single mutex, so each trait call is atomic, including
//! the throttle compare-and-set and the retry claim. Used by the scenario tests
//! and by dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use brandnotify_core::{
    AbandonedRecord, AnalysisLookup, BrandKey, CompletionLedger, CursorStore, LedgerError,
    OptOutList, Report, ReportAnalysis, ReportSource, RetryFailure, RetryLedger, RetryPolicy,
    RetryRecord, ThrottleDecision, ThrottleLedger,
};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Default)]
struct State {
    reports: BTreeMap<i64, Report>,
    images: BTreeMap<i64, Vec<u8>>,
    analyses: BTreeMap<(i64, String), ReportAnalysis>,
    throttle: HashMap<BrandKey, DateTime<Utc>>,
    retries: BTreeMap<i64, RetryRecord>,
    abandoned: BTreeMap<i64, AbandonedRecord>,
    completed: BTreeMap<i64, DateTime<Utc>>,
    cursors: HashMap<String, i64>,
    opt_outs: BTreeSet<String>,
}

#[derive(Debug)]
pub struct MemoryStore {
    language: String,
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("en")
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            state: Mutex::new(State::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("memory store offline".to_string()));
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn snapshot(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent call fail with [`LedgerError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn insert_report(&self, report: Report) {
        self.snapshot().reports.insert(report.seq, report);
    }

    pub fn insert_image(&self, seq: i64, bytes: Vec<u8>) {
        self.snapshot().images.insert(seq, bytes);
    }

    pub fn insert_analysis(&self, analysis: ReportAnalysis) {
        self.snapshot()
            .analyses
            .insert((analysis.seq, analysis.language.clone()), analysis);
    }

    #[must_use]
    pub fn last_sent_at(&self, brand_key: &BrandKey) -> Option<DateTime<Utc>> {
        self.snapshot().throttle.get(brand_key).copied()
    }

    #[must_use]
    pub fn completed_seqs(&self) -> BTreeSet<i64> {
        self.snapshot().completed.keys().copied().collect()
    }

    #[must_use]
    pub fn abandoned_record(&self, seq: i64) -> Option<AbandonedRecord> {
        self.snapshot().abandoned.get(&seq).cloned()
    }

    #[must_use]
    pub fn retry_record(&self, seq: i64) -> Option<RetryRecord> {
        self.snapshot().retries.get(&seq).cloned()
    }

    #[must_use]
    pub fn cursor(&self, consumer: &str) -> i64 {
        self.snapshot().cursors.get(consumer).copied().unwrap_or(0)
    }

    fn finished(state: &State, seq: i64) -> bool {
        state.completed.contains_key(&seq) || state.abandoned.contains_key(&seq)
    }

    fn analyzed_seqs<'a>(&'a self, state: &'a State) -> impl Iterator<Item = i64> + 'a {
        state
            .analyses
            .keys()
            .filter(move |(_, language)| *language == self.language)
            .map(|(seq, _)| *seq)
    }
}

#[async_trait]
impl ThrottleLedger for MemoryStore {
    async fn try_acquire(
        &self,
        brand_key: &BrandKey,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<ThrottleDecision, LedgerError> {
        let mut state = self.state()?;
        if let Some(last) = state.throttle.get(brand_key) {
            if now - *last < cooldown {
                return Ok(ThrottleDecision::Throttled {
                    retry_after: *last + cooldown,
                });
            }
        }
        state.throttle.insert(brand_key.clone(), now);
        Ok(ThrottleDecision::Allowed)
    }
}

#[async_trait]
impl RetryLedger for MemoryStore {
    async fn get_many(&self, seqs: &[i64]) -> Result<BTreeMap<i64, RetryRecord>, LedgerError> {
        let state = self.state()?;
        Ok(seqs
            .iter()
            .filter_map(|seq| state.retries.get(seq).map(|r| (*seq, r.clone())))
            .collect())
    }

    async fn claim(
        &self,
        seq: i64,
        expected_attempts: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state()?;
        match state.retries.get_mut(&seq) {
            Some(record) if record.attempts == expected_attempts && record.is_eligible(now) => {
                record.next_eligible_at = now + lease;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failure(
        &self,
        failure: &RetryFailure,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<u32, LedgerError> {
        let mut state = self.state()?;
        let attempts = state
            .retries
            .get(&failure.seq)
            .map_or(0, |r| r.attempts)
            .saturating_add(1);

        state.retries.insert(
            failure.seq,
            RetryRecord {
                seq: failure.seq,
                brand_key: failure.brand_key.clone(),
                attempts,
                last_reason: failure.reason.clone(),
                next_eligible_at: policy.next_eligible_at(attempts, now),
                pending_recipients: failure.pending_recipients.clone(),
            },
        );
        Ok(attempts)
    }

    async fn abandon(&self, record: &AbandonedRecord) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        state
            .abandoned
            .entry(record.seq)
            .or_insert_with(|| record.clone());
        state.retries.remove(&record.seq);
        Ok(())
    }

    async fn abandoned_among(&self, seqs: &[i64]) -> Result<BTreeSet<i64>, LedgerError> {
        let state = self.state()?;
        Ok(seqs
            .iter()
            .copied()
            .filter(|seq| state.abandoned.contains_key(seq))
            .collect())
    }

    async fn clear(&self, seqs: &[i64]) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        for seq in seqs {
            state.retries.remove(seq);
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionLedger for MemoryStore {
    async fn completed_among(&self, seqs: &[i64]) -> Result<BTreeSet<i64>, LedgerError> {
        let state = self.state()?;
        Ok(seqs
            .iter()
            .copied()
            .filter(|seq| state.completed.contains_key(seq))
            .collect())
    }

    async fn mark_completed(&self, seqs: &[i64], now: DateTime<Utc>) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        for seq in seqs {
            state.completed.entry(*seq).or_insert(now);
        }
        Ok(())
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn read(&self, consumer: &str) -> Result<i64, LedgerError> {
        Ok(self.state()?.cursors.get(consumer).copied().unwrap_or(0))
    }

    async fn advance(&self, consumer: &str, seq: i64) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        let current = state.cursors.get(consumer).copied().unwrap_or(0);
        if seq < current {
            return Err(LedgerError::Regression {
                consumer: consumer.to_string(),
                current,
                requested: seq,
            });
        }
        state.cursors.insert(consumer.to_string(), seq);
        Ok(())
    }
}

#[async_trait]
impl ReportSource for MemoryStore {
    async fn get_report(&self, seq: i64) -> Result<Option<Report>, LedgerError> {
        Ok(self.state()?.reports.get(&seq).cloned())
    }

    async fn get_analysis(&self, seq: i64) -> Result<AnalysisLookup, LedgerError> {
        let state = self.state()?;
        Ok(state
            .analyses
            .get(&(seq, self.language.clone()))
            .cloned()
            .map_or(AnalysisLookup::NotYetAnalyzed, AnalysisLookup::Ready))
    }

    async fn report_image(&self, seq: i64) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.state()?.images.get(&seq).cloned())
    }

    async fn list_analyzed_after(&self, cursor: i64, limit: i64) -> Result<Vec<i64>, LedgerError> {
        let state = self.state()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .analyzed_seqs(&state)
            .filter(|seq| *seq > cursor)
            .take(limit)
            .collect())
    }

    async fn list_unfinished_up_to(
        &self,
        after: i64,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<i64>, LedgerError> {
        let state = self.state()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .analyzed_seqs(&state)
            .filter(|seq| *seq > after && *seq <= cursor && !Self::finished(&state, *seq))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl OptOutList for MemoryStore {
    async fn is_opted_out(&self, email: &str) -> Result<bool, LedgerError> {
        Ok(self.state()?.opt_outs.contains(&email.trim().to_lowercase()))
    }

    async fn opted_out_among(
        &self,
        emails: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, LedgerError> {
        let state = self.state()?;
        Ok(emails
            .iter()
            .filter(|e| state.opt_outs.contains(&e.trim().to_lowercase()))
            .cloned()
            .collect())
    }

    async fn opt_out(&self, email: &str) -> Result<bool, LedgerError> {
        Ok(self.state()?.opt_outs.insert(email.trim().to_lowercase()))
    }
}
