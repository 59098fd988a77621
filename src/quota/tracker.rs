//! Monthly usage budget per provider, persisted as JSON.
//!
//! Each provider gets one file under the quota directory. Every mutation is
//! a locked reload → verify → apply → write-temp → rename cycle, so several
//! engine processes sharing the directory never push `used` past `limit`.
//! Billable calls reserve their units in that cycle before they go out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Most recent usage records kept per provider
pub const HISTORY_LIMIT: usize = 100;

const LOCK_RETRY: Duration = Duration::from_millis(25);
const LOCK_ATTEMPTS: u32 = 200;
/// Locks older than this are assumed abandoned by a crashed process
const STALE_LOCK: Duration = Duration::from_secs(30);

/// One billable call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub amount: u64,
    pub label: String,
}

/// Persisted usage for one provider and billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Billing period, "YYYY-MM"
    pub period_key: String,
    pub used: u64,
    pub limit: u64,
    #[serde(default)]
    pub history: Vec<UsageRecord>,
}

impl QuotaState {
    fn fresh(period_key: &str, limit: u64) -> Self {
        Self {
            period_key: period_key.to_string(),
            used: 0,
            limit,
            history: Vec::new(),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn allows(&self, amount: u64) -> bool {
        self.used.saturating_add(amount) <= self.limit
    }

    /// Start a new period: usage resets, history is kept
    fn roll_to(&mut self, period_key: &str) {
        if self.period_key != period_key {
            info!(
                "Quota period changed {} -> {}, resetting usage ({} used)",
                self.period_key, period_key, self.used
            );
            self.period_key = period_key.to_string();
            self.used = 0;
        }
    }

    fn push(&mut self, amount: u64, label: &str) -> UsageRecord {
        let record = UsageRecord {
            timestamp: Utc::now(),
            amount,
            label: label.chars().take(50).collect(),
        };
        self.used += amount;
        self.history.push(record.clone());
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
        record
    }
}

/// Calendar month key for now
pub fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// Budget guard for one provider
#[derive(Debug)]
pub struct QuotaTracker {
    provider: String,
    path: PathBuf,
    limit: u64,
    fixed_period: Option<String>,
    state: Mutex<QuotaState>,
}

impl QuotaTracker {
    /// Open (or create) the record for `provider` in `dir`
    pub async fn open(dir: &Path, provider: &str, limit: u64) -> Result<Self> {
        Self::open_inner(dir, provider, limit, None).await
    }

    /// Open with a fixed billing period instead of the calendar month
    pub async fn open_for_period(dir: &Path, provider: &str, limit: u64, period_key: &str) -> Result<Self> {
        Self::open_inner(dir, provider, limit, Some(period_key.to_string())).await
    }

    async fn open_inner(dir: &Path, provider: &str, limit: u64, fixed_period: Option<String>) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{provider}.json"));
        let period = fixed_period.clone().unwrap_or_else(current_period);
        let state = read_state(&path, &period, limit).await?;
        debug!("Quota {provider}: {}/{} in {}", state.used, state.limit, state.period_key);

        Ok(Self {
            provider: provider.to_string(),
            path,
            limit,
            fixed_period,
            state: Mutex::new(state),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn period(&self) -> String {
        self.fixed_period.clone().unwrap_or_else(current_period)
    }

    /// Current usage, re-read from disk
    pub async fn status(&self) -> Result<QuotaState> {
        let mut state = self.state.lock().await;
        *state = read_state(&self.path, &self.period(), self.limit).await?;
        Ok(state.clone())
    }

    /// Whether `amount` more units fit in this period's budget
    pub async fn can_spend(&self, amount: u64) -> Result<bool> {
        Ok(self.status().await?.allows(amount))
    }

    /// Like [`can_spend`](Self::can_spend), but a rejection is an error
    pub async fn ensure(&self, amount: u64) -> Result<()> {
        let state = self.status().await?;
        if state.allows(amount) {
            Ok(())
        } else {
            Err(self.exhausted(&state, amount))
        }
    }

    /// Record a completed billable call and persist immediately
    pub async fn record_spend(&self, amount: u64, label: &str) -> Result<QuotaState> {
        let (state, _) = self
            .locked_update(|current| {
                self.admit(current, amount)?;
                Ok(current.push(amount, label))
            })
            .await?;
        debug!("Quota {}: {}/{} after {label}", self.provider, state.used, state.limit);
        Ok(state)
    }

    /// Hold `amount` units before a billable call goes out.
    ///
    /// The units count as spent from this point on. A call that fails hands
    /// them back with [`release`](Self::release); a call that succeeds keeps
    /// the record as its spend.
    pub async fn reserve(&self, amount: u64, label: &str) -> Result<Reservation> {
        let (state, record) = self
            .locked_update(|current| {
                self.admit(current, amount)?;
                Ok(current.push(amount, label))
            })
            .await?;
        debug!("Quota {}: reserved {amount}, {}/{} held", self.provider, state.used, state.limit);
        Ok(Reservation {
            period_key: state.period_key,
            record,
        })
    }

    /// Return the units of a reservation whose call did not go through
    pub async fn release(&self, reservation: Reservation) -> Result<QuotaState> {
        let (state, ()) = self
            .locked_update(|current| {
                if let Some(pos) = current.history.iter().rposition(|r| *r == reservation.record) {
                    current.history.remove(pos);
                }
                if current.period_key == reservation.period_key {
                    current.used = current.used.saturating_sub(reservation.record.amount);
                }
                Ok(())
            })
            .await?;
        debug!(
            "Quota {}: released {}, {}/{} used",
            self.provider, reservation.record.amount, state.used, state.limit
        );
        Ok(state)
    }

    /// Locked reload → apply → write cycle; nothing is written when `apply` fails
    async fn locked_update<R, F>(&self, apply: F) -> Result<(QuotaState, R)>
    where
        F: FnOnce(&mut QuotaState) -> Result<R>,
    {
        let mut state = self.state.lock().await;
        let _lock = FileLock::acquire(&self.path.with_extension("lock")).await?;

        let mut current = read_state(&self.path, &self.period(), self.limit).await?;
        let applied = apply(&mut current);
        if applied.is_ok() {
            write_state(&self.path, &current).await?;
        }
        *state = current.clone();
        Ok((current, applied?))
    }

    fn admit(&self, state: &QuotaState, amount: u64) -> Result<()> {
        if state.allows(amount) {
            return Ok(());
        }
        warn!(
            "Quota {}: rejecting {} units ({}/{} used)",
            self.provider, amount, state.used, state.limit
        );
        Err(self.exhausted(state, amount))
    }

    fn exhausted(&self, state: &QuotaState, requested: u64) -> EngineError {
        EngineError::QuotaExhausted {
            provider: self.provider.clone(),
            used: state.used,
            limit: state.limit,
            requested,
        }
    }
}

/// Units held by [`QuotaTracker::reserve`] for one in-flight call
#[derive(Debug, Clone)]
pub struct Reservation {
    period_key: String,
    record: UsageRecord,
}

impl Reservation {
    pub fn amount(&self) -> u64 {
        self.record.amount
    }
}

async fn read_state(path: &Path, period: &str, limit: u64) -> Result<QuotaState> {
    let mut state = match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str::<QuotaState>(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => QuotaState::fresh(period, limit),
        Err(e) => return Err(e.into()),
    };
    state.roll_to(period);
    state.limit = limit;
    Ok(state)
}

async fn write_state(path: &Path, state: &QuotaState) -> Result<()> {
    let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
    let content = serde_json::to_string_pretty(state)?;
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Exclusive lock file, removed on drop
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    async fn acquire(path: &Path) -> Result<Self> {
        for _ in 0..LOCK_ATTEMPTS {
            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(path).await {
                Ok(_) => return Ok(Self { path: path.to_path_buf() }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let stale = tokio::fs::metadata(path)
                        .await
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .and_then(|t| t.elapsed().ok())
                        .is_some_and(|age| age > STALE_LOCK);
                    if stale {
                        warn!("Removing stale quota lock {}", path.display());
                        tokio::fs::remove_file(path).await.ok();
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Timeout {
            what: format!("quota lock {}", path.display()),
            secs: LOCK_RETRY.as_secs_f64() * f64::from(LOCK_ATTEMPTS),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}
