use super::error::{CredentialServiceError, PoolError};
use super::model::{Credential, CredentialStatus, FatalReason};
use crate::error::AppResult;
use crate::infrastructure::repositories::CredentialStore;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Slack added to a cooldown expiry before waking a blocked acquire.
const COOLDOWN_WAKE_MARGIN: Duration = Duration::from_millis(500);

struct PoolEntry {
    credential: Credential,
    cooldown_until: Option<Instant>,
    holder: Option<String>,
    /// Set while a delete is in flight; the entry is no longer selectable
    removing: bool,
}

impl PoolEntry {
    fn new(credential: Credential) -> Self {
        // Cooldowns survive restarts as wall-clock timestamps
        let cooldown_until = credential
            .cooldown_until
            .and_then(|until| (until - Utc::now()).to_std().ok())
            .map(|remaining| Instant::now() + remaining);

        Self {
            credential,
            cooldown_until,
            holder: None,
            removing: false,
        }
    }

    fn is_cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now <= until)
    }
}

struct PoolInner {
    entries: Mutex<Vec<PoolEntry>>,
    changed: Notify,
    store: Arc<dyn CredentialStore>,
    /// Serializes store writes so they land in mutation order
    writes: tokio::sync::Mutex<()>,
    default_cooldown: Duration,
}

impl PoolInner {
    fn release(&self, credential_id: Uuid, request_id: &str) -> bool {
        let released = {
            let mut entries = self.entries.lock();
            match entries
                .iter_mut()
                .find(|entry| entry.credential.id == credential_id)
            {
                Some(entry) if entry.holder.as_deref() == Some(request_id) => {
                    entry.holder = None;
                    true
                }
                _ => false,
            }
        };

        if released {
            tracing::trace!(credential_id = %credential_id, request_id, "Credential lock released");
            self.changed.notify_waiters();
        }
        released
    }
}

/// Exclusive use of one credential for one request.
///
/// The lock is released when the lease is dropped, whatever path the holder
/// leaves through.
pub struct CredentialLease {
    pool: Arc<PoolInner>,
    credential_id: Uuid,
    label: String,
    secret: String,
    request_id: String,
}

impl CredentialLease {
    pub fn credential_id(&self) -> Uuid {
        self.credential_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl std::fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLease")
            .field("credential_id", &self.credential_id)
            .field("label", &self.label)
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.pool.release(self.credential_id, &self.request_id);
    }
}

/// Why an acquire had to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolWait {
    /// Time until the nearest cooldown expires, if any candidate is cooling down
    pub wake_in: Option<Duration>,
    pub cooling: usize,
    pub locked: usize,
}

pub enum Acquisition {
    Acquired(CredentialLease),
    /// Every candidate is locked by another request or cooling down
    Wait {
        wake_at: Option<Instant>,
        cooling: usize,
        locked: usize,
    },
    Exhausted(PoolError),
}

/// Shared pool of provider credentials.
///
/// Owns the lock map: at most one request holds a given credential at a time.
#[derive(Clone)]
pub struct CredentialPool {
    inner: Arc<PoolInner>,
}

impl CredentialPool {
    pub fn new(
        credentials: Vec<Credential>,
        store: Arc<dyn CredentialStore>,
        default_cooldown: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                entries: Mutex::new(credentials.into_iter().map(PoolEntry::new).collect()),
                changed: Notify::new(),
                store,
                writes: tokio::sync::Mutex::new(()),
                default_cooldown,
            }),
        }
    }

    /// Build the pool from everything the store holds
    pub async fn load(
        store: Arc<dyn CredentialStore>,
        default_cooldown: Duration,
    ) -> Result<Self, CredentialServiceError> {
        let credentials = store.find_all().await?;
        tracing::info!(count = credentials.len(), "Credentials loaded");
        Ok(Self::new(credentials, store, default_cooldown))
    }

    /// Try to lock an eligible credential without waiting.
    ///
    /// Eligible means active, not terminally failed, not excluded, not locked
    /// and not cooling down. The least used one wins; ties go to the oldest.
    pub fn try_acquire(&self, request_id: &str, excluded: &HashSet<Uuid>) -> Acquisition {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();

        let mut best: Option<usize> = None;
        let mut unusable = 0;
        let mut excluded_count = 0;
        let mut locked = 0;
        let mut cooling = 0;
        let mut wake_at: Option<Instant> = None;

        for (index, entry) in entries.iter().enumerate() {
            if entry.removing {
                continue;
            }
            if !entry.credential.is_usable() {
                unusable += 1;
                continue;
            }
            if excluded.contains(&entry.credential.id) {
                excluded_count += 1;
                continue;
            }
            if entry.holder.is_some() {
                locked += 1;
                continue;
            }
            if entry.is_cooling_down(now) {
                cooling += 1;
                wake_at = match (wake_at, entry.cooldown_until) {
                    (Some(current), Some(until)) => Some(current.min(until)),
                    (None, until) => until,
                    (current, None) => current,
                };
                continue;
            }

            best = match best {
                Some(current)
                    if entries[current].credential.usage_count
                        <= entry.credential.usage_count =>
                {
                    Some(current)
                }
                _ => Some(index),
            };
        }

        if let Some(index) = best {
            let entry = &mut entries[index];
            entry.holder = Some(request_id.to_string());
            entry.cooldown_until = None;

            tracing::debug!(
                credential = %entry.credential.label,
                request_id,
                "Credential lock acquired"
            );

            return Acquisition::Acquired(CredentialLease {
                pool: self.inner.clone(),
                credential_id: entry.credential.id,
                label: entry.credential.label.clone(),
                secret: entry.credential.secret.clone(),
                request_id: request_id.to_string(),
            });
        }

        if locked + cooling > 0 {
            return Acquisition::Wait {
                wake_at: wake_at.map(|at| at + COOLDOWN_WAKE_MARGIN),
                cooling,
                locked,
            };
        }

        Acquisition::Exhausted(PoolError::Exhausted {
            total: entries.len(),
            unusable,
            excluded: excluded_count,
        })
    }

    /// Lock an eligible credential, waiting while every candidate is busy or
    /// cooling down. Fails at once when no candidate exists at all.
    pub async fn acquire(
        &self,
        request_id: &str,
        excluded: &HashSet<Uuid>,
    ) -> Result<CredentialLease, PoolError> {
        self.acquire_observed(request_id, excluded, |_| {}).await
    }

    /// Same as [`acquire`](Self::acquire), reporting every wait to `on_wait`.
    pub async fn acquire_observed(
        &self,
        request_id: &str,
        excluded: &HashSet<Uuid>,
        mut on_wait: impl FnMut(PoolWait),
    ) -> Result<CredentialLease, PoolError> {
        loop {
            // Register before inspecting state so a release in between is not missed
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            match self.try_acquire(request_id, excluded) {
                Acquisition::Acquired(lease) => return Ok(lease),
                Acquisition::Exhausted(err) => return Err(err),
                Acquisition::Wait {
                    wake_at,
                    cooling,
                    locked,
                } => {
                    let wake_in = wake_at.map(|at| at.saturating_duration_since(Instant::now()));
                    on_wait(PoolWait {
                        wake_in,
                        cooling,
                        locked,
                    });

                    match wake_at {
                        Some(at) => {
                            tokio::select! {
                                _ = &mut changed => {}
                                _ = tokio::time::sleep_until(at) => {}
                            }
                        }
                        None => changed.await,
                    }
                }
            }
        }
    }

    /// Lock one specific credential regardless of its status. Used by validation.
    pub fn acquire_specific(
        &self,
        credential_id: Uuid,
        request_id: &str,
    ) -> Result<CredentialLease, CredentialServiceError> {
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.credential.id == credential_id && !entry.removing)
            .ok_or(CredentialServiceError::NotFound)?;

        if let Some(holder) = &entry.holder {
            return Err(CredentialServiceError::Conflict(format!(
                "Credential \"{}\" is in use by {}",
                entry.credential.label, holder
            )));
        }

        entry.holder = Some(request_id.to_string());
        Ok(CredentialLease {
            pool: self.inner.clone(),
            credential_id,
            label: entry.credential.label.clone(),
            secret: entry.credential.secret.clone(),
            request_id: request_id.to_string(),
        })
    }

    /// Release a lock held by `request_id`. Locks held by other requests are left alone.
    pub fn release(&self, credential_id: Uuid, request_id: &str) -> bool {
        self.inner.release(credential_id, request_id)
    }

    pub async fn record_success(&self, credential_id: Uuid) {
        self.update(credential_id, |entry| {
            let credential = &mut entry.credential;
            credential.usage_count += 1;
            credential.last_used_at = Some(Utc::now());
            if credential.status == CredentialStatus::Unknown {
                credential.status = CredentialStatus::Valid;
                credential.status_message = None;
            }
        });
        self.persist(credential_id).await;
    }

    /// Put a credential in cooldown. Returns the delay applied.
    pub async fn record_rate_limited(
        &self,
        credential_id: Uuid,
        retry_after: Option<Duration>,
    ) -> Duration {
        let delay = retry_after.unwrap_or(self.inner.default_cooldown);
        let snapshot = self.update(credential_id, |entry| {
            let until = Instant::now() + delay;
            entry.cooldown_until = Some(match entry.cooldown_until {
                Some(current) => current.max(until),
                None => until,
            });
            entry.credential.cooldown_until = chrono::Duration::from_std(delay)
                .ok()
                .map(|delay| Utc::now() + delay);
        });

        if let Some(credential) = &snapshot {
            tracing::warn!(
                credential = %credential.label,
                cooldown_secs = delay.as_secs_f64(),
                "Credential rate limited, cooling down"
            );
        }
        self.persist(credential_id).await;
        delay
    }

    /// Mark a credential terminally unusable until it is revalidated
    pub async fn record_fatal(&self, credential_id: Uuid, reason: FatalReason) {
        let snapshot = self.update(credential_id, |entry| {
            entry.credential.status = reason.status();
            entry.credential.status_message = Some(reason.message().to_string());
        });

        if let Some(credential) = &snapshot {
            tracing::error!(
                credential = %credential.label,
                status = %credential.status,
                reason = %reason,
                "Credential excluded from pool"
            );
        }
        self.persist(credential_id).await;
        self.inner.changed.notify_waiters();
    }

    pub async fn add(&self, label: &str, secret: &str) -> Result<Credential, CredentialServiceError> {
        let credential = {
            let mut entries = self.inner.entries.lock();
            if entries.iter().any(|entry| entry.credential.secret == secret) {
                return Err(CredentialServiceError::Conflict(
                    "Credential already registered".to_string(),
                ));
            }
            let credential = Credential::new(label, secret);
            entries.push(PoolEntry::new(credential.clone()));
            credential
        };

        let saved = {
            let _write = self.inner.writes.lock().await;
            self.inner.store.save(&credential).await
        };
        if let Err(e) = saved {
            self.inner
                .entries
                .lock()
                .retain(|entry| entry.credential.id != credential.id);
            return Err(e.into());
        }

        self.inner.changed.notify_waiters();
        Ok(credential)
    }

    /// Delete a credential. Refused while a request holds it.
    ///
    /// The entry stops being selectable before the store is touched, so no
    /// request can take it while the delete is in flight.
    pub async fn remove(&self, credential_id: Uuid) -> Result<(), CredentialServiceError> {
        {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .iter_mut()
                .find(|entry| entry.credential.id == credential_id && !entry.removing)
                .ok_or(CredentialServiceError::NotFound)?;
            if let Some(holder) = &entry.holder {
                return Err(CredentialServiceError::Conflict(format!(
                    "Credential \"{}\" is in use by {}",
                    entry.credential.label, holder
                )));
            }
            entry.removing = true;
        }

        let deleted = {
            let _write = self.inner.writes.lock().await;
            let deleted = self.inner.store.delete(credential_id).await;

            let mut entries = self.inner.entries.lock();
            match &deleted {
                Ok(()) => entries.retain(|entry| entry.credential.id != credential_id),
                Err(_) => {
                    if let Some(entry) = entries
                        .iter_mut()
                        .find(|entry| entry.credential.id == credential_id)
                    {
                        entry.removing = false;
                    }
                }
            }
            deleted
        };

        // Waiters re-check: a restored entry is selectable again
        self.inner.changed.notify_waiters();
        deleted?;

        tracing::info!(credential_id = %credential_id, "Credential removed");
        Ok(())
    }

    pub async fn set_active(
        &self,
        credential_id: Uuid,
        is_active: bool,
    ) -> Result<Credential, CredentialServiceError> {
        let snapshot = self
            .update(credential_id, |entry| entry.credential.is_active = is_active)
            .ok_or(CredentialServiceError::NotFound)?;
        let written = self.write_current(credential_id).await?;
        self.inner.changed.notify_waiters();
        Ok(written.unwrap_or(snapshot))
    }

    /// Clear terminal status and cooldown so the credential is selectable again
    pub async fn revalidate(&self, credential_id: Uuid) -> Result<Credential, CredentialServiceError> {
        self.set_status(credential_id, CredentialStatus::Unknown, None)
            .await
    }

    pub async fn set_status(
        &self,
        credential_id: Uuid,
        status: CredentialStatus,
        message: Option<String>,
    ) -> Result<Credential, CredentialServiceError> {
        let snapshot = self
            .update(credential_id, |entry| {
                entry.credential.status = status;
                entry.credential.status_message = message;
                if status == CredentialStatus::Unknown {
                    entry.cooldown_until = None;
                    entry.credential.cooldown_until = None;
                }
            })
            .ok_or(CredentialServiceError::NotFound)?;
        let written = self.write_current(credential_id).await?;
        self.inner.changed.notify_waiters();
        Ok(written.unwrap_or(snapshot))
    }

    /// Every credential with whether a request currently holds it
    pub fn snapshot(&self) -> Vec<(Credential, bool)> {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|entry| (entry.credential.clone(), entry.holder.is_some()))
            .collect()
    }

    pub fn get(&self, credential_id: Uuid) -> Option<(Credential, bool)> {
        self.inner
            .entries
            .lock()
            .iter()
            .find(|entry| entry.credential.id == credential_id)
            .map(|entry| (entry.credential.clone(), entry.holder.is_some()))
    }

    /// Number of active credentials that are not terminally failed
    pub fn usable_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .iter()
            .filter(|entry| !entry.removing && entry.credential.is_usable())
            .count()
    }

    pub fn holder_of(&self, credential_id: Uuid) -> Option<String> {
        self.inner
            .entries
            .lock()
            .iter()
            .find(|entry| entry.credential.id == credential_id)
            .and_then(|entry| entry.holder.clone())
    }

    fn update(
        &self,
        credential_id: Uuid,
        apply: impl FnOnce(&mut PoolEntry),
    ) -> Option<Credential> {
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.credential.id == credential_id)?;
        apply(entry);
        Some(entry.credential.clone())
    }

    /// Write the current in-memory state of a credential to the store.
    ///
    /// The state is read after the write lock is taken, so a stale snapshot
    /// never overwrites a newer one. Removed credentials are not written back.
    async fn write_current(&self, credential_id: Uuid) -> AppResult<Option<Credential>> {
        let _write = self.inner.writes.lock().await;
        let current = self
            .inner
            .entries
            .lock()
            .iter()
            .find(|entry| entry.credential.id == credential_id)
            .map(|entry| entry.credential.clone());

        let Some(credential) = current else {
            return Ok(None);
        };
        self.inner.store.save(&credential).await?;
        Ok(Some(credential))
    }

    async fn persist(&self, credential_id: Uuid) {
        if let Err(e) = self.write_current(credential_id).await {
            tracing::warn!(
                error = %e,
                credential_id = %credential_id,
                "Failed to persist credential state"
            );
        }
    }
}
