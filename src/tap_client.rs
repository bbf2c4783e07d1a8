//! Client side of tapping.
//!
//! Taps are applied to a local copy of the player straight away and queued.
//! Every couple of seconds the queue is sent to the API as one aggregated
//! batch. A batch the server refuses is rolled back locally by its inverse.
//! There is no idempotency key, so a batch that reached the server but whose
//! answer was lost gets credited again if resent.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::models::{TapRequest, TelegramUser, User};

pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);
pub const REGEN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("out of energy")]
    OutOfEnergy,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapBatch {
    pub user_id: Uuid,
    pub taps: i64,
    pub coins: i64,
}

/// Destination of flushed batches.
pub trait TapSink {
    fn submit(&self, batch: TapBatch) -> impl Future<Output = Result<User, ClientError>> + Send;
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

/// Sends batches to `POST /api/user/tap`.
#[derive(Clone)]
pub struct HttpTapSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTapSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Signs in (or registers) the player and returns the server copy.
    pub async fn login(&self, profile: &TelegramUser) -> Result<User, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/auth/telegram", self.base_url))
            .json(profile)
            .send()
            .await?;
        read_user(response).await
    }
}

async fn read_user(response: reqwest::Response) -> Result<User, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let envelope: UserEnvelope = response.json().await?;
    Ok(envelope.user)
}

impl TapSink for HttpTapSink {
    fn submit(&self, batch: TapBatch) -> impl Future<Output = Result<User, ClientError>> + Send {
        let request = self
            .client
            .post(format!("{}/api/user/tap", self.base_url))
            .json(&TapRequest {
                user_id: batch.user_id,
                coins_earned: batch.coins,
                taps: batch.taps,
            });

        async move { read_user(request.send().await?).await }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalUser {
    pub coins: i64,
    pub energy: i64,
    pub max_energy: i64,
    pub total_taps: i64,
    pub coins_per_tap: i64,
    pub energy_regen_rate: i64,
}

impl From<&User> for LocalUser {
    fn from(user: &User) -> Self {
        Self {
            coins: user.coins,
            energy: user.energy,
            max_energy: user.max_energy,
            total_taps: user.total_taps,
            coins_per_tap: user.coins_per_tap,
            energy_regen_rate: user.energy_regen_rate,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    taps: i64,
    coins: i64,
}

struct State {
    local: LocalUser,
    pending: Pending,
}

pub struct TapBatcher<S> {
    user_id: Uuid,
    sink: S,
    state: Mutex<State>,
    // One batch in flight at a time.
    flushing: tokio::sync::Mutex<()>,
    flush_interval: Duration,
    regen_interval: Duration,
}

impl<S: TapSink> TapBatcher<S> {
    pub fn new(user: &User, sink: S) -> Self {
        Self {
            user_id: user.id,
            sink,
            state: Mutex::new(State {
                local: LocalUser::from(user),
                pending: Pending::default(),
            }),
            flushing: tokio::sync::Mutex::new(()),
            flush_interval: FLUSH_INTERVAL,
            regen_interval: REGEN_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, flush: Duration, regen: Duration) -> Self {
        self.flush_interval = flush;
        self.regen_interval = regen;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> LocalUser {
        self.state().local
    }

    pub fn pending_taps(&self) -> i64 {
        self.state().pending.taps
    }

    pub fn tap(&self) -> Result<LocalUser, ClientError> {
        let mut state = self.state();
        if state.local.energy <= 0 {
            return Err(ClientError::OutOfEnergy);
        }

        let earned = state.local.coins_per_tap;
        state.local.coins += earned;
        state.local.energy -= 1;
        state.local.total_taps += 1;
        state.pending.taps += 1;
        state.pending.coins += earned;
        Ok(state.local)
    }

    pub fn regenerate(&self) {
        let mut state = self.state();
        let local = &mut state.local;
        local.energy = (local.energy + local.energy_regen_rate).min(local.max_energy);
    }

    /// Sends queued taps. `Ok(None)` when there was nothing to send.
    pub async fn flush(&self) -> Result<Option<User>, ClientError> {
        let _in_flight = self.flushing.lock().await;

        let pending = std::mem::take(&mut self.state().pending);
        if pending.taps == 0 {
            return Ok(None);
        }

        let batch = TapBatch {
            user_id: self.user_id,
            taps: pending.taps,
            coins: pending.coins,
        };
        debug!("Flushing {} taps worth {} coins", batch.taps, batch.coins);

        match self.sink.submit(batch).await {
            Ok(user) => {
                let mut state = self.state();
                // Taps made while the batch was in flight stay on top of the server copy.
                let queued = state.pending;
                let mut local = LocalUser::from(&user);
                local.coins += queued.coins;
                local.total_taps += queued.taps;
                local.energy = (local.energy - queued.taps).max(0);
                state.local = local;
                Ok(Some(user))
            }
            Err(e) => {
                warn!("Tap batch of {} rejected, rolling back: {}", batch.taps, e);
                let mut state = self.state();
                let local = &mut state.local;
                local.coins -= batch.coins;
                local.total_taps -= batch.taps;
                local.energy = (local.energy + batch.taps).min(local.max_energy);
                Err(e)
            }
        }
    }

    /// Flushes and regenerates on their intervals until `shutdown` resolves,
    /// then sends whatever is still queued.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut flush = tokio::time::interval(self.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut regen = tokio::time::interval(self.regen_interval);
        regen.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Both intervals fire immediately; skip those first ticks.
        flush.tick().await;
        regen.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = flush.tick() => {
                    let _ = self.flush().await;
                }
                _ = regen.tick() => self.regenerate(),
            }
        }

        let _ = self.flush().await;
    }
}
