//! Exclusive lease pool of virtual users

use crate::error::PoolError;
use crate::session::SessionSettings;
use crate::user::VirtualUser;
use loadcheck_core::{Credentials, RunContext};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// One pool entry; `user` is `None` while leased
#[derive(Debug)]
struct Slot {
    name: String,
    user: Option<VirtualUser>,
}

#[derive(Debug)]
struct PoolInner {
    settings: SessionSettings,
    slots: Mutex<Vec<Slot>>,
    released: Notify,
    rng: Mutex<StdRng>,
}

impl PoolInner {
    fn put_back(&self, user: VirtualUser) {
        let id = user.id();
        {
            let mut slots = self.slots.lock();
            debug_assert!(slots[id].user.is_none(), "user returned twice");
            slots[id].user = Some(user);
        }
        self.released.notify_waiters();
    }
}

/// Fixed-then-growing set of virtual users handed out as exclusive leases.
///
/// Cloning the pool is cheap and every clone shares the same users.
#[derive(Debug, Clone)]
pub struct UserPool {
    inner: Arc<PoolInner>,
}

impl UserPool {
    /// Build a pool from seed credentials with an entropy-seeded picker
    pub fn new(
        seeds: impl IntoIterator<Item = Credentials>,
        settings: SessionSettings,
    ) -> Result<Self, PoolError> {
        Self::with_rng(seeds, settings, StdRng::from_entropy())
    }

    /// Build a pool whose user selection is reproducible for `seed`
    pub fn seeded(
        seeds: impl IntoIterator<Item = Credentials>,
        settings: SessionSettings,
        seed: u64,
    ) -> Result<Self, PoolError> {
        Self::with_rng(seeds, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        seeds: impl IntoIterator<Item = Credentials>,
        settings: SessionSettings,
        rng: StdRng,
    ) -> Result<Self, PoolError> {
        let mut slots: Vec<Slot> = Vec::new();
        for credentials in seeds {
            if slots.iter().any(|s| s.name == credentials.name) {
                return Err(PoolError::DuplicateUser(credentials.name));
            }
            let user = VirtualUser::new(slots.len(), credentials, &settings)?;
            slots.push(Slot {
                name: user.name().to_string(),
                user: Some(user),
            });
        }

        info!("User pool created with {} users", slots.len());

        Ok(Self {
            inner: Arc::new(PoolInner {
                settings,
                slots: Mutex::new(slots),
                released: Notify::new(),
                rng: Mutex::new(rng),
            }),
        })
    }

    /// Lease a uniformly chosen idle user, waiting until one is free.
    ///
    /// Returns `None` once `ctx` is cancelled; callers treat that as "skip
    /// this iteration", not as a failure.
    pub async fn acquire_random(&self, ctx: &RunContext) -> Option<UserLease> {
        loop {
            if ctx.is_cancelled() {
                return None;
            }

            // Register interest before looking, so a release between the
            // look and the wait is not missed.
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(lease) = self.try_acquire_random() {
                return Some(lease);
            }

            debug!("No idle user, waiting for a release");
            tokio::select! {
                _ = ctx.cancelled() => return None,
                _ = &mut released => {}
            }
        }
    }

    /// Lease a uniformly chosen idle user without waiting
    pub fn try_acquire_random(&self) -> Option<UserLease> {
        let mut slots = self.inner.slots.lock();
        let idle: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.user.is_some())
            .map(|(idx, _)| idx)
            .collect();

        let idx = *idle.choose(&mut *self.inner.rng.lock())?;
        let user = slots[idx].user.take()?;
        Some(UserLease {
            user: Some(user),
            pool: self.inner.clone(),
        })
    }

    /// Add a newly created account, immediately available for leasing
    pub fn register(&self, credentials: Credentials) -> Result<(), PoolError> {
        {
            let mut slots = self.inner.slots.lock();
            if slots.iter().any(|s| s.name == credentials.name) {
                return Err(PoolError::DuplicateUser(credentials.name));
            }
            let user = VirtualUser::new(slots.len(), credentials, &self.inner.settings)?;
            debug!(user = %user.name(), "Registered user");
            slots.push(Slot {
                name: user.name().to_string(),
                user: Some(user),
            });
        }
        self.inner.released.notify_waiters();
        Ok(())
    }

    /// Clear the cookies of every idle user; returns how many were reset
    pub fn reset_idle_sessions(&self) -> usize {
        let mut slots = self.inner.slots.lock();
        let mut reset = 0;
        for user in slots.iter_mut().filter_map(|slot| slot.user.as_mut()) {
            user.reset_session();
            reset += 1;
        }
        reset
    }

    /// Total number of users, leased or not
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of users currently idle
    pub fn available(&self) -> usize {
        self.inner
            .slots
            .lock()
            .iter()
            .filter(|slot| slot.user.is_some())
            .count()
    }

    /// Names of every user in registration order
    pub fn names(&self) -> Vec<String> {
        self.inner
            .slots
            .lock()
            .iter()
            .map(|slot| slot.name.clone())
            .collect()
    }
}

/// Exclusive ownership of one [`VirtualUser`].
///
/// Releasing consumes the lease, so a user cannot be returned twice.
/// Dropping a lease without releasing it also returns the user.
#[derive(Debug)]
pub struct UserLease {
    user: Option<VirtualUser>,
    pool: Arc<PoolInner>,
}

impl UserLease {
    /// Return the user to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for UserLease {
    type Target = VirtualUser;

    fn deref(&self) -> &VirtualUser {
        self.user
            .as_ref()
            .expect("lease holds its user until dropped")
    }
}

impl DerefMut for UserLease {
    fn deref_mut(&mut self) -> &mut VirtualUser {
        self.user
            .as_mut()
            .expect("lease holds its user until dropped")
    }
}

impl Drop for UserLease {
    fn drop(&mut self) {
        if let Some(user) = self.user.take() {
            self.pool.put_back(user);
        }
    }
}
