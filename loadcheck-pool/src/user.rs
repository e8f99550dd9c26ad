//! Virtual user identity

use crate::error::PoolError;
use crate::session::{Session, SessionSettings};
use loadcheck_core::Credentials;
use tracing::debug;

/// A credentialed identity with its own isolated session.
///
/// Only reachable through a [`crate::UserLease`] while the run is live, so
/// its session is never touched by two workers at once.
#[derive(Debug)]
pub struct VirtualUser {
    id: usize,
    credentials: Credentials,
    session: Session,
}

impl VirtualUser {
    pub fn new(
        id: usize,
        credentials: Credentials,
        settings: &SessionSettings,
    ) -> Result<Self, PoolError> {
        let session = Session::new(settings).map_err(|source| PoolError::Client {
            name: credentials.name.clone(),
            source,
        })?;
        Ok(Self {
            id,
            credentials,
            session,
        })
    }

    /// Stable index of the user inside its pool
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.credentials.name
    }

    pub fn secret(&self) -> &str {
        &self.credentials.secret
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Forget every cookie, leaving the user anonymous
    pub fn reset_session(&mut self) {
        debug!(user = %self.credentials.name, "Resetting session");
        self.session.clear_cookies();
    }
}
