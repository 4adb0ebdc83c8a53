// SPDX-License-Identifier: MIT

//! Session lifecycle: handshake, profile retrieval and one-shot token
//! refresh when the portal starts rejecting an active session.

use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::errors::PortalError;
use crate::portal::{AccountInfo, PortalApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Active,
    Expired,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

/// Owns the portal client and the auth token. The token is only ever mutated
/// here, during the sequential phase of a run; concurrent link resolution
/// reads it through a shared borrow.
pub struct SessionManager<P> {
    portal: P,
    session: Option<Session>,
    state: SessionState,
}

impl<P: PortalApi> SessionManager<P> {
    pub fn new(portal: P) -> Self {
        Self {
            portal,
            session: None,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current bearer token; empty until [`connect`](Self::connect) succeeds.
    pub fn token_str(&self) -> &str {
        self.session.as_ref().map(|s| s.token.as_str()).unwrap_or("")
    }

    /// Performs the handshake and fetches the account profile. A profile
    /// call rejected for auth gets one fresh handshake before the run is
    /// declared failed.
    pub async fn connect(&mut self) -> Result<AccountInfo, PortalError> {
        let token = match self.portal.handshake().await {
            Ok(token) => token,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };
        self.store_token(token);

        let first = self.portal.profile(self.token_str()).await;
        match first {
            Ok(account) => Ok(account),
            Err(e) if e.is_auth() => {
                warn!("profile fetch rejected, refreshing session: {e}");
                self.reauth().await?;
                let second = self.portal.profile(self.token_str()).await;
                if second.is_err() {
                    self.state = SessionState::Failed;
                }
                second
            }
            Err(e) => Err(e),
        }
    }

    /// One re-handshake after an auth rejection while `Active`. A second
    /// consecutive rejection moves the session to `Failed`, which is fatal.
    pub async fn reauth(&mut self) -> Result<(), PortalError> {
        match self.state {
            SessionState::Active => self.state = SessionState::Expired,
            _ => {
                self.state = SessionState::Failed;
                return Err(PortalError::Auth(
                    "portal rejected the session twice in a row".into(),
                ));
            }
        }

        match self.portal.handshake().await {
            Ok(token) => {
                debug!("session token refreshed");
                self.store_token(token);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Marks the session as terminally failed after a retried call was
    /// rejected again.
    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
    }

    fn store_token(&mut self, token: String) {
        self.session = Some(Session {
            token,
            issued_at: Utc::now(),
        });
        self.state = SessionState::Active;
    }
}

/// Best-effort check of the free-form expiry string portals report. An
/// unparseable date is not an error; an expired account is reported but the
/// run proceeds unless the portal itself starts rejecting calls.
pub fn expiry_in_past(expiry: &str) -> bool {
    let expiry = expiry.trim();
    let parsed = NaiveDate::parse_from_str(expiry, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(expiry, "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(expiry, "%d.%m.%Y"));
    match parsed {
        Ok(date) => date < Local::now().date_naive(),
        Err(_) => false,
    }
}
