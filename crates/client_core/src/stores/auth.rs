use std::{future::Future, sync::Arc};

use shared::{
    domain::UserProfile,
    protocol::{AuthSession, Credentials, Registration},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::ApiResult,
    flight::{fallback_message, FlightTracker, OperationKind, StoreKind},
    gateway::ResearchApi,
    store::{Settlement, StoreEvent},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub user: Option<UserProfile>,
    pub in_flight: Vec<OperationKind>,
    pub error: Option<String>,
}

#[derive(Default)]
struct AuthState {
    user: Option<UserProfile>,
    flights: FlightTracker,
    error: Option<String>,
}

/// Session bookkeeping: the signed-in profile and the gateway token.
pub struct AuthStore {
    api: Arc<dyn ResearchApi>,
    inner: RwLock<AuthState>,
    events: broadcast::Sender<StoreEvent>,
}

impl AuthStore {
    pub fn new(api: Arc<dyn ResearchApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            inner: RwLock::new(AuthState::default()),
            events,
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Settlement<UserProfile> {
        let settlement = self
            .run(OperationKind::Login, self.api.login(credentials), |state, session| {
                state.user = Some(session.user.clone());
            })
            .await;
        self.adopt_session(settlement).await
    }

    pub async fn register(&self, registration: &Registration) -> Settlement<UserProfile> {
        let settlement = self
            .run(
                OperationKind::Register,
                self.api.register(registration),
                |state, session| {
                    state.user = Some(session.user.clone());
                },
            )
            .await;
        self.adopt_session(settlement).await
    }

    /// Ends the local session whether or not the server acknowledged it. A
    /// login or register still outstanding is discarded when it settles.
    pub async fn logout(&self) -> Settlement<()> {
        {
            let mut guard = self.inner.write().await;
            for kind in [OperationKind::Login, OperationKind::Register] {
                if guard.flights.retire(kind) {
                    debug!(operation = %kind, "auth: pending sign-in abandoned by logout");
                }
            }
        }
        let settlement = self
            .run(OperationKind::Logout, self.api.logout(), |_, _| {})
            .await
            .map(|_| ());
        self.api.set_auth_token(None).await;
        self.inner.write().await.user = None;
        info!("auth: session cleared");
        settlement
    }

    pub async fn refresh_profile(&self) -> Settlement<UserProfile> {
        self.run(OperationKind::Fetch, self.api.current_user(), |state, user| {
            state.user = Some(user.clone());
        })
        .await
    }

    pub async fn clear_error(&self) {
        let cleared = self.inner.write().await.error.take().is_some();
        if cleared {
            let _ = self.events.send(StoreEvent::ErrorCleared {
                store: StoreKind::Auth,
            });
        }
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.inner.read().await.user.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.read().await.user.is_some()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.error.clone()
    }

    pub async fn snapshot(&self) -> AuthSnapshot {
        let guard = self.inner.read().await;
        AuthSnapshot {
            user: guard.user.clone(),
            in_flight: guard.flights.in_flight(),
            error: guard.error.clone(),
        }
    }

    async fn adopt_session(&self, settlement: Settlement<AuthSession>) -> Settlement<UserProfile> {
        if let Settlement::Applied(session) = &settlement {
            self.api.set_auth_token(Some(session.token.clone())).await;
            info!(username = %session.user.username, "auth: signed in");
        }
        settlement.map(|session| session.user)
    }

    async fn run<R, F>(
        &self,
        kind: OperationKind,
        request: F,
        apply: impl FnOnce(&mut AuthState, &R),
    ) -> Settlement<R>
    where
        F: Future<Output = ApiResult<R>>,
    {
        let token = {
            let mut guard = self.inner.write().await;
            guard.error = None;
            guard.flights.begin(kind)
        };
        let _ = self.events.send(StoreEvent::FlightStarted {
            store: StoreKind::Auth,
            kind,
        });

        let outcome = request.await;

        let mut guard = self.inner.write().await;
        if !guard.flights.release(token) {
            debug!(operation = %kind, "auth: stale response discarded");
            let _ = self.events.send(StoreEvent::Superseded {
                store: StoreKind::Auth,
                kind,
            });
            return Settlement::Superseded;
        }

        let settlement = match outcome {
            Ok(value) => {
                apply(&mut *guard, &value);
                Settlement::Applied(value)
            }
            Err(err) => {
                warn!(operation = %kind, status = ?err.status(), "auth: request failed: {err}");
                let message = err.store_message(&fallback_message(StoreKind::Auth, kind));
                guard.error = Some(message.clone());
                Settlement::Failed(message)
            }
        };
        drop(guard);

        let _ = self.events.send(StoreEvent::Settled {
            store: StoreKind::Auth,
            kind,
            succeeded: settlement.is_applied(),
        });
        settlement
    }
}
