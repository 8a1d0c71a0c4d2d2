//! Generic client-side copy of one resource collection.
//!
//! Every mutation is applied only after the server confirmed it, and only if
//! no newer request of the same operation kind was issued in the meantime.

use std::{collections::HashSet, future::Future};

use shared::{domain::Resource, protocol::Listing};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::ApiResult,
    flight::{fallback_message, FlightTracker, OperationKind, StoreKind},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T> {
    Applied(T),
    Failed(String),
    /// The result was dropped without touching the store, usually because a
    /// newer request of the same kind was issued.
    Superseded,
}

impl<T> Settlement<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Settlement::Applied(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Settlement::Applied(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Settlement::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Settlement<U> {
        match self {
            Settlement::Applied(value) => Settlement::Applied(f(value)),
            Settlement::Failed(message) => Settlement::Failed(message),
            Settlement::Superseded => Settlement::Superseded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    FlightStarted {
        store: StoreKind,
        kind: OperationKind,
    },
    Settled {
        store: StoreKind,
        kind: OperationKind,
        succeeded: bool,
    },
    Superseded {
        store: StoreKind,
        kind: OperationKind,
    },
    ErrorCleared {
        store: StoreKind,
    },
    CurrentChanged {
        store: StoreKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot<T> {
    pub items: Vec<T>,
    pub current: Option<T>,
    pub in_flight: Vec<OperationKind>,
    pub error: Option<String>,
}

struct StoreState<T> {
    items: Vec<T>,
    current: Option<T>,
    flights: FlightTracker,
    error: Option<String>,
}

pub struct ResourceStore<T: Resource> {
    kind: StoreKind,
    inner: RwLock<StoreState<T>>,
    events: broadcast::Sender<StoreEvent>,
}

impl<T: Resource> ResourceStore<T> {
    pub fn new(events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            kind: StoreKind::from(T::FAMILY),
            inner: RwLock::new(StoreState {
                items: Vec::new(),
                current: None,
                flights: FlightTracker::default(),
                error: None,
            }),
            events,
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Replaces the collection wholesale with the listed items.
    pub async fn fetch<F>(&self, request: F) -> Settlement<Vec<T>>
    where
        F: Future<Output = ApiResult<Listing<T>>>,
    {
        let request = async move { request.await.map(|listing| unique_by_id(listing.into_items())) };
        self.run(OperationKind::Fetch, request, |state, items: &Vec<T>| {
            state.items = items.clone();
        })
        .await
    }

    /// Prepends the created item and makes it current.
    pub async fn create<F>(&self, kind: OperationKind, request: F) -> Settlement<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.run(kind, request, |state, item: &T| {
            prepend(&mut state.items, item);
            state.current = Some(item.clone());
        })
        .await
    }

    /// Like [`create`](Self::create), for endpoints whose success body may
    /// not identify the new item. An unidentified success changes nothing.
    pub async fn create_or_acknowledge<F>(
        &self,
        kind: OperationKind,
        request: F,
    ) -> Settlement<Option<T>>
    where
        F: Future<Output = ApiResult<Option<T>>>,
    {
        self.run(kind, request, |state, item: &Option<T>| {
            if let Some(item) = item {
                prepend(&mut state.items, item);
                state.current = Some(item.clone());
            }
        })
        .await
    }

    /// Prepends the created item; the current item is left alone.
    pub async fn insert<F>(&self, kind: OperationKind, request: F) -> Settlement<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.run(kind, request, |state, item: &T| prepend(&mut state.items, item))
            .await
    }

    /// Replaces the item with identifier `id` in place. Unknown identifiers
    /// leave both the collection and the current item untouched.
    pub async fn update<F>(&self, id: T::Id, request: F) -> Settlement<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.run(OperationKind::Update, request, move |state, item: &T| {
            let mut matched = false;
            if let Some(slot) = state.items.iter_mut().find(|existing| existing.id() == id) {
                *slot = item.clone();
                matched = true;
            }
            if state.current.as_ref().is_some_and(|current| current.id() == id) {
                matched = true;
            }
            if matched {
                state.current = Some(item.clone());
            }
        })
        .await
    }

    /// Removes the item with identifier `id` once the server confirmed it.
    pub async fn delete<F>(&self, id: T::Id, request: F) -> Settlement<T::Id>
    where
        F: Future<Output = ApiResult<()>>,
    {
        let request = async move { request.await.map(|()| id) };
        self.run(OperationKind::Delete, request, |state, id: &T::Id| {
            if let Some(index) = state.items.iter().position(|item| item.id() == *id) {
                state.items.remove(index);
            }
            if state.current.as_ref().is_some_and(|current| current.id() == *id) {
                state.current = None;
            }
        })
        .await
    }

    /// Makes the response current without inserting it into the collection.
    pub async fn stage<F>(&self, kind: OperationKind, request: F) -> Settlement<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.run(kind, request, |state, item: &T| {
            state.current = Some(item.clone());
        })
        .await
    }

    /// Tracks a call whose success changes nothing locally.
    pub async fn acknowledge<R, F>(&self, kind: OperationKind, request: F) -> Settlement<R>
    where
        F: Future<Output = ApiResult<R>>,
    {
        self.run(kind, request, |_, _| {}).await
    }

    pub async fn clear_error(&self) {
        let cleared = self.inner.write().await.error.take().is_some();
        if cleared {
            let _ = self
                .events
                .send(StoreEvent::ErrorCleared { store: self.kind });
        }
    }

    pub async fn set_current(&self, item: Option<T>) {
        self.inner.write().await.current = item;
        let _ = self
            .events
            .send(StoreEvent::CurrentChanged { store: self.kind });
    }

    pub async fn clear_current(&self) {
        self.set_current(None).await;
    }

    pub async fn snapshot(&self) -> StoreSnapshot<T> {
        let guard = self.inner.read().await;
        StoreSnapshot {
            items: guard.items.clone(),
            current: guard.current.clone(),
            in_flight: guard.flights.in_flight(),
            error: guard.error.clone(),
        }
    }

    pub async fn items(&self) -> Vec<T> {
        self.inner.read().await.items.clone()
    }

    pub async fn current(&self) -> Option<T> {
        self.inner.read().await.current.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.error.clone()
    }

    pub async fn is_in_flight(&self, kind: OperationKind) -> bool {
        self.inner.read().await.flights.is_in_flight(kind)
    }

    pub async fn is_busy(&self) -> bool {
        !self.inner.read().await.flights.is_idle()
    }

    async fn run<R, F>(
        &self,
        kind: OperationKind,
        request: F,
        apply: impl FnOnce(&mut StoreState<T>, &R),
    ) -> Settlement<R>
    where
        F: Future<Output = ApiResult<R>>,
    {
        let token = {
            let mut guard = self.inner.write().await;
            guard.error = None;
            guard.flights.begin(kind)
        };
        debug!(store = %self.kind, operation = %kind, "store: flight started");
        let _ = self.events.send(StoreEvent::FlightStarted {
            store: self.kind,
            kind,
        });

        let outcome = request.await;

        let settlement = {
            let mut guard = self.inner.write().await;
            if !guard.flights.release(token) {
                Settlement::Superseded
            } else {
                match outcome {
                    Ok(value) => {
                        apply(&mut *guard, &value);
                        Settlement::Applied(value)
                    }
                    Err(err) => {
                        let message = err.store_message(&fallback_message(self.kind, kind));
                        warn!(
                            store = %self.kind,
                            operation = %kind,
                            status = ?err.status(),
                            "store: request failed: {err}"
                        );
                        guard.error = Some(message.clone());
                        Settlement::Failed(message)
                    }
                }
            }
        };

        let event = match &settlement {
            Settlement::Applied(_) => {
                info!(store = %self.kind, operation = %kind, "store: settled");
                StoreEvent::Settled {
                    store: self.kind,
                    kind,
                    succeeded: true,
                }
            }
            Settlement::Failed(_) => StoreEvent::Settled {
                store: self.kind,
                kind,
                succeeded: false,
            },
            Settlement::Superseded => {
                debug!(
                    store = %self.kind,
                    operation = %kind,
                    "store: stale response discarded"
                );
                StoreEvent::Superseded {
                    store: self.kind,
                    kind,
                }
            }
        };
        let _ = self.events.send(event);

        settlement
    }
}

fn prepend<T: Resource>(items: &mut Vec<T>, item: &T) {
    items.retain(|existing| existing.id() != item.id());
    items.insert(0, item.clone());
}

fn unique_by_id<T: Resource>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.id()))
        .collect()
}
