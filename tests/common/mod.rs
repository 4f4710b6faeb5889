#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medianode_session::entity::{profile, subscription_plan};
use medianode_session::migration::{Migrator, MigratorTrait};
use medianode_session::{
    AuthBackend, AuthStateChange, CredentialError, Error, NewProfile, RecordStore, SeaOrmStore,
    Session, User, UserMetadata,
};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};
use time::OffsetDateTime;
use tokio::sync::{broadcast, Semaphore};

/// Fresh in-memory SQLite database with the schema applied.
pub async fn setup_store() -> SeaOrmStore {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);

    let conn = Database::connect(opt).await.expect("connect to sqlite");
    Migrator::up(&conn, None).await.expect("run migrations");
    SeaOrmStore::new(conn)
}

pub async fn seed_plan(store: &SeaOrmStore, id: &str, name: &str, max_scene_count: i32) {
    subscription_plan::ActiveModel {
        id: Set(id.to_string()),
        name: Set(name.to_string()),
        max_scene_count: Set(max_scene_count),
    }
    .insert(store.connection())
    .await
    .expect("seed plan");
}

pub async fn seed_profile(store: &SeaOrmStore, id: &str, plan_id: &str) {
    store
        .insert_profile(NewProfile {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            display_name: None,
            company: None,
            subscription_plan_id: plan_id.to_string(),
        })
        .await
        .expect("seed profile");
}

pub async fn all_profiles(store: &SeaOrmStore) -> Vec<profile::Model> {
    profile::Entity::find()
        .all(store.connection())
        .await
        .expect("list profiles")
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        metadata: UserMetadata::default(),
    }
}

pub fn session_for(user: &User) -> Session {
    session_expiring(user, OffsetDateTime::now_utc() + time::Duration::hours(1))
}

pub fn session_expiring(user: &User, expiry: OffsetDateTime) -> Session {
    Session {
        access_token: format!("token-{}", user.id),
        expiry,
        user: user.clone(),
    }
}

/// Polls `check` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// In-process stand-in for the authentication service.
pub struct FakeAuth {
    events: broadcast::Sender<AuthStateChange>,
    current: Mutex<Option<Session>>,
    fail_get_session: AtomicBool,
    get_session_gate: Option<Semaphore>,
    get_session_calls: AtomicUsize,
    accounts: Mutex<HashMap<String, (String, User)>>,
    next_id: AtomicUsize,
    pub reset_requests: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    fn build(get_session_gate: Option<Semaphore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            current: Mutex::new(None),
            fail_get_session: AtomicBool::new(false),
            get_session_gate,
            get_session_calls: AtomicUsize::new(0),
            accounts: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// `get_session` reads the session when called but only answers once
    /// [`FakeAuth::release_get_session`] is called.
    pub fn with_slow_get_session() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    pub fn release_get_session(&self) {
        if let Some(gate) = &self.get_session_gate {
            gate.add_permits(1);
        }
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn with_initial_session(session: Session) -> Arc<Self> {
        let auth = Self::new();
        *auth.current.lock().unwrap() = Some(session);
        auth
    }

    pub fn failing_get_session() -> Arc<Self> {
        let auth = Self::new();
        auth.fail_get_session.store(true, Ordering::SeqCst);
        auth
    }

    pub fn register(&self, user: User, password: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(user.email.clone(), (password.to_string(), user));
    }

    /// Publishes a notification; its session becomes what `get_session`
    /// returns from then on.
    pub fn emit(&self, change: AuthStateChange) {
        *self.current.lock().unwrap() = change.session.clone();
        let _ = self.events.send(change);
    }

    pub fn receiver_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn get_session(&self) -> medianode_session::Result<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_session.load(Ordering::SeqCst) {
            return Err(Error::Backend("connection refused".into()));
        }
        let session = self.current.lock().unwrap().clone();
        if let Some(gate) = &self.get_session_gate {
            gate.acquire().await.expect("gate open").forget();
        }
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<UserMetadata>,
    ) -> Result<(), CredentialError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(CredentialError::new("User already registered"));
        }
        let id = format!("user-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let user = User {
            id,
            email: email.to_string(),
            metadata: metadata.unwrap_or_default(),
        };
        accounts.insert(email.to_string(), (password.to_string(), user));
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(), CredentialError> {
        let user = match self.accounts.lock().unwrap().get(email) {
            Some((expected, user)) if expected == password => user.clone(),
            _ => return Err(CredentialError::new("Invalid login credentials")),
        };
        self.emit(AuthStateChange::signed_in(session_for(&user)));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), CredentialError> {
        self.emit(AuthStateChange::signed_out());
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), CredentialError> {
        if !email.contains('@') {
            return Err(CredentialError::new("Unable to validate email address"));
        }
        self.reset_requests
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.map(str::to_string)));
        Ok(())
    }
}

/// Record store wrapper that can be told to fail individual operations.
pub struct FlakyStore {
    inner: SeaOrmStore,
    pub fail_profile_lookup: AtomicBool,
    pub fail_plan_lookup: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SeaOrmStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_profile_lookup: AtomicBool::new(false),
            fail_plan_lookup: AtomicBool::new(false),
        })
    }

    pub fn fail_profile_lookup(&self, fail: bool) {
        self.fail_profile_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_plan_lookup(&self, fail: bool) {
        self.fail_plan_lookup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn find_profile(&self, identity_id: &str) -> medianode_session::Result<Option<profile::Model>> {
        if self.fail_profile_lookup.load(Ordering::SeqCst) {
            return Err(Error::Backend("profile lookup timed out".into()));
        }
        self.inner.find_profile(identity_id).await
    }

    async fn insert_profile(&self, profile: NewProfile) -> medianode_session::Result<profile::Model> {
        self.inner.insert_profile(profile).await
    }

    async fn insert_profile_if_absent(&self, profile: NewProfile) -> medianode_session::Result<bool> {
        self.inner.insert_profile_if_absent(profile).await
    }

    async fn find_plan(
        &self,
        plan_id: &str,
    ) -> medianode_session::Result<Option<subscription_plan::Model>> {
        if self.fail_plan_lookup.load(Ordering::SeqCst) {
            return Err(Error::Backend("plan lookup timed out".into()));
        }
        self.inner.find_plan(plan_id).await
    }
}

/// Record store whose profile lookups wait for a permit.
pub struct GatedStore {
    inner: SeaOrmStore,
    gate: Semaphore,
}

impl GatedStore {
    pub fn new(inner: SeaOrmStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: Semaphore::new(0),
        })
    }

    /// Lets one pending or future profile lookup through.
    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl RecordStore for GatedStore {
    async fn find_profile(
        &self,
        identity_id: &str,
    ) -> medianode_session::Result<Option<profile::Model>> {
        self.gate.acquire().await.expect("gate open").forget();
        self.inner.find_profile(identity_id).await
    }

    async fn insert_profile(
        &self,
        profile: NewProfile,
    ) -> medianode_session::Result<profile::Model> {
        self.inner.insert_profile(profile).await
    }

    async fn insert_profile_if_absent(
        &self,
        profile: NewProfile,
    ) -> medianode_session::Result<bool> {
        self.inner.insert_profile_if_absent(profile).await
    }

    async fn find_plan(
        &self,
        plan_id: &str,
    ) -> medianode_session::Result<Option<subscription_plan::Model>> {
        self.inner.find_plan(plan_id).await
    }
}
