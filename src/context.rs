//! The auth context: current session, auth-state subscription and the
//! credential operations exposed to the UI.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::backend::{AuthBackend, RecordStore};
use crate::config::Config;
use crate::error::{CredentialError, Error, Result};
use crate::limits::{LimitsCalculator, SceneLimits};
use crate::reconciler::{ProfileReconciler, ProfileSeed};
use crate::session::{AuthEvent, AuthStateChange, Session, User, UserMetadata};

const NOTICE_CAPACITY: usize = 32;

/// Snapshot of the auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    /// True until the initial session fetch has finished.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            loading: true,
        }
    }
}

/// A user-visible message raised by the auth context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SignedOut,
    /// Sign-up accepted; the user has to confirm their email.
    ConfirmationSent,
    PasswordResetSent,
    /// A credential operation was rejected with the backend's message.
    CredentialRejected {
        operation: &'static str,
        message: String,
    },
}

/// Handle on the auth-state listener.
///
/// Releasing it stops the listener and drops its stream receiver. Release
/// happens once, either through [`Subscription::unsubscribe`] or on drop.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Whether the listener is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the listener and waits until it is gone.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // A cancelled join error is the expected result here.
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Inner {
    auth: Arc<dyn AuthBackend>,
    reconciler: ProfileReconciler,
    limits: LimitsCalculator,
    state: watch::Sender<AuthState>,
    notices: broadcast::Sender<Notice>,
    reset_redirect_url: Option<String>,
}

impl Inner {
    fn notify(&self, notice: Notice) {
        // No receivers just means nobody is listening for notices.
        let _ = self.notices.send(notice);
    }

    /// Fetches the backend's session; `None` if the fetch fails.
    async fn fetch_session(&self, purpose: &'static str) -> Option<Option<Session>> {
        match self.auth.get_session().await {
            Ok(session) => Some(session.filter(|s| !s.is_expired())),
            Err(e) => {
                warn!(purpose, error = %e, "session fetch failed");
                None
            }
        }
    }

    fn replace_session(&self, session: Option<Session>) {
        self.state.send_modify(|state| {
            state.session = session;
            state.loading = false;
        });
    }

    async fn bootstrap(&self) {
        let session = self.fetch_session("bootstrap").await.flatten();
        debug!(signed_in = session.is_some(), "auth bootstrap finished");
        self.replace_session(session);
    }

    /// Re-reads the session after notifications were dropped. A dropped
    /// `SignedIn` may have been the only trigger for provisioning, so a present
    /// session is reconciled again.
    async fn resync(&self, provisioning: &mut JoinSet<()>) {
        let Some(session) = self.fetch_session("resync").await else {
            return;
        };
        if let Some(session) = &session {
            self.provision(provisioning, &session.user);
        }
        self.replace_session(session);
    }

    fn apply(&self, change: AuthStateChange, provisioning: &mut JoinSet<()>) {
        debug!(event = ?change.event, "auth state changed");

        match change.event {
            AuthEvent::SignedIn => {
                if let Some(session) = &change.session {
                    self.provision(provisioning, &session.user);
                }
                self.replace_session(change.session);
            }
            AuthEvent::SignedOut => {
                self.replace_session(change.session);
                self.notify(Notice::SignedOut);
            }
            _ => self.replace_session(change.session),
        }
    }

    /// Runs the reconciler off the listener loop so a slow profile store does
    /// not hold back later notifications.
    fn provision(&self, provisioning: &mut JoinSet<()>, user: &User) {
        let reconciler = self.reconciler.clone();
        let seed = ProfileSeed::from(user);
        provisioning.spawn(async move {
            reconciler.reconcile(seed).await;
        });
    }

    fn credential(
        &self,
        operation: &'static str,
        result: std::result::Result<(), CredentialError>,
    ) -> Result<()> {
        if let Err(e) = &result {
            warn!(operation, message = %e.message, "credential operation rejected");
            self.notify(Notice::CredentialRejected {
                operation,
                message: e.message.clone(),
            });
        }
        result.map_err(Error::from)
    }
}

async fn listen(inner: Arc<Inner>, mut events: broadcast::Receiver<AuthStateChange>) {
    // Dropped together with the listener, which aborts in-flight reconciles.
    let mut provisioning = JoinSet::new();

    inner.bootstrap().await;

    loop {
        match events.recv().await {
            Ok(change) => inner.apply(change, &mut provisioning),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth state listener lagged behind, resyncing");
                inner.resync(&mut provisioning).await;
            }
            Err(RecvError::Closed) => {
                debug!("auth state stream closed");
                break;
            }
        }
        while provisioning.try_join_next().is_some() {}
    }

    // Let outstanding reconciles finish once the stream is gone.
    while provisioning.join_next().await.is_some() {}
}

/// Builder for [`AuthContext`].
pub struct AuthContextBuilder {
    auth: Arc<dyn AuthBackend>,
    records: Arc<dyn RecordStore>,
    config: Config,
}

impl AuthContextBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Subscribes to the auth stream and starts the listener task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> AuthContext {
        let (state, _) = watch::channel(AuthState::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let inner = Arc::new(Inner {
            reconciler: ProfileReconciler::from_config(self.records.clone(), &self.config),
            limits: LimitsCalculator::new(self.records)
                .with_fallback(self.config.fallback_limits.clone()),
            auth: self.auth,
            state,
            notices,
            reset_redirect_url: self.config.reset_redirect_url,
        });

        // Subscribe before the bootstrap fetch so no notification is missed.
        let events = inner.auth.subscribe();
        let task = tokio::spawn(listen(inner.clone(), events));
        info!("auth context started");

        AuthContext {
            inner,
            subscription: Subscription::new(task),
        }
    }
}

/// Explicit owner of the auth state.
///
/// Created once on application start with [`AuthContext::builder`] and torn
/// down with [`AuthContext::shutdown`].
///
/// Notifications are applied in arrival order. Profile provisioning for a
/// `SignedIn` runs as a separate task, so a later `SignedOut` replaces the
/// session without waiting on the profile store. If the listener falls behind
/// the stream, it re-reads the session from the backend and provisions it.
///
/// ```no_run
/// use std::sync::Arc;
/// use medianode_session::{AuthBackend, AuthContext, SeaOrmStore};
///
/// # async fn example(auth: Arc<dyn AuthBackend>, store: SeaOrmStore) -> medianode_session::Result<()> {
/// let ctx = AuthContext::builder(auth, Arc::new(store)).start();
///
/// ctx.sign_in("ada@example.com", "hunter22").await?;
/// if let Some(user) = ctx.current_user() {
///     let limits = ctx.resolve_limits(&user.id).await;
///     println!("up to {} scenes", limits.max_scenes);
/// }
///
/// ctx.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct AuthContext {
    inner: Arc<Inner>,
    subscription: Subscription,
}

impl AuthContext {
    pub fn builder(
        auth: Arc<dyn AuthBackend>,
        records: Arc<dyn RecordStore>,
    ) -> AuthContextBuilder {
        AuthContextBuilder {
            auth,
            records,
            config: Config::default(),
        }
    }

    /// The current session, unless absent or expired.
    pub fn current_session(&self) -> Option<Session> {
        self.inner
            .state
            .borrow()
            .session
            .clone()
            .filter(|s| !s.is_expired())
    }

    pub fn current_user(&self) -> Option<User> {
        self.current_session().map(|s| s.user)
    }

    /// True until the initial session fetch has completed.
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Receiver for user-visible notices raised after this call.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<UserMetadata>,
    ) -> Result<()> {
        let result = self.inner.auth.sign_up(email, password, metadata).await;
        self.inner.credential("sign_up", result)?;
        self.inner.notify(Notice::ConfirmationSent);
        Ok(())
    }

    /// Signs in; the session arrives through the auth-state stream.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let result = self.inner.auth.sign_in_with_password(email, password).await;
        self.inner.credential("sign_in", result)
    }

    pub async fn sign_out(&self) -> Result<()> {
        let result = self.inner.auth.sign_out().await;
        self.inner.credential("sign_out", result)
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        let result = self
            .inner
            .auth
            .reset_password_for_email(email, self.inner.reset_redirect_url.as_deref())
            .await;
        self.inner.credential("reset_password", result)?;
        self.inner.notify(Notice::PasswordResetSent);
        Ok(())
    }

    pub async fn resolve_limits(&self, identity_id: &str) -> SceneLimits {
        self.inner.limits.resolve_limits(identity_id).await
    }

    /// Releases the auth-state subscription and waits for the listener to stop.
    pub async fn shutdown(self) {
        self.subscription.unsubscribe().await;
        info!("auth context stopped");
    }
}
