//! Authentication seam.
//!
//! The sync layer only needs to know whether a user is signed in and to
//! hear about sign-in transitions. Sign-in itself goes through an
//! [`Authenticator`] whose provider-conflict case comes back as a typed
//! [`SignInResult::LinkRequired`] rather than an error, because the caller
//! has to ask the user what to do.

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Identity providers users can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProvider {
    Google,
    Github,
}

impl AuthProvider {
    /// Provider id as used by the identity service.
    pub fn id(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google.com",
            AuthProvider::Github => "github.com",
        }
    }

    /// The provider an existing account most likely uses when this one conflicts.
    pub fn other(&self) -> AuthProvider {
        match self {
            AuthProvider::Google => AuthProvider::Github,
            AuthProvider::Github => AuthProvider::Google,
        }
    }

    pub fn from_id(id: &str) -> Option<AuthProvider> {
        match id {
            "google.com" => Some(AuthProvider::Google),
            "github.com" => Some(AuthProvider::Github),
            _ => None,
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthProvider::Google => write!(f, "Google"),
            AuthProvider::Github => write!(f, "GitHub"),
        }
    }
}

/// Credential from a sign-in that collided with an account registered
/// under another provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub email: String,
    pub attempted_provider: AuthProvider,
    pub existing_provider: AuthProvider,
    /// Opaque provider credential to attach once the user signs in with
    /// the existing provider.
    pub credential: String,
}

/// Outcome of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInResult {
    Success(User),
    Cancelled,
    LinkRequired(PendingLink),
}

/// Errors that can occur during authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredential,

    #[error("Account already linked")]
    AlreadyLinked,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Login failed: {0}")]
    Provider(String),
}

/// Who is signed in, with change notifications.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;

    /// Receiver that observes every sign-in and sign-out.
    fn watch(&self) -> watch::Receiver<Option<User>>;

    fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }
}

/// Provider-backed sign-in.
#[async_trait]
pub trait Authenticator: SessionProvider {
    async fn sign_in(&self, provider: AuthProvider) -> Result<SignInResult, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Attaches a pending credential to `user`. Linking a provider that is
    /// already linked succeeds.
    async fn link_credential(&self, user: &User, link: &PendingLink) -> Result<(), AuthError>;
}

/// Session whose user is set directly, e.g. from configuration.
#[derive(Debug)]
pub struct StaticSession {
    user: watch::Sender<Option<User>>,
}

impl StaticSession {
    pub fn signed_out() -> Self {
        let (user, _) = watch::channel(None);
        Self { user }
    }

    pub fn signed_in(user: User) -> Self {
        let (user, _) = watch::channel(Some(user));
        Self { user }
    }

    pub fn sign_in_as(&self, user: User) {
        self.user.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        self.user.send_replace(None);
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }
}

/// Holds a [`PendingLink`] between the failed sign-in and the sign-in with
/// the existing provider that completes it.
pub struct AccountLinking<A> {
    auth: A,
    pending: Mutex<Option<PendingLink>>,
}

impl<A: Authenticator> AccountLinking<A> {
    pub fn new(auth: A) -> Self {
        Self {
            auth,
            pending: Mutex::new(None),
        }
    }

    pub fn authenticator(&self) -> &A {
        &self.auth
    }

    pub fn pending(&self) -> Option<PendingLink> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Signs in, remembering the credential if linking is required.
    pub async fn sign_in(&self, provider: AuthProvider) -> Result<SignInResult, AuthError> {
        let result = self.auth.sign_in(provider).await?;
        if let SignInResult::LinkRequired(link) = &result {
            tracing::info!(
                "{} account for {} exists under {}, linking required",
                link.attempted_provider,
                link.email,
                link.existing_provider
            );
            *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(link.clone());
        }
        Ok(result)
    }

    /// Signs in with the provider the existing account uses.
    pub async fn sign_in_with_existing_provider(&self) -> Result<SignInResult, AuthError> {
        let provider = self
            .pending()
            .map(|link| link.existing_provider)
            .ok_or(AuthError::MissingCredential)?;
        self.auth.sign_in(provider).await
    }

    /// Links the pending credential to `user` and forgets it.
    pub async fn complete_linking(&self, user: &User) -> Result<(), AuthError> {
        let link = self.pending().ok_or(AuthError::MissingCredential)?;
        self.auth.link_credential(user, &link).await?;
        tracing::info!("Linked {} to {}", link.attempted_provider, user.uid);
        self.clear();
        Ok(())
    }
}
