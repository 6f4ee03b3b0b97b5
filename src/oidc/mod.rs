//! Google sign-in over OpenID Connect.
//!
//! The web flow is the classic authorization code flow with PKCE: `/oidc/login` stores
//! an [`AuthState`] and redirects to the provider, `/oidc/callback` takes the state back
//! and exchanges the code for a verified ID token.

use anyhow::{anyhow, bail, Context, Result};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreIdTokenClaims, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::OidcSettings;

/// Seconds an authorization state stays valid between login and callback.
pub const AUTH_STATE_TTL_SECS: i64 = 300;

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Failed to create HTTP client")
}

/// Kept server side between `/oidc/login` and `/oidc/callback`.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub csrf_token: String,
    pub nonce: String,
    pub pkce_verifier: String,
    pub created_at: i64,
}

impl AuthState {
    fn is_expired(&self, now: i64) -> bool {
        now - self.created_at >= AUTH_STATE_TTL_SECS
    }
}

/// The identity returned by the provider once the ID token checks out.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResult {
    pub subject: String,
    pub email: String,
    pub name: String,
}

pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
}

impl OidcClient {
    /// Discovers the provider metadata (endpoints and signing keys).
    pub async fn new(settings: &OidcSettings) -> Result<Self> {
        info!("Discovering OIDC provider {}", settings.provider_url);

        let issuer_url =
            IssuerUrl::new(settings.provider_url.clone()).context("Invalid OIDC provider URL")?;
        let http = http_client()?;
        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http)
            .await
            .context("Failed to discover OIDC provider metadata")?;
        let redirect_url = RedirectUrl::new(settings.redirect_uri.clone())
            .context("Invalid OIDC redirect URI")?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(settings.client_id.clone()),
            client_secret: ClientSecret::new(settings.client_secret.clone()),
            redirect_url,
            scopes: settings.scopes.clone(),
        })
    }

    /// Builds the provider URL to redirect to, plus the state to keep until the callback.
    pub fn authorize_url(&self) -> (String, AuthState) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());
        let mut request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, csrf_token, nonce) = request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            nonce: nonce.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            created_at: chrono::Utc::now().timestamp(),
        };
        debug!("Generated authorization URL with state {}", state.csrf_token);
        (auth_url.to_string(), state)
    }

    /// Exchanges the authorization code and verifies the returned ID token.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        stored_state: &AuthState,
    ) -> Result<AuthResult> {
        if state != stored_state.csrf_token {
            bail!("CSRF state mismatch");
        }
        if stored_state.is_expired(chrono::Utc::now().timestamp()) {
            bail!("Authorization state expired");
        }

        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());
        let http = http_client()?;
        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))?
            .set_pkce_verifier(PkceCodeVerifier::new(stored_state.pkce_verifier.clone()))
            .request_async(&http)
            .await
            .map_err(|e| anyhow!("Failed to exchange authorization code: {}", e))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| anyhow!("Provider did not return an ID token"))?;
        let nonce = Nonce::new(stored_state.nonce.clone());
        let claims: &CoreIdTokenClaims = id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| anyhow!("Failed to verify ID token: {}", e))?;

        debug!("Authenticated {} through OIDC", claims.subject().as_str());
        identity_from_claims(claims)
    }

    /// Verifies an ID token obtained by a native client outside of the web flow.
    ///
    /// There is no nonce to check against, so only signature, audience and expiry are
    /// validated.
    pub fn verify_id_token(&self, id_token: &str) -> Result<AuthResult> {
        let id_token = CoreIdToken::from_str(id_token)
            .map_err(|e| anyhow!("Failed to parse ID token: {}", e))?;
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        );
        let claims = id_token
            .claims(&client.id_token_verifier(), |_: Option<&Nonce>| Ok(()))
            .map_err(|e| anyhow!("Failed to verify ID token: {}", e))?;
        identity_from_claims(claims)
    }
}

fn identity_from_claims(claims: &CoreIdTokenClaims) -> Result<AuthResult> {
    if claims.email_verified() == Some(false) {
        bail!("Email address is not verified");
    }
    let email = claims
        .email()
        .map(|e| e.to_string())
        .ok_or_else(|| anyhow!("ID token carries no email"))?;
    let name = claims
        .name()
        .and_then(|n| n.get(None))
        .map(|n| n.as_str().to_string())
        .or_else(|| {
            claims
                .preferred_username()
                .map(|u| u.as_str().to_string())
        })
        .unwrap_or_else(|| display_name_from_email(&email));
    Ok(AuthResult {
        subject: claims.subject().to_string(),
        email,
        name,
    })
}

/// Falls back to the local part of the address when the provider sends no name.
pub fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// Pending authorization states keyed by CSRF token.
pub struct AuthStateStore {
    states: RwLock<HashMap<String, AuthState>>,
}

impl AuthStateStore {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    pub async fn store(&self, state: AuthState) {
        let mut states = self.states.write().await;
        states.insert(state.csrf_token.clone(), state);
    }

    /// Removes and returns the state; each state can be used once.
    pub async fn take(&self, csrf_token: &str) -> Option<AuthState> {
        self.states.write().await.remove(csrf_token)
    }

    pub async fn cleanup_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, state| !state.is_expired(now));
        before - states.len()
    }
}

impl Default for AuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}
