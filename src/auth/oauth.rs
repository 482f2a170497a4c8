//! OAuth 2.0 clients for Google and Microsoft.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, warn};

use super::{AuthError, RefreshedToken, Result, TokenRefresher};
use crate::config::{OAuthClientSettings, OAuthSettings};
use crate::domain::ProviderKind;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

const MICROSOFT_LOGIN_BASE: &str = "https://login.microsoftonline.com";
const MICROSOFT_DEFAULT_TENANT: &str = "common";
const GRAPH_MAIL_SCOPE: &str = "https://graph.microsoft.com/Mail.ReadWrite";
const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// An OAuth client registered with one identity provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: ProviderKind,
    client: BasicClient,
    scopes: Vec<String>,
}

impl OAuthClient {
    /// Builds a Google client with the Gmail modify scope.
    pub fn google(settings: &OAuthClientSettings) -> Result<Self> {
        Self::build(
            ProviderKind::Gmail,
            settings,
            GOOGLE_AUTH_URL.to_string(),
            GOOGLE_TOKEN_URL.to_string(),
            vec![GMAIL_MODIFY_SCOPE.to_string()],
        )
    }

    /// Builds a Microsoft identity platform client for Graph mail access.
    pub fn microsoft(settings: &OAuthClientSettings) -> Result<Self> {
        let tenant = settings
            .tenant
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(MICROSOFT_DEFAULT_TENANT);

        Self::build(
            ProviderKind::Outlook,
            settings,
            format!("{MICROSOFT_LOGIN_BASE}/{tenant}/oauth2/v2.0/authorize"),
            format!("{MICROSOFT_LOGIN_BASE}/{tenant}/oauth2/v2.0/token"),
            vec![
                OFFLINE_ACCESS_SCOPE.to_string(),
                GRAPH_MAIL_SCOPE.to_string(),
            ],
        )
    }

    fn build(
        provider: ProviderKind,
        settings: &OAuthClientSettings,
        auth_url: String,
        token_url: String,
        scopes: Vec<String>,
    ) -> Result<Self> {
        let auth_url =
            AuthUrl::new(auth_url).map_err(|e| AuthError::InvalidEndpoint(e.to_string()))?;
        let token_url =
            TokenUrl::new(token_url).map_err(|e| AuthError::InvalidEndpoint(e.to_string()))?;
        let redirect_url = RedirectUrl::new(settings.redirect_uri.clone())
            .map_err(|e| AuthError::InvalidEndpoint(e.to_string()))?;

        let client = BasicClient::new(
            ClientId::new(settings.client_id.clone()),
            Some(ClientSecret::new(settings.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            provider,
            client,
            scopes,
        })
    }

    /// Provider this client authenticates against.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Builds the consent URL and the CSRF state to check on callback.
    ///
    /// Google is asked for offline access with a forced consent prompt so a
    /// refresh token is always returned.
    pub fn authorize_url(&self) -> (String, CsrfToken) {
        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        if self.provider == ProviderKind::Gmail {
            request = request
                .add_extra_param("access_type", "offline")
                .add_extra_param("prompt", "consent");
        }

        let (url, state) = request.url();
        (url.to_string(), state)
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<RefreshedToken> {
        debug!(provider = %self.provider, "exchanging authorization code");

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                warn!(provider = %self.provider, error = %e, "code exchange failed");
                AuthError::TokenEndpoint(e.to_string())
            })?;

        Ok(RefreshedToken {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<RefreshedToken> {
        if provider != self.provider {
            return Err(AuthError::MissingClientConfig(provider.to_string()));
        }

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

        Ok(RefreshedToken {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
        })
    }
}

/// The configured OAuth clients, dispatched by provider.
#[derive(Debug, Clone, Default)]
pub struct OAuthClients {
    google: Option<OAuthClient>,
    microsoft: Option<OAuthClient>,
}

impl OAuthClients {
    /// Builds whichever clients are configured in settings or the environment.
    pub fn from_settings(settings: &OAuthSettings) -> Result<Self> {
        let google = settings.google().map(|s| OAuthClient::google(&s)).transpose()?;
        let microsoft = settings
            .microsoft()
            .map(|s| OAuthClient::microsoft(&s))
            .transpose()?;

        Ok(Self { google, microsoft })
    }

    /// Returns the client for a provider.
    pub fn client(&self, provider: ProviderKind) -> Result<&OAuthClient> {
        let client = match provider {
            ProviderKind::Gmail => self.google.as_ref(),
            ProviderKind::Outlook => self.microsoft.as_ref(),
        };
        client.ok_or_else(|| AuthError::MissingClientConfig(provider.to_string()))
    }
}

#[async_trait]
impl TokenRefresher for OAuthClients {
    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<RefreshedToken> {
        self.client(provider)?.refresh(provider, refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client_settings(tenant: Option<&str>) -> OAuthClientSettings {
        OAuthClientSettings {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8765/oauth/callback".to_string(),
            tenant: tenant.map(str::to_string),
        }
    }

    #[test]
    fn google_authorize_url_requests_offline_access() {
        let client = OAuthClient::google(&client_settings(None)).unwrap();

        let (url, state) = client.authorize_url();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("gmail.modify"));
        assert!(url.contains(&format!("state={}", state.secret())));
    }

    #[test]
    fn microsoft_authorize_url_uses_tenant() {
        let client = OAuthClient::microsoft(&client_settings(Some("contoso"))).unwrap();

        let (url, _) = client.authorize_url();

        assert!(url.starts_with("https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize"));
        assert!(url.contains("offline_access"));
        assert!(!url.contains("access_type=offline"));
    }

    #[test]
    fn microsoft_defaults_to_common_tenant() {
        let client = OAuthClient::microsoft(&client_settings(None)).unwrap();

        let (url, _) = client.authorize_url();

        assert!(url.starts_with("https://login.microsoftonline.com/common/"));
    }

    #[test]
    fn invalid_redirect_uri_is_rejected() {
        let mut settings = client_settings(None);
        settings.redirect_uri = "not a url".to_string();

        let err = OAuthClient::google(&settings).unwrap_err();
        assert!(matches!(err, AuthError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_reported() {
        let clients = OAuthClients {
            google: Some(OAuthClient::google(&client_settings(None)).unwrap()),
            microsoft: None,
        };

        assert_eq!(clients.client(ProviderKind::Gmail).unwrap().provider(), ProviderKind::Gmail);

        let err = clients
            .refresh(ProviderKind::Outlook, "refresh")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingClientConfig(p) if p == "outlook"));
    }
}
