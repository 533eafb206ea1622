// Identity-provider registry.
//
// Descriptors are resolved once at startup and injected into the router
// state as an immutable value; nothing mutates the registry after boot.
// Client credentials come from `ATTACHE_BROKER_<PROVIDER>_*` environment
// variables with development placeholders as fallbacks.

pub mod client;
pub mod response;

use std::{collections::HashMap, env, sync::Arc};

use response::ProviderKind;

const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_USER_INFO_URL: &str = "https://api.spotify.com/v1/me";
const SPOTIFY_SCOPES: &[&str] = &["playlist-read-private", "playlist-modify-public"];

const TIDAL_AUTH_URL: &str = "https://login.tidal.com/authorize";
const TIDAL_TOKEN_URL: &str = "https://auth.tidal.com/v1/oauth2/token";
const TIDAL_USER_INFO_URL: &str = "https://openapi.tidal.com/v2/users/me";
const TIDAL_SCOPES: &[&str] = &["user.read"];

/// Everything the broker needs to talk to one identity provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URL registered with the provider (our callback endpoint).
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub user_info_url: String,
    pub scopes: Vec<String>,
}

/// Read-only lookup from provider name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderDescriptor>>,
}

impl ProviderRegistry {
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        let providers = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), Arc::new(descriptor)))
            .collect();
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderDescriptor>> {
        self.providers.get(name).cloned()
    }

    /// Build the default registry (Spotify and Tidal) from the environment.
    pub fn from_env() -> Self {
        Self::new(vec![
            spotify_descriptor(env_or("ATTACHE_BROKER_PUBLIC_URL", "http://localhost:8080")),
            tidal_descriptor(env_or("ATTACHE_BROKER_PUBLIC_URL", "http://localhost:8080")),
        ])
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn spotify_descriptor(public_url: String) -> ProviderDescriptor {
    ProviderDescriptor {
        name: "spotify".to_string(),
        kind: ProviderKind::Spotify,
        client_id: env_or("ATTACHE_BROKER_SPOTIFY_CLIENT_ID", "attache-dev-spotify-client-id"),
        client_secret: env_or("ATTACHE_BROKER_SPOTIFY_CLIENT_SECRET", ""),
        redirect_url: format!("{public_url}/auth/spotify/callback"),
        auth_url: env_or("ATTACHE_BROKER_SPOTIFY_AUTHORIZE_URL", SPOTIFY_AUTH_URL),
        token_url: env_or("ATTACHE_BROKER_SPOTIFY_TOKEN_URL", SPOTIFY_TOKEN_URL),
        user_info_url: env_or("ATTACHE_BROKER_SPOTIFY_USER_INFO_URL", SPOTIFY_USER_INFO_URL),
        scopes: SPOTIFY_SCOPES.iter().map(ToString::to_string).collect(),
    }
}

fn tidal_descriptor(public_url: String) -> ProviderDescriptor {
    ProviderDescriptor {
        name: "tidal".to_string(),
        kind: ProviderKind::Tidal,
        client_id: env_or("ATTACHE_BROKER_TIDAL_CLIENT_ID", "attache-dev-tidal-client-id"),
        client_secret: env_or("ATTACHE_BROKER_TIDAL_CLIENT_SECRET", ""),
        redirect_url: format!("{public_url}/auth/tidal/callback"),
        auth_url: env_or("ATTACHE_BROKER_TIDAL_AUTHORIZE_URL", TIDAL_AUTH_URL),
        token_url: env_or("ATTACHE_BROKER_TIDAL_TOKEN_URL", TIDAL_TOKEN_URL),
        user_info_url: env_or("ATTACHE_BROKER_TIDAL_USER_INFO_URL", TIDAL_USER_INFO_URL),
        scopes: TIDAL_SCOPES.iter().map(ToString::to_string).collect(),
    }
}
