// Provider user-info normalization.
//
// Each provider returns its own JSON shape from the user-info endpoint.
// `ProviderResponse` carries one variant per provider and collapses them
// into the canonical `UserInfo` record the credential store persists.

use serde::Deserialize;

/// Canonical user identity after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

/// Which decoder to apply to a provider's user-info response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Spotify,
    Tidal,
}

impl ProviderKind {
    pub fn decode_user_info(self, body: &[u8]) -> Result<UserInfo, NormalizeError> {
        let response = match self {
            Self::Spotify => ProviderResponse::Spotify(serde_json::from_slice(body)?),
            Self::Tidal => ProviderResponse::Tidal(serde_json::from_slice(body)?),
        };
        response.to_user_info()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("user info response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("user ID is missing in {0} response")]
    MissingId(&'static str),
    #[error("display name is missing in {0} response")]
    MissingDisplayName(&'static str),
    #[error("invalid or missing email in {0} response")]
    InvalidEmail(&'static str),
}

/// A decoded user-info response from one of the supported providers.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    Spotify(SpotifyUserResponse),
    Tidal(TidalUserResponse),
}

impl ProviderResponse {
    pub fn to_user_info(&self) -> Result<UserInfo, NormalizeError> {
        match self {
            Self::Spotify(response) => response.to_user_info(),
            Self::Tidal(response) => response.to_user_info(),
        }
    }
}

/// Flat JSON shape returned by Spotify's `/v1/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyUserResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

impl SpotifyUserResponse {
    fn to_user_info(&self) -> Result<UserInfo, NormalizeError> {
        if self.id.trim().is_empty() {
            return Err(NormalizeError::MissingId("Spotify"));
        }
        if self.display_name.trim().is_empty() {
            return Err(NormalizeError::MissingDisplayName("Spotify"));
        }
        if !is_valid_email(&self.email) {
            return Err(NormalizeError::InvalidEmail("Spotify"));
        }
        Ok(UserInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        })
    }
}

/// Nested JSON shape returned by Tidal's user endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TidalUserResponse {
    pub data: TidalUserData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalUserData {
    #[serde(default)]
    pub id: String,
    pub attributes: TidalUserAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalUserAttributes {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

impl TidalUserResponse {
    fn to_user_info(&self) -> Result<UserInfo, NormalizeError> {
        let data = &self.data;
        if data.id.trim().is_empty() {
            return Err(NormalizeError::MissingId("Tidal"));
        }
        if data.attributes.username.trim().is_empty() {
            return Err(NormalizeError::MissingDisplayName("Tidal"));
        }
        if !is_valid_email(&data.attributes.email) {
            return Err(NormalizeError::InvalidEmail("Tidal"));
        }
        Ok(UserInfo {
            id: data.id.clone(),
            display_name: data.attributes.username.clone(),
            email: data.attributes.email.clone(),
        })
    }
}

/// Minimal mailbox check: exactly one `@` with a non-empty local part and
/// a dotted domain. Providers have already verified these addresses.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
