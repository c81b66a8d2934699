use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub label: String,
    pub secret: String,
    pub status: CredentialStatus,
    pub status_message: Option<String>,
    pub is_active: bool,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            secret: secret.into(),
            status: CredentialStatus::Unknown,
            status_message: None,
            is_active: true,
            usage_count: 0,
            last_used_at: None,
            cooldown_until: None,
            created_at: Utc::now(),
        }
    }

    /// Active and not terminally failed. Locks and cooldowns are tracked by the pool.
    pub fn is_usable(&self) -> bool {
        self.is_active && !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Unknown,
    Valid,
    Invalid,
    Suspended,
    NoCredits,
}

impl CredentialStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CredentialStatus::Invalid | CredentialStatus::Suspended | CredentialStatus::NoCredits
        )
    }
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStatus::Unknown => write!(f, "unknown"),
            CredentialStatus::Valid => write!(f, "valid"),
            CredentialStatus::Invalid => write!(f, "invalid"),
            CredentialStatus::Suspended => write!(f, "suspended"),
            CredentialStatus::NoCredits => write!(f, "no_credits"),
        }
    }
}

/// Why the provider permanently refused a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    InvalidKey,
    Suspended,
    NoCredits,
}

impl FatalReason {
    pub fn status(&self) -> CredentialStatus {
        match self {
            FatalReason::InvalidKey => CredentialStatus::Invalid,
            FatalReason::Suspended => CredentialStatus::Suspended,
            FatalReason::NoCredits => CredentialStatus::NoCredits,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FatalReason::InvalidKey => "API key rejected by provider",
            FatalReason::Suspended => "API key suspended or forbidden",
            FatalReason::NoCredits => "No credits available",
        }
    }
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Response for credential endpoints. The secret is never returned in full.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialResponse {
    pub id: Uuid,
    pub label: String,
    pub masked_secret: String,
    pub status: CredentialStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub is_active: bool,
    pub usage_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub in_use: bool,
    pub created_at: DateTime<Utc>,
}

impl CredentialResponse {
    pub fn from_credential(credential: Credential, in_use: bool) -> Self {
        let cooldown_until = credential
            .cooldown_until
            .filter(|until| *until > Utc::now());

        Self {
            id: credential.id,
            label: credential.label,
            masked_secret: mask_secret(&credential.secret),
            status: credential.status,
            status_message: credential.status_message,
            is_active: credential.is_active,
            usage_count: credential.usage_count,
            last_used_at: credential.last_used_at,
            cooldown_until,
            in_use,
            created_at: credential.created_at,
        }
    }
}

/// Request to register a new credential
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCredentialRequest {
    pub label: String,
    pub secret: String,
}

/// Request to toggle a credential
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateCredentialRequest {
    pub is_active: bool,
}

pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
