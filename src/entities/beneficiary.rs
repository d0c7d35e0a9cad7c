// Beneficiary Entity - one canonical shape for every record source
//
// Store rows arrive in snake_case, mock/fallback data arrives in camelCase.
// Both are adapted here, at the boundary, into a single `Beneficiary`.
// Nothing downstream ever asks which convention a record came from.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// IDENTITY STATUS
// ============================================================================

/// Verification state of a beneficiary's identity documents.
///
/// Governs eligibility to receive aid. Only the verification workflow
/// writes this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Pending,
    Verified,
    Rejected,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Pending => "pending",
            IdentityStatus::Verified => "verified",
            IdentityStatus::Rejected => "rejected",
        }
    }

    /// Human label used by the dashboards
    pub fn label(&self) -> &'static str {
        match self {
            IdentityStatus::Pending => "Awaiting verification",
            IdentityStatus::Verified => "Verified",
            IdentityStatus::Rejected => "Verification rejected",
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(IdentityStatus::Pending),
            "verified" => Ok(IdentityStatus::Verified),
            "rejected" => Ok(IdentityStatus::Rejected),
            other => anyhow::bail!("unknown identity status: {}", other),
        }
    }
}

// ============================================================================
// ACCOUNT STATUS
// ============================================================================

/// Account-level state. Orthogonal to `IdentityStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Pending,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Pending => "pending",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "pending" => Ok(AccountStatus::Pending),
            "suspended" => Ok(AccountStatus::Suspended),
            other => anyhow::bail!("unknown account status: {}", other),
        }
    }
}

// ============================================================================
// BENEFICIARY ENTITY
// ============================================================================

/// A person eligible to receive aid.
///
/// Identity: `id` (never changes)
/// Values: identifying attributes are read-only inputs to the verification
/// workflow; `identity_status` and `updated_at` are the only fields it writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beneficiary {
    /// Stable identity - NEVER changes
    pub id: String,

    pub name: String,
    pub full_name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    pub governorate: Option<String>,

    pub organization_id: Option<String>,
    pub family_id: Option<String>,

    pub identity_status: IdentityStatus,
    pub status: AccountStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Beneficiary {
    /// Create a new beneficiary awaiting verification
    pub fn new(name: &str, national_id: &str, phone: &str) -> Self {
        let now = Utc::now();

        Beneficiary {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            full_name: name.to_string(),
            national_id: national_id.to_string(),
            phone: phone.to_string(),
            address: String::new(),
            governorate: None,
            organization_id: None,
            family_id: None,
            identity_status: IdentityStatus::Pending,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name shown in confirmations and audit entries
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.name
        } else {
            &self.full_name
        }
    }

    /// Idempotency hash for import de-duplication.
    /// NOTE: Identity = id, De-duplication = national id hash. Records
    /// without a national id only collide with themselves (hash of the id).
    pub fn idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let national_id = self.national_id.trim();
        if national_id.is_empty() {
            hasher.update(b"id:");
            hasher.update(self.id.as_bytes());
        } else {
            hasher.update(national_id.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Adapt a raw record (snake_case or camelCase) into the canonical shape
    pub fn from_record(value: serde_json::Value) -> Result<Self> {
        let raw: RawBeneficiary =
            serde_json::from_value(value).context("Failed to read beneficiary record")?;
        raw.into_canonical()
    }
}

// ============================================================================
// BOUNDARY ADAPTER
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawDetailedAddress {
    #[serde(default)]
    governorate: Option<String>,
}

/// Wire shape accepted at the store boundary. Every field takes both naming
/// conventions; defaults match what the dashboard assumed for missing values.
#[derive(Debug, Deserialize)]
struct RawBeneficiary {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "fullName")]
    full_name: Option<String>,
    #[serde(default, alias = "nationalId")]
    national_id: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, alias = "addressGovernorate", alias = "governorate")]
    address_governorate: Option<String>,
    #[serde(default, alias = "detailedAddress")]
    detailed_address: Option<RawDetailedAddress>,
    #[serde(default, alias = "organizationId")]
    organization_id: Option<String>,
    #[serde(default, alias = "familyId")]
    family_id: Option<String>,
    #[serde(default, alias = "identityStatus")]
    identity_status: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<String>,
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<String>,
}

impl RawBeneficiary {
    fn into_canonical(self) -> Result<Beneficiary> {
        let name = self
            .name
            .clone()
            .or_else(|| self.full_name.clone())
            .unwrap_or_default();
        let full_name = self.full_name.unwrap_or_else(|| name.clone());

        let identity_status = match self.identity_status.as_deref() {
            Some(s) if !s.is_empty() => s.parse()?,
            _ => IdentityStatus::Pending,
        };
        let status = match self.status.as_deref() {
            Some(s) if !s.is_empty() => s.parse()?,
            _ => AccountStatus::Active,
        };

        let now = Utc::now();
        let created_at = match self.created_at.as_deref() {
            Some(s) => parse_timestamp(s)?,
            None => now,
        };
        let updated_at = match self.updated_at.as_deref() {
            Some(s) => parse_timestamp(s)?,
            None => created_at,
        };

        let governorate = self
            .address_governorate
            .or_else(|| self.detailed_address.and_then(|d| d.governorate))
            .filter(|g| !g.is_empty());

        Ok(Beneficiary {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name,
            full_name,
            national_id: self.national_id.unwrap_or_default(),
            phone: self.phone.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            governorate,
            organization_id: self.organization_id.filter(|v| !v.is_empty()),
            family_id: self.family_id.filter(|v| !v.is_empty()),
            identity_status,
            status,
            created_at,
            updated_at,
        })
    }
}

/// Parse RFC 3339 timestamps, falling back to bare `YYYY-MM-DD` dates
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid timestamp: {}", s))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid timestamp: {}", s))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

// ============================================================================
// TESTS
// ============================================================================
