//! Credential lifecycle: create when absent, reuse when present
//!
//! A secret is only generated when it does not exist yet or when the
//! operator forces rotation. Re-running the pipeline after a partial
//! failure therefore never issues a second live credential.

use crate::adapters::{ClusterApi, SecretKind, SecretSpec, EXPIRY_ANNOTATION};
use crate::error::DeployError;
use chrono::{Days, Months, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Annotation carrying the revision id of a generated secret
pub const REVISION_ANNOTATION: &str = "deploy-pipeline/revision";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Day,
    Week,
    Month,
    Year,
}

/// A relative lifetime such as `+1 year`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl {
    pub amount: u32,
    pub unit: TtlUnit,
}

impl Ttl {
    pub fn new(amount: u32, unit: TtlUnit) -> Self {
        Self { amount, unit }
    }

    /// Add the lifetime to a date using calendar arithmetic
    ///
    /// Month and year steps clamp to the end of a shorter month, so
    /// 2028-02-29 plus one year is 2029-02-28.
    pub fn apply(&self, from: NaiveDate) -> Option<NaiveDate> {
        match self.unit {
            TtlUnit::Day => from.checked_add_days(Days::new(u64::from(self.amount))),
            TtlUnit::Week => from.checked_add_days(Days::new(u64::from(self.amount) * 7)),
            TtlUnit::Month => from.checked_add_months(Months::new(self.amount)),
            TtlUnit::Year => self
                .amount
                .checked_mul(12)
                .and_then(|months| from.checked_add_months(Months::new(months))),
        }
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::new(1, TtlUnit::Year)
    }
}

impl FromStr for Ttl {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DeployError::InvalidExpiry {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let body = s.trim().trim_start_matches('+');
        let mut parts = body.split_whitespace();
        let amount = parts
            .next()
            .ok_or_else(|| invalid("empty lifetime"))?
            .parse::<u32>()
            .map_err(|_| invalid("amount is not a positive integer"))?;
        let unit = match parts.next().map(|u| u.to_ascii_lowercase()).as_deref() {
            Some("day" | "days") => TtlUnit::Day,
            Some("week" | "weeks") => TtlUnit::Week,
            Some("month" | "months") => TtlUnit::Month,
            Some("year" | "years") => TtlUnit::Year,
            _ => return Err(invalid("unit must be day, week, month or year")),
        };
        if parts.next().is_some() {
            return Err(invalid("unexpected trailing text"));
        }
        if amount == 0 {
            return Err(invalid("lifetime must be at least one unit"));
        }

        Ok(Self { amount, unit })
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TtlUnit::Day => "day",
            TtlUnit::Week => "week",
            TtlUnit::Month => "month",
            TtlUnit::Year => "year",
        };
        let plural = if self.amount == 1 { "" } else { "s" };
        write!(f, "+{} {}{}", self.amount, unit, plural)
    }
}

/// When a generated credential stops being valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryPolicy {
    Never,
    Relative(Ttl),
    /// Operator supplied date, validated when the credential is ensured
    Absolute(String),
}

impl ExpiryPolicy {
    /// Compute the expiry date relative to `today`
    ///
    /// An absolute date must parse and lie strictly in the future.
    pub fn resolve(&self, today: NaiveDate) -> Result<Option<NaiveDate>, DeployError> {
        match self {
            ExpiryPolicy::Never => Ok(None),
            ExpiryPolicy::Relative(ttl) => {
                let date = ttl.apply(today).ok_or_else(|| DeployError::InvalidExpiry {
                    value: ttl.to_string(),
                    reason: "date out of range".to_string(),
                })?;
                Ok(Some(date))
            }
            ExpiryPolicy::Absolute(raw) => {
                let date = parse_date(raw)?;
                if date <= today {
                    return Err(DeployError::InvalidExpiry {
                        value: raw.clone(),
                        reason: format!("must be after {}", today),
                    });
                }
                Ok(Some(date))
            }
        }
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        ExpiryPolicy::Relative(Ttl::default())
    }
}

/// Expiry is a calendar date; timestamps are rejected rather than truncated
fn parse_date(raw: &str) -> Result<NaiveDate, DeployError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| DeployError::InvalidExpiry {
        value: raw.to_string(),
        reason: "expected a date as YYYY-MM-DD (timestamps are not accepted)".to_string(),
    })
}

/// What to ensure
#[derive(Debug, Clone)]
pub struct CredentialRequest {
    pub name: String,
    pub scope: String,
    pub expiry: ExpiryPolicy,
    /// Regenerate even when the secret exists
    pub force: bool,
}

impl CredentialRequest {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            expiry: ExpiryPolicy::Never,
            force: false,
        }
    }

    pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Secret material produced by a payload factory
#[derive(Debug, Clone, PartialEq)]
pub struct SecretPayload {
    pub kind: SecretKind,
    pub entries: BTreeMap<String, String>,
}

impl SecretPayload {
    pub fn opaque<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind: SecretKind::Opaque,
            entries: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Handle to an ensured credential; never carries the secret itself
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRef {
    pub name: String,
    pub scope: String,
    /// Set only when the credential was generated in this run
    pub revision: Option<Uuid>,
    pub expires_on: Option<NaiveDate>,
    pub reused: bool,
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Owns create-or-reuse of generated secrets
#[derive(Clone)]
pub struct CredentialManager {
    cluster: Arc<dyn ClusterApi>,
    today: Clock,
}

impl CredentialManager {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self {
            cluster,
            today: Arc::new(|| Utc::now().date_naive()),
        }
    }

    /// Pin the current date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Arc::new(move || today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    /// Make sure the credential exists, generating it only when needed
    ///
    /// The expiry is validated before anything else, so a bad date never
    /// reaches the cluster. The factory receives the computed expiry and is
    /// called at most once, only when the secret is absent or forced.
    pub async fn ensure<F, Fut>(
        &self,
        request: &CredentialRequest,
        factory: F,
    ) -> Result<CredentialRef, DeployError>
    where
        F: FnOnce(Option<NaiveDate>) -> Fut + Send,
        Fut: Future<Output = Result<SecretPayload, DeployError>> + Send,
    {
        let expires_on = request.expiry.resolve((self.today)())?;

        let exists = self
            .cluster
            .secret_exists(&request.name, &request.scope)
            .await
            .map_err(|e| DeployError::adapter(format!("check secret {}", request.name), e))?;

        if exists && !request.force {
            info!("Reusing existing secret {}/{}", request.scope, request.name);
            return Ok(CredentialRef {
                name: request.name.clone(),
                scope: request.scope.clone(),
                revision: None,
                expires_on: None,
                reused: true,
            });
        }

        if exists {
            warn!("Rotating secret {}/{} on request", request.scope, request.name);
        }

        let payload = factory(expires_on)
            .await
            .map_err(|e| DeployError::CredentialGenerationFailed {
                name: request.name.clone(),
                reason: e.to_string(),
            })?;
        if payload.entries.is_empty() || payload.entries.values().any(String::is_empty) {
            return Err(DeployError::CredentialGenerationFailed {
                name: request.name.clone(),
                reason: "payload is empty".to_string(),
            });
        }

        let revision = Uuid::new_v4();
        let mut annotations =
            BTreeMap::from([(REVISION_ANNOTATION.to_string(), revision.to_string())]);
        if let Some(date) = expires_on {
            annotations.insert(EXPIRY_ANNOTATION.to_string(), date.format("%Y-%m-%d").to_string());
        }

        let secret = SecretSpec {
            name: request.name.clone(),
            namespace: request.scope.clone(),
            kind: payload.kind,
            entries: payload.entries,
            annotations,
        };
        self.cluster
            .apply_secret(&secret)
            .await
            .map_err(|e| DeployError::adapter(format!("write secret {}", request.name), e))?;

        info!("Wrote secret {}/{}", request.scope, request.name);
        Ok(CredentialRef {
            name: request.name.clone(),
            scope: request.scope.clone(),
            revision: Some(revision),
            expires_on,
            reused: false,
        })
    }
}
