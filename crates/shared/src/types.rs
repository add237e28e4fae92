//! Common types used across FerroPDV

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subscription plan offered to scrap-yard accounts.
///
/// Each plan maps to a fixed nominal duration; the entitlement row stores the
/// concrete `expires_at`, so the duration here is only used at activation time
/// and for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Trial,
    Monthly,
    Quarterly,
    Annual,
}

impl PlanType {
    /// Nominal plan duration in days.
    pub fn period_days(&self) -> i64 {
        match self {
            Self::Trial => 7,
            Self::Monthly => 30,
            Self::Quarterly => 90,
            Self::Annual => 365,
        }
    }

    /// Customer-facing plan name (pt-BR, matches the storefront).
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Trial => "Teste Gratis",
            Self::Monthly => "Plano Mensal",
            Self::Quarterly => "Plano Trimestral",
            Self::Annual => "Plano Anual",
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Monthly => write!(f, "monthly"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Annual => write!(f, "annual"),
        }
    }
}

impl FromStr for PlanType {
    type Err = UnknownPlanType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(Self::Trial),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annual" => Ok(Self::Annual),
            other => Err(UnknownPlanType(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown plan type: {0}")]
pub struct UnknownPlanType(pub String);

/// How an entitlement row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivationMethod {
    /// Self-service trial activation.
    Trial,
    /// PIX payment approved by the gateway.
    Payment,
    /// Manual grant by a platform administrator.
    Admin,
}

impl std::fmt::Display for ActivationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Payment => write!(f, "payment"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_durations() {
        assert_eq!(PlanType::Trial.period_days(), 7);
        assert_eq!(PlanType::Monthly.period_days(), 30);
        assert_eq!(PlanType::Quarterly.period_days(), 90);
        assert_eq!(PlanType::Annual.period_days(), 365);
    }

    #[test]
    fn test_plan_type_round_trip() {
        for plan in [
            PlanType::Trial,
            PlanType::Monthly,
            PlanType::Quarterly,
            PlanType::Annual,
        ] {
            let parsed: PlanType = plan.to_string().parse().unwrap();
            assert_eq!(parsed, plan);
        }
        assert!("lifetime".parse::<PlanType>().is_err());
    }

    #[test]
    fn test_plan_type_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlanType::Quarterly).unwrap(),
            "\"quarterly\""
        );
        let plan: PlanType = serde_json::from_str("\"trial\"").unwrap();
        assert_eq!(plan, PlanType::Trial);
    }
}
