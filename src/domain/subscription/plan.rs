//! Plan catalog entry.
//!
//! Plans are reference data. Once a subscription points at a plan only
//! the active flag may change, and it gates new subscriptions only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, Timestamp, ValidationError};

/// Whether a plan accepts new subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Active,
    Inactive,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "ACTIVE",
            PlanStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PlanStatus::Active),
            "INACTIVE" => Some(PlanStatus::Inactive),
            _ => None,
        }
    }
}

/// A subscribable offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: Option<String>,
    /// Price per period, fixed-point.
    pub amount: Decimal,
    /// ISO-4217 code, three uppercase letters.
    pub currency: String,
    pub period_days: u32,
    pub status: PlanStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Plan {
    /// Creates a new active plan.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an empty name, a non-positive amount
    /// or period, or a currency that is not three uppercase ASCII letters.
    pub fn new(
        name: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        period_days: u32,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if amount <= Decimal::ZERO {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("must be greater than zero, got {}", amount),
            ));
        }
        let currency = currency.into();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("expected ISO-4217 code, got '{}'", currency),
            ));
        }
        if period_days == 0 {
            return Err(ValidationError::not_positive("period_days", 0));
        }

        let now = Timestamp::now();
        Ok(Self {
            id: PlanId::new(),
            name,
            description: None,
            amount,
            currency,
            period_days,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    /// Stops the plan from accepting new subscriptions.
    pub fn deactivate(&mut self) {
        self.status = PlanStatus::Inactive;
        self.updated_at = Timestamp::now();
    }
}
