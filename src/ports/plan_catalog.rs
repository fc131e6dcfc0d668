//! PlanCatalog port - Read access to plans inside a unit of work.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PlanId};
use crate::domain::subscription::Plan;

/// Read-only view of the plan catalog.
#[async_trait]
pub trait PlanCatalog: Send {
    /// Find a plan by id, active or not.
    async fn find_plan(&mut self, id: &PlanId) -> Result<Option<Plan>, DomainError>;
}
