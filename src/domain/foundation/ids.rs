//! Strongly-typed identifier value objects.
//!
//! Every identity in the service is a UUID. The newtypes keep a
//! subscription id from being passed where a plan id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a subscription.
    SubscriptionId
);

uuid_id!(
    /// Unique identifier for a plan in the catalog.
    PlanId
);

uuid_id!(
    /// Identity of the subscribing user, issued by the external auth service.
    UserId
);

uuid_id!(
    /// Identity of a payment at the billing provider.
    ///
    /// Set from the id of the payment-succeeded event that activated the
    /// subscription.
    PaymentId
);

uuid_id!(
    /// Identity of an inbound provider event; the idempotency key.
    EventId
);

impl From<EventId> for PaymentId {
    fn from(id: EventId) -> Self {
        PaymentId(id.0)
    }
}
