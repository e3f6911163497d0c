//! Shared shape of the entity state machines.

use crate::error::{DomainError, Result};

/// A finite set of statuses with a fixed transition table.
///
/// Transitions are pure: [`Status::transition`] either returns the requested
/// status or rejects the change, it never coerces. Requesting the current
/// status is itself rejected; callers that want duplicate events to be a
/// no-op check for that before transitioning.
pub trait Status: Copy + Eq + std::fmt::Debug + 'static {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// Returns true if `next` may follow `self`.
    fn can_transition_to(&self, next: Self) -> bool;

    /// The status name as stored and sent on the wire.
    fn as_str(&self) -> &'static str;

    /// Returns true if no transition leaves this status.
    fn is_terminal(&self) -> bool;

    /// Checks a transition and returns the new status.
    fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                entity: Self::ENTITY,
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

/// Implements `Display` and `FromStr` for a status enum from its variant names.
macro_rules! status_strings {
    ($ty:ident, $entity:literal, { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            /// Every status, in lifecycle order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),*];

            fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)*
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::error::ValidationError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)*
                    other => Err($crate::error::ValidationError::UnknownStatus {
                        entity: $entity,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use status_strings;
