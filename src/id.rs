//! Typed references between collections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
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
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

identifier!(
    /// Identifier of a [`crate::user::User`].
    UserId
);
identifier!(
    /// Identifier of a [`crate::department::Department`].
    DepartmentId
);
identifier!(
    /// Identifier of a [`crate::challenge::ChallengeTemplate`].
    TemplateId
);
identifier!(
    /// Identifier of a [`crate::challenge::Planning`].
    PlanningId
);
identifier!(
    /// Identifier of a [`crate::ledger::Submission`].
    SubmissionId
);
identifier!(
    /// Identifier of a [`crate::challenge::Comment`].
    CommentId
);
identifier!(
    /// Identifier of a badge collected by a user.
    BadgeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id = PlanningId::generate();
        let parsed: PlanningId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = DepartmentId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
