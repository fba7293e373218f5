//! Element types, party roles and visibility.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Semantic element type of a tensor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Common type two numeric operands are promoted to before a kernel runs.
    ///
    /// Integers widen to the larger integer; as soon as one side is a float the
    /// result is the widest float among the operands, with `Int64` alone never
    /// forcing `Float64`.
    pub fn common_numeric(lhs: DataType, rhs: DataType) -> Option<DataType> {
        use DataType::*;
        match (lhs, rhs) {
            (Bool, _) | (_, Bool) => None,
            (Float64, _) | (_, Float64) => Some(Float64),
            (Float32, _) | (_, Float32) => Some(Float32),
            (Int64, _) | (_, Int64) => Some(Int64),
            (Int32, Int32) => Some(Int32),
        }
    }
}

/// Name of a party taking part in a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct Role(pub String);

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role(s)
    }
}

impl From<&String> for Role {
    fn from(s: &String) -> Self {
        Role(s.clone())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role(s.to_string())
    }
}

/// Who may see the plaintext of a value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Known to every party.
    #[display(fmt = "public")]
    Public,
    /// Plaintext held by a single party.
    #[display(fmt = "private({})", _0)]
    Private(Role),
    /// Additively shared; no party sees the plaintext.
    #[display(fmt = "secret")]
    Secret,
}

impl Visibility {
    fn rank(&self) -> u8 {
        match self {
            Visibility::Public => 0,
            Visibility::Private(_) => 1,
            Visibility::Secret => 2,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Visibility::Secret)
    }

    /// Owner of a private value.
    pub fn owner(&self) -> Option<&Role> {
        match self {
            Visibility::Private(owner) => Some(owner),
            _ => None,
        }
    }

    /// Visibility of a value computed from `lhs` and `rhs`.
    ///
    /// Secret dominates private which dominates public. Values private to two
    /// different parties can only be combined as a secret.
    pub fn most_restrictive(lhs: &Visibility, rhs: &Visibility) -> Visibility {
        match (lhs, rhs) {
            (Visibility::Private(a), Visibility::Private(b)) if a != b => Visibility::Secret,
            _ if lhs.rank() >= rhs.rank() => lhs.clone(),
            _ => rhs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn private(owner: &str) -> Visibility {
        Visibility::Private(Role::from(owner))
    }

    #[rstest]
    #[case(Visibility::Public, Visibility::Public, Visibility::Public)]
    #[case(Visibility::Public, private("alice"), private("alice"))]
    #[case(private("alice"), Visibility::Public, private("alice"))]
    #[case(private("alice"), private("alice"), private("alice"))]
    #[case(private("alice"), private("bob"), Visibility::Secret)]
    #[case(Visibility::Secret, Visibility::Public, Visibility::Secret)]
    #[case(private("bob"), Visibility::Secret, Visibility::Secret)]
    fn most_restrictive_visibility(
        #[case] lhs: Visibility,
        #[case] rhs: Visibility,
        #[case] expected: Visibility,
    ) {
        assert_eq!(Visibility::most_restrictive(&lhs, &rhs), expected);
        assert_eq!(Visibility::most_restrictive(&rhs, &lhs), expected);
    }

    #[rstest]
    #[case(DataType::Int32, DataType::Int32, Some(DataType::Int32))]
    #[case(DataType::Int32, DataType::Int64, Some(DataType::Int64))]
    #[case(DataType::Int64, DataType::Float32, Some(DataType::Float32))]
    #[case(DataType::Float32, DataType::Float64, Some(DataType::Float64))]
    #[case(DataType::Bool, DataType::Int64, None)]
    fn common_numeric_type(
        #[case] lhs: DataType,
        #[case] rhs: DataType,
        #[case] expected: Option<DataType>,
    ) {
        assert_eq!(DataType::common_numeric(lhs, rhs), expected);
    }

    #[test]
    fn visibility_serde() {
        let vis: Visibility = serde_json::from_str(r#"{"private": "alice"}"#).unwrap();
        assert_eq!(vis, private("alice"));
        let vis: Visibility = serde_json::from_str(r#""secret""#).unwrap();
        assert_eq!(vis, Visibility::Secret);
        assert_eq!(private("bob").to_string(), "private(bob)");
    }
}
