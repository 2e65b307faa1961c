use serde::{Deserialize, Serialize};
use std::fmt;

/// Level every controller starts from, below all declarable levels
pub const RUNLEVEL_INITIAL: i32 = -2;

/// Lowest level a service may declare; reached by the first step of any ascent
pub const RUNLEVEL_IMMEDIATE: i32 = -1;

/// Identifier assigned to a service when it is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub u64);

impl ServiceId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc_{}", self.0)
    }
}

/// Structural description of a requested type
///
/// Equality and hashing are by value, so two descriptors built from the same
/// parts always compare equal and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// A plain named type, e.g. `Database`
    Class(String),

    /// A generic type applied to arguments, e.g. `Repository<User>`
    Parameterized {
        raw: String,
        arguments: Vec<TypeDescriptor>,
    },

    /// An unbound type variable, e.g. `T`; has no raw class
    Variable(String),
}

impl TypeDescriptor {
    pub fn class(name: impl Into<String>) -> Self {
        TypeDescriptor::Class(name.into())
    }

    pub fn parameterized(raw: impl Into<String>, arguments: Vec<TypeDescriptor>) -> Self {
        TypeDescriptor::Parameterized {
            raw: raw.into(),
            arguments,
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        TypeDescriptor::Variable(name.into())
    }

    /// The type reduced to its raw class name, if it has one
    pub fn raw_class_name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Class(name) => Some(name),
            TypeDescriptor::Parameterized { raw, .. } => Some(raw),
            TypeDescriptor::Variable(_) => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Class(name) | TypeDescriptor::Variable(name) => write!(f, "{}", name),
            TypeDescriptor::Parameterized { raw, arguments } => {
                write!(f, "{}<", raw)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Marker narrowing which service satisfies a type request
///
/// Members are kept in declaration order and are part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qualifier {
    name: String,
    #[serde(default)]
    members: Vec<(String, String)>,
}

impl Qualifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.members.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[(String, String)] {
        &self.members
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if !self.members.is_empty() {
            let members: Vec<String> = self
                .members
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "({})", members.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_class_name() {
        assert_eq!(TypeDescriptor::class("Database").raw_class_name(), Some("Database"));
        let repo = TypeDescriptor::parameterized("Repository", vec![TypeDescriptor::class("User")]);
        assert_eq!(repo.raw_class_name(), Some("Repository"));
        assert_eq!(TypeDescriptor::variable("T").raw_class_name(), None);
    }

    #[test]
    fn test_type_display() {
        let map = TypeDescriptor::parameterized(
            "Map",
            vec![TypeDescriptor::class("String"), TypeDescriptor::variable("V")],
        );
        assert_eq!(map.to_string(), "Map<String, V>");
    }

    #[test]
    fn test_qualifier_members_are_ordered() {
        let a = Qualifier::new("Named").with_member("a", "1").with_member("b", "2");
        let b = Qualifier::new("Named").with_member("b", "2").with_member("a", "1");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "@Named(a=1,b=2)");
    }
}
