//! Entity type → webservice operation lookup
//!
//! Each entity (e.g. `Contact`) is configured with an operation prefix; the
//! logical operation (`find`, `create`, ...) is appended to form the remote
//! operation name sent in the `operation` form field.

use std::collections::HashMap;

/// Resolution failures. These are configuration errors and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
}

/// Maps an entity type to its vendor operation prefix.
pub trait OperationResolver: Send + Sync {
    fn resolve(&self, entity: &str) -> Result<&str, ResolveError>;
}

/// Join a prefix and a logical operation: `("Contacts", "find")` → `Contacts.find`.
pub fn operation_name(prefix: &str, operation: &str) -> String {
    format!("{prefix}.{operation}")
}

/// Resolver backed by a fixed table, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    prefixes: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of one entity.
    pub fn with_entity(mut self, entity: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(entity.into(), prefix.into());
        self
    }

    /// Registered entity names, sorted.
    pub fn entities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.prefixes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<E: Into<String>, P: Into<String>> FromIterator<(E, P)> for StaticResolver {
    fn from_iter<I: IntoIterator<Item = (E, P)>>(iter: I) -> Self {
        Self {
            prefixes: iter
                .into_iter()
                .map(|(e, p)| (e.into(), p.into()))
                .collect(),
        }
    }
}

impl OperationResolver for StaticResolver {
    fn resolve(&self, entity: &str) -> Result<&str, ResolveError> {
        self.prefixes
            .get(entity)
            .map(String::as_str)
            .ok_or_else(|| ResolveError::UnknownEntity(entity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_entities() {
        let resolver = StaticResolver::new()
            .with_entity("Contact", "Contacts")
            .with_entity("Lead", "Leads");
        assert_eq!(resolver.resolve("Contact").unwrap(), "Contacts");
        assert_eq!(resolver.resolve("Lead").unwrap(), "Leads");
        assert_eq!(resolver.entities(), vec!["Contact", "Lead"]);
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let resolver: StaticResolver = [("Contact", "Contacts")].into_iter().collect();
        assert_eq!(
            resolver.resolve("Invoice"),
            Err(ResolveError::UnknownEntity("Invoice".into()))
        );
    }

    #[test]
    fn operation_name_joins_with_dot() {
        assert_eq!(operation_name("Contacts", "find"), "Contacts.find");
        assert_eq!(operation_name("Contacts", "create"), "Contacts.create");
    }
}
