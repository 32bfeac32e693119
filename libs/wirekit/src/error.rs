use crate::identifier::{Identifier, TargetKind};
use thiserror::Error;

fn join(path: &[Identifier]) -> String {
    path.iter()
        .map(Identifier::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors surfaced by [`crate::Container::resolve`] and slot accessors.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no definition registered for '{0}'")]
    UnregisteredIdentifier(Identifier),

    #[error("cyclic dependency detected: {}", join(path))]
    CyclicDependency { path: Vec<Identifier> },

    #[error("init hook failed for '{id}'")]
    Initialization {
        id: Identifier,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to construct '{id}'")]
    Construction {
        id: Identifier,
        #[source]
        source: anyhow::Error,
    },

    #[error("'{id}' does not resolve to a {expected}")]
    TypeMismatch {
        id: Identifier,
        expected: &'static str,
    },

    #[error("'{id}' was read before it finished construction")]
    DependencyNotReady { id: Identifier },

    #[error("{slot} slot was never bound by a container")]
    Unbound { slot: &'static str },

    #[error("constructor argument {index} was not provided")]
    MissingArgument { index: usize },
}

/// A destroy hook failed. Logged during teardown, never returned.
#[derive(Debug, Error)]
#[error("destroy hook failed for '{id}'")]
pub struct DestroyError {
    pub id: Identifier,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecoratorError {
    #[error("@{decorator} applies to a {expected}, not a {found}")]
    UnsupportedTarget {
        decorator: &'static str,
        expected: TargetKind,
        found: TargetKind,
    },
}

#[derive(Debug, Clone, Error)]
pub enum DefinitionError {
    #[error("class '{0}' is not in the catalog")]
    UnknownClass(&'static str),

    #[error("class '{0}' is not provided")]
    NotProvided(&'static str),

    #[error("class '{0}' has no factory")]
    MissingFactory(&'static str),

    #[error("property '{property}' of '{class}' has metadata but no slot")]
    MissingSlot {
        class: &'static str,
        property: String,
    },

    #[error("'{class}' declares {hook} method '{method}' without a body")]
    MissingHook {
        class: &'static str,
        hook: &'static str,
        method: String,
    },

    #[error("property '{property}' of '{class}' is declared twice")]
    DuplicateProperty {
        class: &'static str,
        property: String,
    },

    #[error("invalid '{key}' metadata on '{class}': {message}")]
    InvalidMetadata {
        class: &'static str,
        key: &'static str,
        message: String,
    },

    #[error("decorator rejected on '{class}'")]
    Decorator {
        class: &'static str,
        #[source]
        source: DecoratorError,
    },
}

/// Static validation of a catalog before anything is instantiated.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid component definitions:\n{errors:#?}")]
    InvalidDefinitions { errors: Vec<DefinitionError> },

    #[error("cyclic constructor dependency detected: {}", join(path))]
    CycleDetected { path: Vec<Identifier> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_the_full_path() {
        let err = ContainerError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> a");
    }
}
