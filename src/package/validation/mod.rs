//! Definition validation
//!
//! Structural checks for route and socket definitions before they are
//! resolved against the handler registry.

pub mod definition_validator;

pub use definition_validator::{
    middleware_field, mode_field, validate_route, validate_socket, DefinitionCheck,
    DefinitionValidator, ValidationResult, MIDDLEWARE_KEY,
};
