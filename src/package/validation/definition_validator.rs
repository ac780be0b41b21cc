//! Route and socket definition validation
//!
//! Raw definitions arrive as JSON values straight from contribution modules.
//! Every violated field is reported, not only the first, so the operator can
//! fix a definition in one pass.

use serde_json::Value;
use tracing::debug;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Definition is valid
    Valid,
    /// Definition is invalid; one `"<field> <reason>"` entry per violation
    Invalid(Vec<String>),
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Outcome of validating one definition for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionCheck {
    pub is_valid: bool,
    /// Operator-facing message; empty when valid
    pub message: String,
}

/// Key holding a definition's middleware chain
pub const MIDDLEWARE_KEY: &str = "middlewareChain";
/// Accepted alternate spelling of [`MIDDLEWARE_KEY`]
pub const MIDDLEWARE_ALIAS: &str = "middleware";

/// Event delivery modes
pub const SOCKET_MODES: [&str; 2] = ["message", "stream"];

/// The middleware chain value, under either spelling
pub fn middleware_field(raw: &Value) -> Option<&Value> {
    raw.get(MIDDLEWARE_KEY).or_else(|| raw.get(MIDDLEWARE_ALIAS))
}

/// The socket mode value, under `type` or `mode`
pub fn mode_field(raw: &Value) -> Option<&Value> {
    raw.get("type").or_else(|| raw.get("mode"))
}

/// Validator for raw route and socket definitions
pub struct DefinitionValidator;

impl DefinitionValidator {
    /// Check a raw route definition
    pub fn validate_route(raw: &Value) -> ValidationResult {
        if !raw.is_object() {
            return ValidationResult::Invalid(vec!["route must be an object".to_string()]);
        }

        let mut errors = Vec::new();
        check_required_string(raw.get("path"), "path", &mut errors);

        match raw.get("httpMethod") {
            None | Some(Value::Null) => errors.push("httpMethod is required".to_string()),
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors.push("httpMethod must not be empty".to_string())
            }
            Some(Value::Array(items)) if items.is_empty() => {
                errors.push("httpMethod must not be empty".to_string())
            }
            Some(value) if !is_string_or_string_list(value) => {
                errors.push("httpMethod must be a string or an array of strings".to_string())
            }
            _ => {}
        }

        match middleware_field(raw) {
            None | Some(Value::Null) => errors.push(format!("{} is required", MIDDLEWARE_KEY)),
            Some(Value::Array(items)) if items.is_empty() => {
                errors.push(format!("{} must not be empty", MIDDLEWARE_KEY))
            }
            Some(value) if !is_string_or_string_list(value) => errors.push(format!(
                "{} must be a handler name or an array of handler names",
                MIDDLEWARE_KEY
            )),
            _ => {}
        }

        if let Some(level) = raw.get("accessLevel") {
            match level {
                Value::String(s) if !s.trim().is_empty() => {}
                Value::String(_) => errors.push("accessLevel must not be empty".to_string()),
                _ => errors.push("accessLevel must be of string type".to_string()),
            }
        }

        ValidationResult::from_errors(errors)
    }

    /// Check a raw socket definition
    pub fn validate_socket(raw: &Value) -> ValidationResult {
        if !raw.is_object() {
            return ValidationResult::Invalid(vec!["socket must be an object".to_string()]);
        }

        let mut errors = Vec::new();
        check_required_string(raw.get("event"), "event", &mut errors);

        match raw.get("onEvent") {
            None | Some(Value::Null) => errors.push("onEvent is required".to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(_) => errors.push("onEvent must be a handler name".to_string()),
        }

        if let Some(value) = middleware_field(raw) {
            if !value.is_null() && !is_string_or_string_list(value) {
                errors.push(format!(
                    "{} must be a handler name or an array of handler names",
                    MIDDLEWARE_KEY
                ));
            }
        }

        if let Some(mode) = mode_field(raw) {
            let known = mode.as_str().map_or(false, |m| SOCKET_MODES.contains(&m));
            if !known {
                errors.push("type must be \"message\" or \"stream\"".to_string());
            }
        }

        ValidationResult::from_errors(errors)
    }

    /// Format the operator message for an invalid definition
    ///
    /// `Invalid <kind> "<json>" from package "<package>": <a>, <b>.`
    pub fn message(kind: &str, raw: &Value, package: &str, errors: &[String]) -> String {
        format!(
            "Invalid {} \"{}\" from package \"{}\": {}.",
            kind,
            raw,
            package,
            errors.join(", ")
        )
    }
}

/// Validate a route definition for a package
pub fn validate_route(raw: &Value, package: &str) -> DefinitionCheck {
    check("route", DefinitionValidator::validate_route(raw), raw, package)
}

/// Validate a socket definition for a package
pub fn validate_socket(raw: &Value, package: &str) -> DefinitionCheck {
    check("socket", DefinitionValidator::validate_socket(raw), raw, package)
}

fn check(kind: &str, result: ValidationResult, raw: &Value, package: &str) -> DefinitionCheck {
    match result {
        ValidationResult::Valid => DefinitionCheck {
            is_valid: true,
            message: String::new(),
        },
        ValidationResult::Invalid(errors) => {
            debug!("{} definition from {} failed validation: {:?}", kind, package, errors);
            DefinitionCheck {
                is_valid: false,
                message: DefinitionValidator::message(kind, raw, package, &errors),
            }
        }
    }
}

fn check_required_string(value: Option<&Value>, field: &str, errors: &mut Vec<String>) {
    match value {
        None | Some(Value::Null) => errors.push(format!("{} is required", field)),
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(format!("{} must not be empty", field))
        }
        Some(Value::String(_)) => {}
        Some(_) => errors.push(format!("{} must be of string type", field)),
    }
}

fn is_string_or_string_list(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items
            .iter()
            .all(|item| item.as_str().map_or(false, |s| !s.trim().is_empty())),
        _ => false,
    }
}
