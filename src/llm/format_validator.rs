use jsonschema::Validator;
use serde_json::Value;

/// Errors raised while checking a JSON answer against a schema
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid schema: {0}")]
    Schema(String),
}

/// Creates a JSON Schema validator from a schema string
///
/// # Arguments
/// * `schema_content` - The JSON Schema as a string
///
/// # Returns
/// * `Result<Validator, FormatError>` - The compiled validator on success, or an error
pub fn build_validator(schema_content: &str) -> Result<Validator, FormatError> {
    let schema: Value = serde_json::from_str(schema_content)?;
    jsonschema::validator_for(&schema).map_err(|e| FormatError::Schema(e.to_string()))
}

/// Parses an LLM answer as JSON and validates it against a schema
///
/// Answers wrapped in a Markdown code fence are unwrapped first.
///
/// # Returns
/// * `Result<Option<Value>, FormatError>` - The value when it matches, `None` when it does not, or a JSON error
pub fn validate_response(schema: &Validator, response: &str) -> Result<Option<Value>, FormatError> {
    let val: Value = serde_json::from_str(strip_code_fence(response))?;
    Ok(schema.is_valid(&val).then_some(val))
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
