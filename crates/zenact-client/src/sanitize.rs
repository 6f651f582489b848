use crate::error::ValidationError;

pub const PROMPT_MIN_LENGTH: usize = 3;
pub const PROMPT_MAX_LENGTH: usize = 2000;

/// Inclusive character bounds for a trimmed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for PromptBounds {
    fn default() -> Self {
        Self {
            min: PROMPT_MIN_LENGTH,
            max: PROMPT_MAX_LENGTH,
        }
    }
}

/// Trim `raw`, check its length against `bounds`, and strip NUL bytes.
///
/// Length is counted in characters and measured before NUL stripping.
pub fn sanitize_prompt(raw: &str, bounds: PromptBounds) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();

    if len < bounds.min {
        return Err(ValidationError::TooShort { min: bounds.min });
    }
    if len > bounds.max {
        return Err(ValidationError::TooLong { max: bounds.max });
    }

    Ok(trimmed.replace('\0', ""))
}
