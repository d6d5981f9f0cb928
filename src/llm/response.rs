use crate::domain::model::{ExpenseCategory, ExpenseClassification};
use crate::utils::error::{CategorizerError, Result};
use serde_json::Value;

pub const DEFAULT_JUSTIFICATION: &str = "No justification provided by LLM";

const KNOWN_KEYS: [&str; 3] = ["category", "is_deductible", "justification"];
const MISSING_CATEGORY_LABEL: &str = "missing";

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Parses and validates a model reply into the three-key classification.
///
/// A missing `is_deductible` means `false` and a missing justification gets
/// a placeholder. Wrong types are rejected. With `strict_categories`, a
/// missing category or one outside the closed list is rejected; otherwise it
/// is mapped to `OtherBusinessExpense` and the original label is kept in the
/// justification.
pub fn parse_classification(raw: &str, strict_categories: bool) -> Result<ExpenseClassification> {
    let text = strip_json_fences(raw);
    if text.is_empty() {
        return Err(rejected("empty response"));
    }

    let value: Value = serde_json::from_str(text).map_err(|e| {
        rejected(&format!("not valid JSON ({}): {}", e, preview(text)))
    })?;

    let obj = value
        .as_object()
        .ok_or_else(|| rejected(&format!("expected a JSON object, got: {}", preview(text))))?;

    for key in obj.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
        tracing::debug!("Ignoring unexpected key '{}' in model response", key);
    }

    let justification = match obj.get("justification") {
        None | Some(Value::Null) => DEFAULT_JUSTIFICATION.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => DEFAULT_JUSTIFICATION.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            return Err(rejected(&format!("'justification' must be a string, got {}", other)))
        }
    };

    let is_deductible = match obj.get("is_deductible") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(rejected(&format!("'is_deductible' must be a boolean, got {}", other)))
        }
    };

    let label = match obj.get("category") {
        None | Some(Value::Null) => None,
        Some(Value::String(label)) => Some(label.as_str()),
        Some(other) => {
            return Err(rejected(&format!("'category' must be a string, got {}", other)))
        }
    };

    let listed = label
        .and_then(ExpenseCategory::from_label)
        .filter(|c| c.is_model_category());

    let (category, justification) = match (listed, label) {
        (Some(category), _) => (category, justification),
        (None, None) if strict_categories => return Err(rejected("missing 'category'")),
        (None, Some(label)) if strict_categories => {
            return Err(rejected(&format!(
                "category '{}' is not one of the allowed categories",
                label
            )))
        }
        (None, label) => {
            let label = label.unwrap_or(MISSING_CATEGORY_LABEL);
            tracing::warn!(
                "⚠️ Unlisted category '{}' mapped to '{}'",
                label,
                ExpenseCategory::OtherBusinessExpense
            );
            (
                ExpenseCategory::OtherBusinessExpense,
                format!("[model category: {}] {}", label, justification),
            )
        }
    };

    Ok(ExpenseClassification {
        category,
        is_deductible,
        justification,
    })
}

fn rejected(message: &str) -> CategorizerError {
    CategorizerError::ResponseValidationError {
        message: message.to_string(),
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        out.push('…');
    }
    out
}
