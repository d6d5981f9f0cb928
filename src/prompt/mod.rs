//! Prompt templates with `{name}` placeholders.
//!
//! Literal braces are written doubled (`{{` and `}}`), so JSON examples can
//! live inside a template. Rendering is a plain fill: no conditionals, no
//! loops, no nested expressions.

pub mod expense;

use crate::domain::model::ExpenseItem;
use crate::utils::error::{CategorizerError, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub use expense::{few_shot_examples, FewShotExample, EXPENSE_CATEGORIZATION_PROMPT, EXPENSE_VARIABLES};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    input_variables: Vec<String>,
}

/// TOML 形式的 prompt 檔
#[derive(Debug, Deserialize)]
struct PromptFile {
    template: String,
    input_variables: Option<Vec<String>>,
}

impl PromptTemplate {
    pub fn new(text: &str) -> Result<Self> {
        let segments = parse_segments(text)?;

        let mut input_variables: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Variable(name) = segment {
                if !input_variables.contains(name) {
                    input_variables.push(name.clone());
                }
            }
        }

        Ok(Self {
            segments,
            input_variables,
        })
    }

    /// 內建的支出分類 prompt
    pub fn default_expense() -> Result<Self> {
        Self::new(EXPENSE_CATEGORIZATION_PROMPT)
    }

    /// Loads a template from disk.
    ///
    /// `.toml` files carry `template` and an optional `input_variables`
    /// list that must match the placeholders; anything else is read as raw
    /// template text.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if !is_toml {
            return Self::new(&content);
        }

        let file: PromptFile = toml::from_str(&content).map_err(|e| CategorizerError::TemplateError {
            message: format!("Invalid prompt file {}: {}", path.display(), e),
        })?;
        let template = Self::new(&file.template)?;

        if let Some(declared) = file.input_variables {
            let declared: BTreeSet<&str> = declared.iter().map(|s| s.as_str()).collect();
            let found: BTreeSet<&str> = template.input_variables.iter().map(|s| s.as_str()).collect();
            if declared != found {
                return Err(CategorizerError::TemplateError {
                    message: format!(
                        "Declared input_variables {:?} do not match template placeholders {:?}",
                        declared, found
                    ),
                });
            }
        }

        Ok(template)
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// 確認模板剛好使用四個支出變數
    pub fn validate_expense_template(&self) -> Result<()> {
        let found: BTreeSet<&str> = self.input_variables.iter().map(|s| s.as_str()).collect();
        let expected: BTreeSet<&str> = EXPENSE_VARIABLES.iter().copied().collect();

        if found != expected {
            let missing: Vec<&str> = expected.difference(&found).copied().collect();
            let unexpected: Vec<&str> = found.difference(&expected).copied().collect();
            return Err(CategorizerError::TemplateError {
                message: format!(
                    "Expense prompt must use exactly {:?}; missing {:?}, unexpected {:?}",
                    EXPENSE_VARIABLES, missing, unexpected
                ),
            });
        }
        Ok(())
    }

    pub fn render(&self, vars: &HashMap<&str, String>) -> Result<String> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Variable(name) => {
                    let value = vars.get(name.as_str()).ok_or_else(|| CategorizerError::TemplateError {
                        message: format!("Missing value for template variable '{}'", name),
                    })?;
                    output.push_str(value);
                }
            }
        }
        Ok(output)
    }

    pub fn expense_vars(item: &ExpenseItem) -> HashMap<&'static str, String> {
        HashMap::from([
            ("product_name", item.product_name.clone()),
            ("unit_price", item.unit_price.to_string()),
            ("quantity", item.quantity.to_string()),
            ("order_date", item.order_date.clone()),
        ])
    }

    pub fn render_expense(&self, item: &ExpenseItem) -> Result<String> {
        self.render(&Self::expense_vars(item))
    }
}

fn parse_segments(text: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    literal.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    return Err(template_error(pos, "unclosed '{'"));
                }
                if !is_identifier(&name) {
                    return Err(template_error(
                        pos,
                        &format!("invalid placeholder '{{{}}}' (use '{{{{' for a literal brace)", name),
                    ));
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name));
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(template_error(pos, "single '}' (use '}}' for a literal brace)"));
                }
            }
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn template_error(pos: usize, message: &str) -> CategorizerError {
    CategorizerError::TemplateError {
        message: format!("at byte {}: {}", pos, message),
    }
}
