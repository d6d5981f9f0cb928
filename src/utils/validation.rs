use crate::domain::ports::ColumnMapping;
use crate::utils::error::{CategorizerError, Result};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl Into<String>, reason: impl Into<String>) -> CategorizerError {
    CategorizerError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.into(),
        reason: reason.into(),
    }
}

/// Ollama 位址只接受 http / https
pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value.to_string(),
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

/// Extension check ignoring case, so `EXPENSES.CSV` passes for `csv`.
pub fn validate_file_extension(field_name: &str, path: &str, allowed_extensions: &[&str]) -> Result<()> {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| invalid(field_name, path, "File has no extension or invalid filename"))?;

    if allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    {
        Ok(())
    } else {
        Err(invalid(
            field_name,
            path,
            format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        ))
    }
}

/// 四個對應欄位皆不可空白，也不可指向同一欄
pub fn validate_column_mapping(field_prefix: &str, columns: &ColumnMapping) -> Result<()> {
    let entries = [
        ("product_name", &columns.product_name),
        ("unit_price", &columns.unit_price),
        ("quantity", &columns.quantity),
        ("order_date", &columns.order_date),
    ];

    let mut seen = HashSet::new();
    for (key, column) in entries {
        let field = format!("{}.{}", field_prefix, key);
        validate_non_empty_string(&field, column)?;
        if !seen.insert(column.trim()) {
            return Err(invalid(
                &field,
                column.as_str(),
                "Column is already mapped to another expense field",
            ));
        }
    }
    Ok(())
}

/// 輸出格式只接受 csv / tsv / json
pub fn validate_output_formats(field_name: &str, formats: &[String]) -> Result<()> {
    const VALID_FORMATS: [&str; 3] = ["csv", "tsv", "json"];

    if formats.is_empty() {
        return Err(invalid(field_name, "", "At least one output format is required"));
    }

    match formats.iter().find(|f| !VALID_FORMATS.contains(&f.as_str())) {
        Some(format) => Err(invalid(
            field_name,
            format.as_str(),
            format!("Unsupported format. Valid formats: {}", VALID_FORMATS.join(", ")),
        )),
        None => Ok(()),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field_name, value, "Value cannot be empty or whitespace-only"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}
