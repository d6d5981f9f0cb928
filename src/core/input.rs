use crate::domain::model::{ExpenseItem, ExpenseRecord};
use crate::domain::ports::ColumnMapping;
use crate::utils::error::{CategorizerError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// 將日期正規化成 YYYY-MM-DD；無法解析時原樣回傳
pub fn parse_date(raw: &str) -> String {
    let value = raw.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.format(DATE_FORMAT).to_string();
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return dt.format(DATE_FORMAT).to_string();
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.format(DATE_FORMAT).to_string();
    }

    tracing::warn!("⚠️ Could not parse order date '{}', passing it through as-is", value);
    value.to_string()
}

/// Parses a currency amount such as `$1,299.00`. Negative values are rejected.
pub fn parse_price(raw: &str) -> std::result::Result<Decimal, String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let price = Decimal::from_str(&cleaned).map_err(|_| format!("invalid unit price '{}'", raw.trim()))?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err(format!("unit price cannot be negative: {}", raw.trim()));
    }
    Ok(price)
}

/// 數量必須為正整數；"2.0" 這類整數浮點也接受
pub fn parse_quantity(raw: &str) -> std::result::Result<u32, String> {
    let value = raw.trim();
    if let Ok(quantity) = value.parse::<u32>() {
        return if quantity == 0 {
            Err("quantity must be at least 1".to_string())
        } else {
            Ok(quantity)
        };
    }

    let decimal = Decimal::from_str(value).map_err(|_| format!("invalid quantity '{}'", value))?;
    if !decimal.fract().is_zero() {
        return Err(format!("quantity must be a whole number, got '{}'", value));
    }
    if decimal <= Decimal::ZERO {
        return Err(format!("quantity must be at least 1, got '{}'", value));
    }
    decimal
        .trunc()
        .to_string()
        .parse::<u32>()
        .map_err(|_| format!("quantity out of range: '{}'", value))
}

/// Builds the prompt input from a CSV row.
///
/// Returns `Ok(None)` when the product name is missing; the row is then
/// skipped rather than failed.
pub fn record_to_item(record: &ExpenseRecord, columns: &ColumnMapping) -> Result<Option<ExpenseItem>> {
    let product_name = match record.get(&columns.product_name) {
        Some(name) => name.to_string(),
        None => return Ok(None),
    };

    let row = record.row_number;
    let unit_price = match record.get(&columns.unit_price) {
        Some(raw) => parse_price(raw).map_err(|message| CategorizerError::InputError { row, message })?,
        None => Decimal::ZERO,
    };
    let quantity = match record.get(&columns.quantity) {
        Some(raw) => parse_quantity(raw).map_err(|message| CategorizerError::InputError { row, message })?,
        None => 1,
    };
    let order_date = record
        .get(&columns.order_date)
        .map(parse_date)
        .unwrap_or_else(|| "N/A".to_string());

    Ok(Some(ExpenseItem {
        product_name,
        unit_price,
        quantity,
        order_date,
    }))
}
