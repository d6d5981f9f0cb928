use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// 單筆待分類的支出（送入 prompt 的四個變數）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseItem {
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub order_date: String,
}

impl ExpenseItem {
    pub fn new(
        product_name: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
        order_date: impl Into<String>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            unit_price,
            quantity,
            order_date: order_date.into(),
        }
    }

    pub fn total_amount(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// IRS business expense categories the model may answer with.
///
/// `Unknown` and `Error` are never accepted from the model; they mark rows
/// that were skipped or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpenseCategory {
    OfficeSuppliesSoftware,
    ComputerHardwareEquipment,
    ProfessionalDevelopmentEducation,
    MarketingAdvertising,
    Travel,
    BusinessMeals,
    Utilities,
    RentLease,
    SubscriptionsDues,
    CostOfGoodsSold,
    RepairsMaintenance,
    Insurance,
    ProfessionalServices,
    BankFeesCharges,
    BusinessInterestExpense,
    TaxesLicenses,
    OtherBusinessExpense,
    PotentiallyPersonal,
    Unknown,
    Error,
}

impl ExpenseCategory {
    /// 模型可選用的 18 個類別，順序與 prompt 中列出的一致
    pub const ALL: [ExpenseCategory; 18] = [
        Self::OfficeSuppliesSoftware,
        Self::ComputerHardwareEquipment,
        Self::ProfessionalDevelopmentEducation,
        Self::MarketingAdvertising,
        Self::Travel,
        Self::BusinessMeals,
        Self::Utilities,
        Self::RentLease,
        Self::SubscriptionsDues,
        Self::CostOfGoodsSold,
        Self::RepairsMaintenance,
        Self::Insurance,
        Self::ProfessionalServices,
        Self::BankFeesCharges,
        Self::BusinessInterestExpense,
        Self::TaxesLicenses,
        Self::OtherBusinessExpense,
        Self::PotentiallyPersonal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::OfficeSuppliesSoftware => "Office Supplies & Software",
            Self::ComputerHardwareEquipment => "Computer Hardware & Equipment",
            Self::ProfessionalDevelopmentEducation => "Professional Development & Education",
            Self::MarketingAdvertising => "Marketing & Advertising",
            Self::Travel => "Travel",
            Self::BusinessMeals => "Business Meals",
            Self::Utilities => "Utilities",
            Self::RentLease => "Rent & Lease",
            Self::SubscriptionsDues => "Subscriptions & Dues",
            Self::CostOfGoodsSold => "Cost of Goods Sold (COGS)",
            Self::RepairsMaintenance => "Repairs & Maintenance",
            Self::Insurance => "Insurance",
            Self::ProfessionalServices => "Professional Services",
            Self::BankFeesCharges => "Bank Fees & Charges",
            Self::BusinessInterestExpense => "Business Interest Expense",
            Self::TaxesLicenses => "Taxes & Licenses",
            Self::OtherBusinessExpense => "Other Business Expense",
            Self::PotentiallyPersonal => "Potentially Personal / Non-Deductible",
            Self::Unknown => "Unknown",
            Self::Error => "Error",
        }
    }

    /// Parses a label from the closed list.
    ///
    /// Matching ignores case, surrounding whitespace and a trailing
    /// parenthetical ("Travel (Lodging)" is `Travel`). "COGS" and
    /// "Cost of Goods Sold" are accepted for `CostOfGoodsSold`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }

        match normalized.as_str() {
            "cogs" | "cost of goods sold" => return Some(Self::CostOfGoodsSold),
            "unknown" => return Some(Self::Unknown),
            _ => {}
        }

        Self::ALL
            .iter()
            .copied()
            .find(|category| normalize_label(category.label()) == normalized)
    }

    /// 是否為模型可回覆的合法類別
    pub fn is_model_category(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Error)
    }
}

fn normalize_label(label: &str) -> String {
    let trimmed = label.trim();
    let without_paren = match trimmed.find('(') {
        Some(idx) if trimmed.ends_with(')') && idx > 0 => trimmed[..idx].trim_end(),
        _ => trimmed,
    };
    without_paren
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ExpenseCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ExpenseCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        match label.as_str() {
            "Error" => Ok(Self::Error),
            _ => Self::from_label(&label).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown expense category '{}'", label))
            }),
        }
    }
}

/// 模型回覆的固定 JSON 形狀：category / is_deductible / justification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseClassification {
    pub category: ExpenseCategory,
    pub is_deductible: bool,
    pub justification: String,
}

impl ExpenseClassification {
    pub fn new(category: ExpenseCategory, is_deductible: bool, justification: impl Into<String>) -> Self {
        Self {
            category,
            is_deductible,
            justification: justification.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::new(ExpenseCategory::Unknown, false, reason)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(ExpenseCategory::Error, false, reason)
    }
}

/// 輸入 CSV 的一列，保留原始欄位順序
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRecord {
    pub row_number: usize,
    pub fields: Vec<(String, String)>,
}

impl ExpenseRecord {
    pub fn new(row_number: usize, fields: Vec<(String, String)>) -> Self {
        Self { row_number, fields }
    }

    /// 取欄位值；空白字串視為缺值
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// 解析後的輸入：原始標題列（含非對應欄位）與資料列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseBatch {
    pub headers: Vec<String>,
    pub records: Vec<ExpenseRecord>,
}

impl ExpenseBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Categorized(ExpenseItem, ExpenseClassification),
    Skipped(ExpenseClassification),
    Failed(ExpenseClassification),
}

impl RowOutcome {
    pub fn classification(&self) -> &ExpenseClassification {
        match self {
            Self::Categorized(_, c) | Self::Skipped(c) | Self::Failed(c) => c,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedExpense {
    pub record: ExpenseRecord,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorizationSummary {
    pub total_rows: usize,
    pub categorized: usize,
    pub skipped: usize,
    pub errors: usize,
    pub deductible: usize,
    pub by_category: BTreeMap<String, usize>,
    pub deductible_total: Decimal,
}

impl CategorizationSummary {
    pub fn from_expenses(expenses: &[CategorizedExpense]) -> Self {
        let mut summary = Self {
            total_rows: expenses.len(),
            ..Self::default()
        };

        for expense in expenses {
            let classification = expense.outcome.classification();
            *summary
                .by_category
                .entry(classification.category.label().to_string())
                .or_insert(0) += 1;

            match &expense.outcome {
                RowOutcome::Categorized(item, c) => {
                    summary.categorized += 1;
                    if c.is_deductible {
                        summary.deductible += 1;
                        summary.deductible_total += item.total_amount();
                    }
                }
                RowOutcome::Skipped(_) => summary.skipped += 1,
                RowOutcome::Failed(_) => summary.errors += 1,
            }
        }

        summary
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub expenses: Vec<CategorizedExpense>,
    pub headers: Vec<String>,
    pub summary: CategorizationSummary,
}
