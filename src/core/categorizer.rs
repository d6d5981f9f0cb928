use crate::core::input::record_to_item;
use crate::domain::model::{ExpenseClassification, ExpenseItem, ExpenseRecord, RowOutcome};
use crate::domain::ports::{ChatModel, ColumnMapping};
use crate::llm::response::parse_classification;
use crate::prompt::PromptTemplate;
use crate::utils::error::Result;

pub const MISSING_PRODUCT_JUSTIFICATION: &str = "Missing product information";

/// Renders the prompt for one expense, asks the model and validates the answer.
pub struct ExpenseCategorizer<M: ChatModel> {
    template: PromptTemplate,
    model: M,
    strict_categories: bool,
}

impl<M: ChatModel> ExpenseCategorizer<M> {
    pub fn new(template: PromptTemplate, model: M, strict_categories: bool) -> Self {
        Self {
            template,
            model,
            strict_categories,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn categorize(&self, item: &ExpenseItem) -> Result<ExpenseClassification> {
        let prompt = self.template.render_expense(item)?;
        tracing::debug!(
            "Prompt for '{}' rendered ({} chars), calling {}",
            item.product_name,
            prompt.len(),
            self.model.model_name()
        );

        let raw = self.model.complete(&prompt).await?;
        parse_classification(&raw, self.strict_categories)
    }

    /// 只渲染 prompt，不呼叫模型（dry run 用）
    pub fn render_record(&self, record: &ExpenseRecord, columns: &ColumnMapping) -> Result<Option<String>> {
        match record_to_item(record, columns)? {
            Some(item) => self.template.render_expense(&item).map(Some),
            None => Ok(None),
        }
    }

    /// Applies the per-row policy: missing product name is a skip, any
    /// failure becomes an `Error` row.
    pub async fn categorize_record(&self, record: &ExpenseRecord, columns: &ColumnMapping) -> RowOutcome {
        let row = record.row_number;

        let item = match record_to_item(record, columns) {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::warn!("⚠️ Skipping row {} due to missing '{}'", row, columns.product_name);
                return RowOutcome::Skipped(ExpenseClassification::skipped(MISSING_PRODUCT_JUSTIFICATION));
            }
            Err(e) => {
                tracing::error!("❌ Error processing row {}: {}", row, e);
                return RowOutcome::Failed(ExpenseClassification::failed(format!(
                    "Error during processing: {}",
                    e
                )));
            }
        };

        match self.categorize(&item).await {
            Ok(classification) => {
                tracing::info!(
                    "📦 Row {}: '{}' → {} (deductible: {})",
                    row,
                    item.product_name,
                    classification.category,
                    classification.is_deductible
                );
                tracing::debug!("📝 Justification: {}", classification.justification);
                RowOutcome::Categorized(item, classification)
            }
            Err(e) => {
                tracing::error!("❌ Error processing row {}: {}", row, e);
                RowOutcome::Failed(ExpenseClassification::failed(format!(
                    "Error during processing: {}",
                    e
                )))
            }
        }
    }
}
