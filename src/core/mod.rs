pub mod categorizer;
pub mod etl;
pub mod input;
pub mod pipeline;

pub use crate::domain::model::{
    CategorizationSummary, CategorizedExpense, ExpenseBatch, ExpenseCategory, ExpenseClassification,
    ExpenseItem, ExpenseRecord, RowOutcome, TransformResult,
};
pub use crate::domain::ports::{
    ChatModel, ColumnMapping, ConfigProvider, Pipeline, RowErrorPolicy, Storage,
};
pub use crate::utils::error::Result;
