use crate::domain::model::{ExpenseBatch, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 遇到單列錯誤時的處理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorPolicy {
    #[default]
    Continue,
    Abort,
}

/// 輸入 CSV 的欄位名稱對應
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub product_name: String,
    pub unit_price: String,
    pub quantity: String,
    pub order_date: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            product_name: "Product Name".to_string(),
            unit_price: "Unit Price".to_string(),
            quantity: "Quantity".to_string(),
            order_date: "Order Date".to_string(),
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn output_name(&self) -> &str;
    fn output_formats(&self) -> &[String];
    fn compress_output(&self) -> bool;
    fn columns(&self) -> &ColumnMapping;
    fn concurrent_requests(&self) -> usize;
    fn row_error_policy(&self) -> RowErrorPolicy;
}

/// A chat-completion backend: one rendered prompt in, raw model text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<ExpenseBatch>;
    async fn transform(&self, batch: ExpenseBatch) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
