use crate::core::categorizer::ExpenseCategorizer;
use crate::core::{
    CategorizationSummary, CategorizedExpense, ChatModel, ConfigProvider, ExpenseBatch, ExpenseRecord, Pipeline,
    RowErrorPolicy, RowOutcome, Storage, TransformResult,
};
use crate::utils::error::{CategorizerError, Result};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use zip::write::{FileOptions, ZipWriter};

pub const CATEGORY_COLUMN: &str = "Category";
pub const DEDUCTIBLE_COLUMN: &str = "Is Deductible";
pub const JUSTIFICATION_COLUMN: &str = "Justification";

pub struct ExpensePipeline<S: Storage, C: ConfigProvider, M: ChatModel + 'static> {
    storage: S,
    config: C,
    categorizer: Arc<ExpenseCategorizer<M>>,
}

impl<S: Storage, C: ConfigProvider, M: ChatModel + 'static> ExpensePipeline<S, C, M> {
    pub fn new(storage: S, config: C, categorizer: ExpenseCategorizer<M>) -> Self {
        Self {
            storage,
            config,
            categorizer: Arc::new(categorizer),
        }
    }

    pub fn categorizer(&self) -> &ExpenseCategorizer<M> {
        &self.categorizer
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn output_file(&self, extension: &str) -> String {
        format!("{}.{}", self.config.output_name(), extension)
    }

    fn output_location(&self, file_name: &str) -> String {
        Path::new(self.config.output_path())
            .join(file_name)
            .to_string_lossy()
            .to_string()
    }
}

/// 解析 CSV，保留所有欄位與欄位順序
pub fn parse_expense_csv(data: &[u8]) -> Result<ExpenseBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CategorizerError::InputError {
            row: 0,
            message: "input CSV has no header row".to_string(),
        });
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_string()))
            .collect();
        records.push(ExpenseRecord::new(index + 1, fields));
    }

    Ok(ExpenseBatch { headers, records })
}

fn output_headers(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = headers.to_vec();
    out.extend(
        [CATEGORY_COLUMN, DEDUCTIBLE_COLUMN, JUSTIFICATION_COLUMN]
            .iter()
            .map(|s| s.to_string()),
    );
    out
}

/// Original cells in input order (duplicate column names included), then
/// the classification columns.
fn record_values(expense: &CategorizedExpense) -> Vec<String> {
    let classification = expense.outcome.classification();
    let mut values: Vec<String> = expense
        .record
        .fields
        .iter()
        .map(|(_, value)| value.clone())
        .collect();
    values.push(classification.category.label().to_string());
    values.push(if classification.is_deductible { "True" } else { "False" }.to_string());
    values.push(classification.justification.clone());
    values
}

/// CSV / TSV 輸出：原始欄位 + Category / Is Deductible / Justification
pub fn write_delimited(result: &TransformResult, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(output_headers(&result.headers))?;
    for expense in &result.expenses {
        writer.write_record(record_values(expense))?;
    }

    writer
        .into_inner()
        .map_err(|e| CategorizerError::IoError(e.into_error()))
}

pub fn write_json(result: &TransformResult) -> Result<Vec<u8>> {
    let rows: Vec<serde_json::Value> = result
        .expenses
        .iter()
        .map(|expense| -> Result<serde_json::Value> {
            let mut obj = serde_json::Map::new();
            obj.insert("row_number".to_string(), expense.record.row_number.into());
            for (name, value) in &expense.record.fields {
                obj.insert(name.clone(), serde_json::Value::String(value.clone()));
            }
            let classification = serde_json::to_value(expense.outcome.classification())?;
            obj.insert("classification".to_string(), classification);
            Ok(serde_json::Value::Object(obj))
        })
        .collect::<Result<_>>()?;

    Ok(serde_json::to_vec_pretty(&rows)?)
}

fn failed_row_error(record: &ExpenseRecord, outcome: &RowOutcome) -> CategorizerError {
    CategorizerError::ProcessingError {
        message: format!(
            "Row {} failed, aborting: {}",
            record.row_number,
            outcome.classification().justification
        ),
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider, M: ChatModel + 'static> Pipeline for ExpensePipeline<S, C, M> {
    async fn extract(&self) -> Result<ExpenseBatch> {
        let input = self.config.input_path();
        tracing::info!("📂 Reading input CSV file: {}", input);

        let data = self.storage.read_file(input).await?;
        let batch = parse_expense_csv(&data)?;

        tracing::info!(
            "✓ Successfully read {} rows ({} columns) from {}",
            batch.len(),
            batch.headers.len(),
            input
        );
        Ok(batch)
    }

    async fn transform(&self, batch: ExpenseBatch) -> Result<TransformResult> {
        let ExpenseBatch { headers, records: data } = batch;
        let columns = self.config.columns().clone();
        let policy = self.config.row_error_policy();
        let limit = self.config.concurrent_requests().max(1);
        let total = data.len();

        tracing::info!(
            "🚀 Categorizing {} rows with model '{}' ({} concurrent)",
            total,
            self.categorizer.model().model_name(),
            limit
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for (index, record) in data.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CategorizerError::ProcessingError {
                    message: format!("Concurrency limiter closed: {}", e),
                })?;

            // 失敗旗標在釋放 permit 之前設定，取得 permit 後檢查即可
            if aborted.load(Ordering::SeqCst) {
                break;
            }

            tracing::info!("⏳ Processing row {}/{}...", index + 1, total);

            let categorizer = Arc::clone(&self.categorizer);
            let aborted = Arc::clone(&aborted);
            let columns = columns.clone();
            let record = record.clone();
            tasks.spawn(async move {
                let outcome = if aborted.load(Ordering::SeqCst) {
                    None
                } else {
                    let outcome = categorizer.categorize_record(&record, &columns).await;
                    if outcome.is_failed() && policy == RowErrorPolicy::Abort {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    Some(outcome)
                };
                drop(permit);
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<RowOutcome>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| CategorizerError::ProcessingError {
                message: format!("Categorization task failed: {}", e),
            })?;
            outcomes[index] = outcome;
        }

        if policy == RowErrorPolicy::Abort {
            if let Some((record, outcome)) = data
                .iter()
                .zip(outcomes.iter())
                .find_map(|(r, o)| o.as_ref().filter(|o| o.is_failed()).map(|o| (r, o)))
            {
                return Err(failed_row_error(record, outcome));
            }
        }

        let expenses: Vec<CategorizedExpense> = data
            .into_iter()
            .zip(outcomes)
            .map(|(record, outcome)| {
                outcome
                    .map(|outcome| CategorizedExpense { record, outcome })
                    .ok_or_else(|| CategorizerError::ProcessingError {
                        message: "Row was not processed".to_string(),
                    })
            })
            .collect::<Result<_>>()?;

        let summary = CategorizationSummary::from_expenses(&expenses);
        Ok(TransformResult {
            expenses,
            headers,
            summary,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();

        for format in self.config.output_formats() {
            match format.as_str() {
                "csv" => files.push((self.output_file("csv"), write_delimited(&result, b',')?)),
                "tsv" => files.push((self.output_file("tsv"), write_delimited(&result, b'\t')?)),
                "json" => {
                    files.push((self.output_file("json"), write_json(&result)?));
                    files.push((
                        format!("{}_summary.json", self.config.output_name()),
                        serde_json::to_vec_pretty(&result.summary)?,
                    ));
                }
                other => {
                    return Err(CategorizerError::InvalidConfigValueError {
                        field: "output.formats".to_string(),
                        value: other.to_string(),
                        reason: "Unsupported format. Valid formats: csv, tsv, json".to_string(),
                    })
                }
            }
        }

        if files.is_empty() {
            return Err(CategorizerError::ConfigError {
                message: "No output format configured".to_string(),
            });
        }

        if self.config.compress_output() {
            let zip_name = self.output_file("zip");
            tracing::debug!("Creating ZIP file with {} files", files.len());

            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &files {
                    zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
                    zip.write_all(data)?;
                }
                // 完成並取回底層 Vec<u8>
                let cursor = zip.finish()?;
                cursor.into_inner()
            };

            let location = self.output_location(&zip_name);
            tracing::debug!("Writing ZIP file ({} bytes) to {}", zip_data.len(), location);
            self.storage.write_file(&location, &zip_data).await?;
            return Ok(location);
        }

        let mut primary = None;
        for (name, data) in &files {
            let location = self.output_location(name);
            tracing::debug!("Writing {} ({} bytes)", location, data.len());
            self.storage.write_file(&location, data).await?;
            primary.get_or_insert(location);
        }

        primary.ok_or_else(|| CategorizerError::ProcessingError {
            message: "No output written".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ExpenseCategory, ExpenseClassification};
    use crate::domain::ports::ColumnMapping;
    use crate::prompt::PromptTemplate;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn with_input(path: &str, content: &str) -> Self {
            let mut files = HashMap::new();
            files.insert(path.to_string(), content.as_bytes().to_vec());
            Self {
                files: Arc::new(Mutex::new(files)),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                CategorizerError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct MockConfig {
        output_formats: Vec<String>,
        columns: ColumnMapping,
        concurrent_requests: usize,
        policy: RowErrorPolicy,
        compress: bool,
    }

    impl MockConfig {
        fn new() -> Self {
            Self {
                output_formats: vec!["csv".to_string()],
                columns: ColumnMapping::default(),
                concurrent_requests: 1,
                policy: RowErrorPolicy::Continue,
                compress: false,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn input_path(&self) -> &str {
            "input.csv"
        }

        fn output_path(&self) -> &str {
            "out"
        }

        fn output_name(&self) -> &str {
            "categorized_expenses"
        }

        fn output_formats(&self) -> &[String] {
            &self.output_formats
        }

        fn compress_output(&self) -> bool {
            self.compress
        }

        fn columns(&self) -> &ColumnMapping {
            &self.columns
        }

        fn concurrent_requests(&self) -> usize {
            self.concurrent_requests
        }

        fn row_error_policy(&self) -> RowErrorPolicy {
            self.policy
        }
    }

    /// 依商品名稱回覆；名稱含 "broken" 時回傳非 JSON
    struct KeywordModel {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl KeywordModel {
        fn new() -> Self {
            Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatModel for KeywordModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // 讓較早的列較慢完成，以驗證輸出順序
            if prompt.contains("- Product Name: Slow") {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            }
            if prompt.contains("- Product Name: broken") {
                return Ok("Sorry, I cannot help with that.".to_string());
            }
            if prompt.contains("- Product Name: Jeans") {
                return Ok(r#"{"category": "Potentially Personal / Non-Deductible", "is_deductible": false, "justification": "Everyday clothing."}"#.to_string());
            }
            Ok(r#"{"category": "Office Supplies & Software", "is_deductible": true, "justification": "Needed for operations."}"#.to_string())
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    const INPUT: &str = "Order ID,Product Name,Unit Price,Quantity,Order Date\n\
A1,Slow Printer Paper,12.50,4,2024-01-05\n\
A2,Jeans,59.99,1,2024-01-06\n\
A3,,3.00,1,2024-01-07\n\
A4,Stapler,8.00,2,01/08/2024\n";

    fn pipeline(config: MockConfig, input: &str) -> (ExpensePipeline<MockStorage, MockConfig, KeywordModel>, MockStorage) {
        let storage = MockStorage::with_input("input.csv", input);
        let categorizer = ExpenseCategorizer::new(
            PromptTemplate::default_expense().unwrap(),
            KeywordModel::new(),
            true,
        );
        (ExpensePipeline::new(storage.clone(), config, categorizer), storage)
    }

    #[test]
    fn test_parse_expense_csv_keeps_all_columns() {
        let batch = parse_expense_csv(INPUT.as_bytes()).unwrap();
        assert_eq!(batch.headers[0], "Order ID");
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.records[0].row_number, 1);
        assert_eq!(batch.records[0].fields[0], ("Order ID".to_string(), "A1".to_string()));
        assert_eq!(batch.records[2].get("Product Name"), None);
    }

    #[test]
    fn test_parse_expense_csv_pads_short_rows() {
        let batch = parse_expense_csv(b"Product Name,Unit Price,Quantity\nPens,2.00\n").unwrap();
        assert_eq!(batch.records[0].fields.len(), 3);
        assert_eq!(batch.records[0].get("Quantity"), None);
    }

    #[test]
    fn test_parse_expense_csv_requires_header() {
        assert!(parse_expense_csv(b"").is_err());
    }

    #[tokio::test]
    async fn test_transform_categorizes_skips_and_keeps_order() {
        let mut config = MockConfig::new();
        config.concurrent_requests = 4;
        let (pipeline, _) = pipeline(config, INPUT);

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();

        let categories: Vec<ExpenseCategory> = result
            .expenses
            .iter()
            .map(|e| e.outcome.classification().category)
            .collect();
        assert_eq!(
            categories,
            vec![
                ExpenseCategory::OfficeSuppliesSoftware,
                ExpenseCategory::PotentiallyPersonal,
                ExpenseCategory::Unknown,
                ExpenseCategory::OfficeSuppliesSoftware,
            ]
        );
        assert_eq!(result.expenses[0].record.row_number, 1);
        assert_eq!(result.expenses[3].record.row_number, 4);
        assert_eq!(pipeline.categorizer().model().calls.load(Ordering::SeqCst), 3);

        assert_eq!(result.summary.categorized, 3);
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(result.summary.deductible, 2);
        // 12.50*4 + 8.00*2
        assert_eq!(result.summary.deductible_total, rust_decimal::Decimal::new(6600, 2));
    }

    #[tokio::test]
    async fn test_transform_continue_policy_records_error_rows() {
        let input = "Product Name,Unit Price,Quantity,Order Date\nbroken widget,1.00,1,2024-01-01\nStapler,8.00,1,2024-01-02\n";
        let (pipeline, _) = pipeline(MockConfig::new(), input);

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();

        assert_eq!(result.expenses.len(), 2);
        assert_eq!(
            result.expenses[0].outcome.classification().category,
            ExpenseCategory::Error
        );
        assert_eq!(result.summary.errors, 1);
        assert_eq!(result.summary.categorized, 1);
    }

    #[tokio::test]
    async fn test_transform_abort_policy_stops_at_first_error() {
        let input = "Product Name,Unit Price,Quantity,Order Date\nbroken widget,1.00,1,2024-01-01\nStapler,8.00,1,2024-01-02\n";
        let mut config = MockConfig::new();
        config.policy = RowErrorPolicy::Abort;
        let (pipeline, _) = pipeline(config, input);

        let records = pipeline.extract().await.unwrap();
        let err = pipeline.transform(records).await.unwrap_err();

        assert!(matches!(err, CategorizerError::ProcessingError { .. }));
        assert!(err.to_string().contains("Row 1"));
        // 第二列不應再呼叫模型
        assert_eq!(pipeline.categorizer().model().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_writes_csv_with_appended_columns() {
        let (pipeline, storage) = pipeline(MockConfig::new(), INPUT);

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();
        let location = pipeline.load(result).await.unwrap();

        assert_eq!(location, "out/categorized_expenses.csv");
        let csv = String::from_utf8(storage.get_file(&location).await.unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Order ID,Product Name,Unit Price,Quantity,Order Date,Category,Is Deductible,Justification"
        );
        assert_eq!(
            lines[2],
            "A2,Jeans,59.99,1,2024-01-06,Potentially Personal / Non-Deductible,False,Everyday clothing."
        );
        assert_eq!(lines[3], "A3,,3.00,1,2024-01-07,Unknown,False,Missing product information");
        assert_eq!(lines.len(), 5);
    }

    #[tokio::test]
    async fn test_load_json_and_tsv_outputs() {
        let mut config = MockConfig::new();
        config.output_formats = vec!["tsv".to_string(), "json".to_string()];
        let (pipeline, storage) = pipeline(config, INPUT);

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();
        let location = pipeline.load(result).await.unwrap();
        assert_eq!(location, "out/categorized_expenses.tsv");

        let tsv = String::from_utf8(storage.get_file("out/categorized_expenses.tsv").await.unwrap()).unwrap();
        assert!(tsv.starts_with("Order ID\tProduct Name\t"));

        let json = storage.get_file("out/categorized_expenses.json").await.unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_slice(&json).unwrap();
        assert_eq!(rows.len(), 4);
        let classification: ExpenseClassification =
            serde_json::from_value(rows[1]["classification"].clone()).unwrap();
        assert_eq!(classification.category, ExpenseCategory::PotentiallyPersonal);
        assert_eq!(rows[1]["Order ID"], "A2");

        let summary = storage.get_file("out/categorized_expenses_summary.json").await.unwrap();
        let summary: serde_json::Value = serde_json::from_slice(&summary).unwrap();
        assert_eq!(summary["total_rows"], 4);
        assert_eq!(summary["skipped"], 1);
    }

    #[tokio::test]
    async fn test_load_compressed_bundle() {
        let mut config = MockConfig::new();
        config.output_formats = vec!["csv".to_string(), "json".to_string()];
        config.compress = true;
        let (pipeline, storage) = pipeline(config, INPUT);

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();
        let location = pipeline.load(result).await.unwrap();
        assert_eq!(location, "out/categorized_expenses.zip");

        let zip_bytes = storage.get_file(&location).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "categorized_expenses.csv",
                "categorized_expenses.json",
                "categorized_expenses_summary.json"
            ]
        );
    }

    #[tokio::test]
    async fn test_header_only_input_produces_header_only_output() {
        let (pipeline, storage) = pipeline(
            MockConfig::new(),
            "Order ID,Product Name,Unit Price,Quantity,Order Date,Vendor\n",
        );

        let records = pipeline.extract().await.unwrap();
        assert!(records.is_empty());
        let result = pipeline.transform(records).await.unwrap();
        let location = pipeline.load(result).await.unwrap();

        let csv = String::from_utf8(storage.get_file(&location).await.unwrap()).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Order ID,Product Name,Unit Price,Quantity,Order Date,Vendor,Category,Is Deductible,Justification"
        );
    }

    #[tokio::test]
    async fn test_duplicate_and_existing_category_columns_keep_their_own_values() {
        let input = "Note,Product Name,Unit Price,Quantity,Order Date,Note,Category\n\
first,Stapler,8.00,1,2024-01-02,second,old-label\n";
        let (pipeline, storage) = pipeline(MockConfig::new(), input);

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();
        let location = pipeline.load(result).await.unwrap();

        let csv = String::from_utf8(storage.get_file(&location).await.unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Note,Product Name,Unit Price,Quantity,Order Date,Note,Category,Category,Is Deductible,Justification"
        );
        assert!(
            lines[1].starts_with("first,Stapler,8.00,1,2024-01-02,second,old-label,Office Supplies & Software,True,"),
            "{}",
            lines[1]
        );
    }
}
