use clap::Parser;
use expense_categorizer::core::{ConfigProvider, Pipeline};
use expense_categorizer::utils::error::{CategorizerError, ErrorSeverity};
use expense_categorizer::utils::{logger, validation::Validate};
use expense_categorizer::{
    CategorizerEngine, CliConfig, ExpenseCategorizer, ExpensePipeline, LocalStorage, OllamaClient,
    PromptTemplate, TomlConfig,
};

#[tokio::main]
async fn main() {
    // .env 不存在時忽略
    let _ = dotenvy::dotenv();

    let cli = CliConfig::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(exit_code(&e));
        }
    };

    // 初始化日誌
    if config.monitoring.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting expense-categorizer");
    if cli.verbose {
        tracing::debug!("Resolved config: {:?}", config);
    }

    if let Err(e) = run(&cli, config).await {
        tracing::error!(
            "❌ Expense categorization failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        let code = exit_code(&e);
        if code > 0 {
            std::process::exit(code);
        }
    }
}

async fn run(cli: &CliConfig, config: TomlConfig) -> Result<(), CategorizerError> {
    // 驗證配置
    config.validate()?;

    let template = match &config.prompt.file {
        Some(path) => {
            tracing::info!("📝 Loading prompt template from {}", path);
            PromptTemplate::from_file(path)?
        }
        None => PromptTemplate::default_expense()?,
    };
    template.validate_expense_template()?;

    let client = OllamaClient::new(config.llm.clone())?;
    let monitor_enabled = config.monitoring.enabled;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let categorizer =
        ExpenseCategorizer::new(template, client.clone(), config.processing.strict_categories);
    let pipeline = ExpensePipeline::new(LocalStorage::current_dir(), config, categorizer);

    if cli.dry_run {
        return dry_run(&pipeline).await;
    }

    if cli.skip_health_check {
        tracing::warn!("⚠️ Skipping Ollama health check");
    } else {
        client.health_check().await?;
    }

    // 創建引擎並運行
    let engine = CategorizerEngine::new_with_monitoring(pipeline, monitor_enabled);
    let output_path = engine.run().await?;

    println!("✅ Expense categorization completed successfully!");
    println!("📁 Output saved to: {}", output_path);
    Ok(())
}

/// Prints the rendered prompt for every row without contacting the model.
async fn dry_run(
    pipeline: &ExpensePipeline<LocalStorage, TomlConfig, OllamaClient>,
) -> Result<(), CategorizerError> {
    let batch = pipeline.extract().await?;
    let columns = pipeline.config().columns();
    tracing::info!("🧪 Dry run: rendering {} prompts", batch.len());

    for record in &batch.records {
        match pipeline.categorizer().render_record(record, columns)? {
            Some(prompt) => {
                println!("===== Row {} =====", record.row_number);
                println!("{}", prompt);
            }
            None => println!("===== Row {} ===== (skipped: missing product name)", record.row_number),
        }
    }
    Ok(())
}

/// 根據錯誤嚴重程度決定退出碼
fn exit_code(e: &CategorizerError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}
