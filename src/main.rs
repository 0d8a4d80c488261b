use clap::Parser;
use identhub_flow::adapters::{FixedAnswerAlerts, TracingPresenter};
use identhub_flow::config::cli::{CliArgs, Command};
use identhub_flow::utils::{
    logger::{self, LogFormat},
    validation::Validate,
};
use identhub_flow::{
    register_optional_modules, IdentHub, IdentificationMethod, IdentificationStep,
    ModuleRegistry, SdkConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = match SdkConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    let format = if config.json_logs() {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logger::init_logger(format, args.verbose || config.verbose());
    tracing::debug!("CLI args: {:?}", args);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    register_optional_modules(&ModuleRegistry::global());
    let hub = IdentHub::from_config(
        &config,
        Arc::new(TracingPresenter),
        Arc::new(FixedAnswerAlerts::new(true)),
    )?;

    match args.command {
        Command::Plan {
            first_step,
            fallback_step,
        } => {
            let method = IdentificationMethod::new(first_step, fallback_step);
            if !print_plan(&hub, &method) {
                std::process::exit(2);
            }
        }
        Command::FetchMethod => match hub.load_identification_method().await {
            Ok(method) => {
                if !print_plan(&hub, &method) {
                    std::process::exit(2);
                }
            }
            Err(e) => {
                tracing::error!("❌ Could not load identification method: {}", e);
                eprintln!("❌ {}", e.user_friendly_message());
                eprintln!("💡 {}", e.recovery_suggestion());
                std::process::exit(1);
            }
        },
        Command::ClearData => {
            let report = hub.clear_all_data();
            if report.is_complete() {
                println!("🧹 All module data cleared");
            } else {
                for (module, message) in &report.failed {
                    eprintln!("⚠️ {}: {}", module, message);
                }
                eprintln!("❌ Some module data could not be cleared");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// 印出驗證方式需要的模組，回傳這個建置能否執行
fn print_plan(hub: &IdentHub, method: &IdentificationMethod) -> bool {
    println!(
        "📋 First step: {}, fallback: {}, retries: {}",
        method.first_step,
        method
            .fallback_step
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string()),
        method.retries
    );

    let mut supported = std::iter::once(method.first_step)
        .chain(method.fallback_step)
        .all(|step| step != IdentificationStep::Unspecified);

    for module in method.required_modules() {
        let available = hub.resolver().is_available(module);
        println!("  {} {}", if available { "✅" } else { "❌" }, module);
        supported &= available;
    }

    if supported {
        println!("✅ This build can run the identification method");
    } else {
        println!("❌ This build cannot run the identification method");
    }
    supported
}
