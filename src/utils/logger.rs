use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日誌輸出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 終端機閱讀用的精簡格式
    Compact,
    /// 嵌入式宿主收集日誌用
    Json,
}

fn sdk_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("identhub_flow=debug,info")
        } else {
            EnvFilter::new("identhub_flow=info")
        }
    })
}

/// `RUST_LOG` 有設定時優先於 `verbose`
pub fn init_logger(format: LogFormat, verbose: bool) {
    let registry = tracing_subscriber::registry().with(sdk_filter(verbose));
    let layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => registry.with(layer.with_target(false).compact()).init(),
        LogFormat::Json => registry.with(layer.with_target(true).json()).init(),
    }
}
