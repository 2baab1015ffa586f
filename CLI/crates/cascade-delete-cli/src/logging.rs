//! 構造化ログの初期化。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// init_logger は tracing-subscriber を初期化する。
/// RUST_LOG が設定されていればそれを、なければ level をフィルタに使う。
/// format が "text" の場合はプレーンテキスト出力、それ以外は JSON 出力。
/// ログは標準エラーに出力し、標準出力はスクリプト出力に使う。
pub fn init_logger(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "text" {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
