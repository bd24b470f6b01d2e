use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use time::{UtcOffset, macros::format_description};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt};

use crate::algod::{AlgodClient, HttpAlgodClient, RetryPolicy, RetryingClient};
use crate::cli::args::{InitCmd, SubmitArgs};
use crate::config::{HarnessConfig, LoggingConfig, LoggingProfile, NodeConfig};
use crate::ops::OperationContext;
use crate::signer::Account;

/// 初始化 tracing，兼顾 JSON 与文本输出模式。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if matches!(config.profile, LoggingProfile::Lean) {
        const QUIET_TARGETS: &[(&str, &str)] = &[
            ("hyper", "warn"),
            ("hyper_util::client::legacy", "warn"),
            ("reqwest", "info"),
            ("algod::http", "info"),
        ];
        for (module, level) in QUIET_TARGETS {
            if !config.level.contains(module) {
                if let Ok(directive) = format!("{module}={level}").parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }
    }

    if matches!(config.profile, LoggingProfile::Verbose) {
        const VERBOSE_TARGETS: &[(&str, &str)] = &[
            ("algod::http", "debug"),
            ("submit", "debug"),
            ("simulate", "debug"),
            ("monitoring::submit", "info"),
        ];
        for (module, level) in VERBOSE_TARGETS {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let time_format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::from_hms(config.timezone_offset_hours, 0, 0).map_err(|err| {
        anyhow!(
            "invalid logging timezone offset {}: {err}",
            config.timezone_offset_hours
        )
    })?;
    let offset_timer = OffsetTime::new(offset, time_format);

    let base = fmt()
        .with_timer(offset_timer)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .with_level(true);

    if config.json {
        base.json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    } else {
        base.with_env_filter(filter)
            .event_format(fmt::format().compact())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }
    Ok(())
}

/// 带重试的节点客户端；广播与等待区块不重试。
pub fn build_algod_client(node: &NodeConfig) -> Result<Arc<dyn AlgodClient>> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(node.request_timeout_ms))
        .build()
        .map_err(|err| anyhow!("构建 HTTP 客户端失败: {err}"))?;
    let client = HttpAlgodClient::new(http, node)?;
    info!(
        target: "algod",
        address = %node.address,
        auth_header = node.auth_header.as_str(),
        retry_attempts = node.retry_attempts,
        "节点客户端已就绪"
    );
    Ok(Arc::new(RetryingClient::new(
        client,
        RetryPolicy::from_config(node),
    )))
}

/// Ctrl+C 触发取消；已广播的交易结果保持未决。
pub fn install_cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!(target: "cli", "收到终止信号，取消进行中的操作");
                trigger.cancel();
            }
            Err(err) => warn!(target: "cli", error = %err, "捕获 Ctrl+C 失败"),
        }
    });
    cancel
}

pub fn build_operation_context(
    client: Arc<dyn AlgodClient>,
    config: HarnessConfig,
    submit: &SubmitArgs,
    cancel: CancellationToken,
) -> OperationContext {
    OperationContext::new(client, Arc::new(config))
        .with_simulation(submit.simulation_mode())
        .with_cancel(cancel)
        .with_timeout(submit.timeout_secs.map(Duration::from_secs))
}

const TEMPLATE_ACCOUNTS: [&str; 4] = ["creator", "lender", "borrower", "reserve"];

pub fn init_configs(args: InitCmd) -> Result<()> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    fs::create_dir_all(&output_dir)?;

    let mut template =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/jina.example.toml")).to_string();
    if args.generate_accounts {
        for name in TEMPLATE_ACCOUNTS {
            let account = Account::generate();
            template = template.replacen(
                &format!("{name} = \"\""),
                &format!("{name} = \"{}\"", account.export_seed().as_str()),
                1,
            );
            println!("{name}: {}", account.address());
        }
    }
    let templates: [(&str, &str); 1] = [("jina.toml", template.as_str())];

    for (filename, contents) in templates {
        let target_path = output_dir.join(filename);
        if target_path.exists() && !args.force {
            println!(
                "跳过 {}（文件已存在，如需覆盖请加 --force）",
                target_path.display()
            );
            continue;
        }

        fs::write(&target_path, contents)?;
        println!("已写入 {}", target_path.display());
    }

    Ok(())
}
