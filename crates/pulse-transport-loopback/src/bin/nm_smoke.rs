//! 进程内冒烟运行的二进制入口。
//!
//! # 教案式说明
//! - **How**：可选环境变量 `PULSE_CONFIG` 指向一份 TOML 配置，缺省使用内置默认值；
//!   日志级别由 `RUST_LOG` 控制，缺省为 `info`；
//! - **失败策略**：任何致命错误经 `fail_fast` 记录后中止进程；调用未得到应答时以退出码 1 结束。

use std::env;
use std::fs;
use std::process::ExitCode;

use pulse_core::{PulseConfig, PulseError, RoleReport, fail_fast};
use pulse_transport_loopback::smoke::{SMOKE, run_smoke};
use pulse_transport_loopback::{LoopbackConfig, LoopbackFabric, LoopbackTransport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const CONFIG_ENV: &str = "PULSE_CONFIG";

fn main() -> ExitCode {
    install_tracing();
    let config = fail_fast(load_config());

    let transport = LoopbackTransport::new(LoopbackFabric::new(), LoopbackConfig::default());
    let report = fail_fast(run_smoke(&transport, &config));
    summarize(&report.responder);
    summarize(&report.initiator);

    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        warn!(target: SMOKE, outcome = ?report.initiator.outcome, "initiator did not receive a reply");
        ExitCode::FAILURE
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复安装只会发生在嵌入场景，忽略即可。
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init();
}

fn load_config() -> pulse_core::Result<PulseConfig> {
    let Some(path) = env::var_os(CONFIG_ENV) else {
        return Ok(PulseConfig::default());
    };
    let text = fs::read_to_string(&path).map_err(|err| {
        PulseError::Config(format!("cannot read {}: {err}", path.to_string_lossy()))
    })?;
    let config = PulseConfig::from_toml_str(&text)?;
    info!(target: SMOKE, path = %path.to_string_lossy(), "configuration loaded");
    Ok(config)
}

fn summarize(report: &RoleReport) {
    info!(
        target: SMOKE,
        role = report.role,
        procedure = %report.procedure,
        calls_served = report.calls_served,
        replies_sent = report.replies_sent,
        grace = ?report.grace,
        cycles = report.poller.cycles,
        completions = report.poller.completions,
        "role summary"
    );
}
