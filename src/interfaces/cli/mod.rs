/// CLI Interface Module
///
/// Command-line entry point: resolves the engine configuration (JSON file,
/// then flag overrides), initialises logging and runs a simulated session
/// end to end.
///
/// ## Responsibilities
/// - Parse command-line arguments
/// - Load and validate `EngineConfig`
/// - Start the line handler session against the configured engine
/// - Drive a demo order flow and print a summary

use crate::application::completion::RecordingCompletionHandler;
use crate::application::line_handler::{
    LineHandler, LineHandlerCommand, LineHandlerEngineRegistry, LoggingExceptionHandler,
};
use crate::application::updates::{ChannelSequencers, ChannelSubscriber, OrderUpdateEventProducer};
use crate::domain::market::MarketOrderBook;
use crate::domain::request::OrderRequest;
use crate::infrastructure::persistence::{InMemoryOrderTradePersister, PersistingUpdateHandler};
use crate::shared::config::{EngineConfig, PositionConfig};
use crate::shared::error::EngineError;
use crate::shared::metrics::METRICS;
use crate::shared::timestamp::{SystemTimer, TimerService};
use crate::shared::types::{Owner, Price, SecSid, Side};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Security used by the demo session
const DEMO_SEC_SID: SecSid = 1;
const DEMO_OWNER: Owner = Owner(1);
/// Inventory seeded for the demo security when the configuration has none
const DEMO_POSITION: i64 = 1_000;

/// 订单引擎命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "order-engine")]
#[command(version = "0.1.0")]
#[command(about = "订单管理与撮合核心", long_about = None)]
pub struct CliConfig {
    /// JSON 配置文件（缺省使用内置默认值）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 覆盖 line_handler.engine
    #[arg(short, long)]
    pub engine: Option<String>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// 将执行器、line handler、撮合消费者线程绑定到 CPU 核心
    #[arg(long, default_value_t = false)]
    pub cpu_affinity: bool,

    /// 演示会话提交的订单数量
    #[arg(short = 'n', long, default_value_t = 10)]
    pub demo_orders: usize,

    /// 仅打印生效配置，不启动会话
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

/// Counts collected from one demo session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoReport {
    pub completions: BTreeMap<&'static str, usize>,
    pub events: BTreeMap<&'static str, usize>,
    pub persisted_orders: usize,
    pub persisted_trades: usize,
    pub failed_at_shutdown: usize,
}

/// Runs the CLI application
pub fn run() -> Result<(), EngineError> {
    let cli = CliConfig::parse();
    init_logging(&cli.log_level);

    let config = resolve_config(&cli)?;
    tracing::info!(engine = %config.line_handler.engine, cpus = num_cpus::get(), "订单引擎启动");

    println!("========================================");
    println!("  order-engine v0.1.0");
    println!("========================================");
    println!("引擎:         {}", config.line_handler.engine);
    println!("通道:         {}", config.line_handler.channel_id);
    println!("限流池:       {}", config.throttles.len().max(1));
    println!("撮合模式:     {}", if config.matching.fill_or_kill { "FOK" } else { "resting" });
    println!("CPU亲和性:    {}", if cli.cpu_affinity { "启用" } else { "禁用" });
    println!("演示订单:     {}", cli.demo_orders);
    println!("========================================");

    if cli.dry_run {
        let rendered = serde_json::to_string_pretty(&config).map_err(|e| EngineError::Config(e.to_string()))?;
        println!("\nDry-run 模式 - 生效配置:\n{}", rendered);
        return Ok(());
    }

    let report = run_demo(&config, cli.demo_orders)?;
    println!("\n完成回调:");
    for (name, count) in &report.completions {
        println!("  {:<28} {}", name, count);
    }
    println!("更新事件:");
    for (name, count) in &report.events {
        println!("  {:<28} {}", name, count);
    }
    println!("持久化:       {} orders, {} trades", report.persisted_orders, report.persisted_trades);
    if report.failed_at_shutdown > 0 {
        println!("关闭时失败:   {}", report.failed_at_shutdown);
    }
    tracing::debug!(metrics = %METRICS.export(), "session metrics");
    Ok(())
}

/// Loads the file (if any), applies flag overrides, validates
pub fn resolve_config(cli: &CliConfig) -> Result<EngineConfig, EngineError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(engine) = &cli.engine {
        config.line_handler.engine = engine.clone();
    }

    if cli.cpu_affinity {
        let cores = num_cpus::get().max(1);
        config.executor.cpu_core.get_or_insert(0);
        config.line_handler.cpu_core.get_or_insert(1 % cores);
        config.matching.consumer_cpu_core.get_or_insert(2 % cores);
    }

    config.validate()?;
    Ok(config)
}

/// Runs a simulated session: recovery, one depth snapshot, `orders` alternating buys and sells
pub fn run_demo(config: &EngineConfig, orders: usize) -> Result<DemoReport, EngineError> {
    let mut config = config.clone();
    let positions = &mut config.line_handler.simulated.positions;
    if !positions.iter().any(|p| p.sec_sid == DEMO_SEC_SID) {
        tracing::info!(sec_sid = DEMO_SEC_SID, quantity = DEMO_POSITION, "seeding demo position");
        positions.push(PositionConfig {
            sec_sid: DEMO_SEC_SID,
            quantity: DEMO_POSITION,
        });
    }

    let timer: Arc<dyn TimerService> = Arc::new(SystemTimer::new());
    let sequencers = ChannelSequencers::new();
    // 持久化在发布之后，成交已带通道序号
    let persister = InMemoryOrderTradePersister::new();
    let mut producer = OrderUpdateEventProducer::new(
        sequencers.get_or_create(config.line_handler.channel_id),
        Arc::clone(&timer),
    )
    .with_downstream(Box::new(PersistingUpdateHandler::new(persister.clone())));
    let (subscriber, events) = ChannelSubscriber::new();
    producer.subscribe(Box::new(subscriber));

    let session = LineHandler::start(
        &config,
        &LineHandlerEngineRegistry::default(),
        Arc::clone(&timer),
        RecordingCompletionHandler::default(),
        Box::new(producer),
        Box::new(LoggingExceptionHandler),
    )?;

    let recovered = futures::executor::block_on(session.start_recovery()).map_err(|_| EngineError::Shutdown)?;
    recovered?;

    let book = demo_book()?;
    session.apply(LineHandlerCommand::MarketDepth {
        timestamp: timer.nano_of_day(),
        book,
    })?;

    for index in 0..orders {
        let (side, price) = demo_order(index);
        let request = OrderRequest::new_order(index as u64 + 1, DEMO_OWNER, DEMO_SEC_SID, side, price, 10);
        session.submit(request)?;
    }
    session.apply(LineHandlerCommand::TradeTick {
        timestamp: timer.nano_of_day(),
    })?;

    let summary = session.shutdown()?;

    let mut report = DemoReport {
        failed_at_shutdown: summary.failed_at_shutdown,
        ..DemoReport::default()
    };
    for (_, name) in &summary.completions.events {
        *report.completions.entry(*name).or_default() += 1;
    }
    for event in events.try_iter() {
        *report.events.entry(event.body.name()).or_default() += 1;
    }
    let records = persister.snapshot();
    report.persisted_orders = records.orders.len();
    report.persisted_trades = records.trades.len();

    tracing::info!(
        orders,
        trades = report.persisted_trades,
        clear = summary.engine.is_clear(),
        "demo session finished"
    );
    Ok(report)
}

fn demo_book() -> Result<MarketOrderBook, EngineError> {
    let bids: Vec<(Price, i64)> = (0..5).map(|i| (99 - i, 100)).collect();
    let asks: Vec<(Price, i64)> = (0..5).map(|i| (101 + i, 100)).collect();
    MarketOrderBook::from_levels(DEMO_SEC_SID, &bids, &asks).map_err(|e| EngineError::Unexpected(e.to_string()))
}

/// Even orders lift the offer, odd orders hit the bid
fn demo_order(index: usize) -> (Side, Price) {
    let step = (index % 3) as Price;
    if index % 2 == 0 {
        (Side::Buy, 101 + step)
    } else {
        (Side::Sell, 99 - step)
    }
}

/// 初始化日志系统
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
