//! Cardsync CLI
//!
//! 把 ez Share WiFi SD 卡上的文件镜像到本地目录：
//! - `nowifi`: 主机已连在卡上，只下载
//! - `once`: 依次加入每张可见的卡，下载后恢复原网络
//! - `poll`: 循环执行 `once`

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

use cardsync_core::{
    HttpCardClient, NetworkAdapter, NmNetworkAdapter, NoNetwork, SyncMode, SyncOrchestrator,
    SyncReport, SyncSettings,
};

#[derive(Parser)]
#[command(
    name = "cardsync",
    version,
    about = "Mirror ez Share WiFi SD cards to a local directory"
)]
struct Cli {
    /// 运行模式
    #[arg(short, long, value_enum, required_unless_present = "list")]
    mode: Option<Mode>,
    /// 目标根目录 (覆盖配置文件中的 destination)
    #[arg(short, long)]
    dest: Option<PathBuf>,
    /// 列出可见的卡网络后退出
    #[arg(short, long)]
    list: bool,
    /// 配置文件 (默认: ~/.config/cardsync/settings.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// 不切换网络
    Nowifi,
    /// 处理可见的卡一次
    Once,
    /// 持续轮询
    Poll,
}

impl From<Mode> for SyncMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Nowifi => SyncMode::NoWifi,
            Mode::Once => SyncMode::Once,
            Mode::Poll => SyncMode::Poll,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = match &cli.config {
        Some(path) => SyncSettings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => SyncSettings::load(),
    };
    if let Some(dest) = cli.dest {
        settings.destination = dest;
    }

    let client = Arc::new(
        HttpCardClient::from_settings(&settings).context("Invalid card connection settings")?,
    );

    if cli.list {
        let network = connect_network_manager(&settings).await?;
        let sync = SyncOrchestrator::new(network, client, &settings);
        let cards = sync.list_cards().await.context("Failed to scan for cards")?;
        if cards.is_empty() {
            println!("No cards found");
        }
        for card in cards {
            println!("{}  ->  {}", card, settings.destination.join(card.suffix()).display());
        }
        return Ok(());
    }

    let mode = SyncMode::from(cli.mode.context("--mode is required")?);
    tracing::info!(
        "Cardsync starting ({:?}), destination: {}",
        mode,
        settings.destination.display()
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let report = match mode {
        SyncMode::NoWifi => run(NoNetwork, client, &settings, mode, &interrupted).await?,
        SyncMode::Once | SyncMode::Poll => {
            let network = connect_network_manager(&settings).await?;
            run(network, client, &settings, mode, &interrupted).await?
        }
    };

    print_summary(&report);

    if interrupted.load(Ordering::SeqCst) {
        println!("Bye!");
        return Ok(());
    }
    if report.has_failures() {
        bail!("Some files could not be synced");
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    // 桥接 log crate（cardsync-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default_filter = if verbose {
        "debug"
    } else {
        "info,cardsync_core=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}

async fn connect_network_manager(settings: &SyncSettings) -> Result<NmNetworkAdapter> {
    NmNetworkAdapter::connect(settings)
        .await
        .context("Failed to connect to NetworkManager over D-Bus")
}

async fn run<N: NetworkAdapter>(
    network: N,
    client: Arc<HttpCardClient>,
    settings: &SyncSettings,
    mode: SyncMode,
    interrupted: &AtomicBool,
) -> Result<SyncReport> {
    let mut sync = SyncOrchestrator::new(network, client, settings);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        interrupted.store(true, Ordering::SeqCst);
    };

    sync.run_until(mode, shutdown)
        .await
        .context("Card discovery failed")
}

fn print_summary(report: &SyncReport) {
    for card in &report.cards {
        let name = card
            .card
            .as_ref()
            .map_or_else(|| "(current network)".to_string(), ToString::to_string);
        println!("{}: {} ({})", name, card.status, card.destination.display());
    }
    if report.cards.len() > 1 {
        println!("Total: {}", report.totals());
    }
}
