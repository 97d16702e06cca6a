use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xshell::{Shell, cmd};

/// systemd 用户服务文件名
const SERVICE: &str = "cardsync.service";

#[derive(Parser)]
#[command(name = "xtask", about = "Cardsync 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建 cardsync (release)
    Build,
    /// 以调试日志运行一次同步 (开发模式)
    Dev {
        /// 运行模式 (nowifi, once, poll)
        #[arg(short, long, default_value = "once")]
        mode: String,
        /// 目标目录 (默认 /tmp/cardsync-dev)
        #[arg(short, long)]
        dest: Option<String>,
    },
    /// 安装为 systemd 用户服务 (poll 模式)
    Install,
    /// 卸载 systemd 用户服务
    Uninstall,
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR")
        .ok()
        .and_then(|p| PathBuf::from(p).parent().map(PathBuf::from))
    {
        Some(root) => root,
        None => std::env::current_dir().context("Cannot determine project root")?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Dev { mode, dest } => dev(&sh, &mode, dest)?,
        Commands::Install => install(&sh)?,
        Commands::Uninstall => uninstall(&sh)?,
        Commands::Dist => dist(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建 cardsync...");
    cmd!(sh, "cargo build --release -p cardsync-cli").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn dev(sh: &Shell, mode: &str, dest: Option<String>) -> Result<()> {
    let dest = dest.unwrap_or_else(|| "/tmp/cardsync-dev".to_string());

    println!("🚀 开发模式运行 cardsync...");
    println!("   模式: {}", mode);
    println!("   目标目录: {}", dest);
    println!();

    let _env = sh.push_env("RUST_LOG", "debug,cardsync_core=debug,zbus=info,reqwest=info");
    cmd!(sh, "cargo run -p cardsync-cli -- --mode {mode} --dest {dest}").run()?;
    Ok(())
}

fn user_unit_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".config/systemd/user"))
}

fn install(sh: &Shell) -> Result<()> {
    println!("📦 安装 Cardsync 服务...");

    // 构建
    build(sh)?;

    // 先停止已运行的服务（如果存在）
    println!("⏹️  停止现有服务...");
    let _ = cmd!(sh, "systemctl --user stop {SERVICE}").run();

    // 复制二进制文件
    println!("📋 复制二进制文件...");
    cmd!(sh, "sudo cp target/release/cardsync /usr/local/bin/").run()?;

    // 复制 systemd 服务文件
    let unit_dir = user_unit_dir()?;
    sh.create_dir(&unit_dir)?;
    sh.copy_file(format!("assets/{SERVICE}"), &unit_dir)?;

    // 启用并启动服务
    cmd!(sh, "systemctl --user daemon-reload").run()?;
    cmd!(sh, "systemctl --user enable --now {SERVICE}").run()?;

    println!("✅ 服务安装完成");
    println!("   使用 'cardsync --help' 查看命令");
    println!("   使用 'systemctl --user status cardsync' 查看服务状态");
    println!("   使用 'journalctl --user -u cardsync -f' 查看日志");
    Ok(())
}

fn uninstall(sh: &Shell) -> Result<()> {
    println!("🗑️  卸载 Cardsync 服务...");

    // 停止并禁用服务
    let _ = cmd!(sh, "systemctl --user stop {SERVICE}").run();
    let _ = cmd!(sh, "systemctl --user disable {SERVICE}").run();

    // 删除文件
    let unit = user_unit_dir()?.join(SERVICE);
    let _ = sh.remove_path(&unit);
    let _ = cmd!(sh, "sudo rm /usr/local/bin/cardsync").run();

    cmd!(sh, "systemctl --user daemon-reload").run()?;

    println!("✅ 卸载完成");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("cardsync-{}-linux-x86_64", version);

    cmd!(sh, "mkdir -p dist/{dist_name}").run()?;
    cmd!(sh, "cp target/release/cardsync dist/{dist_name}/").run()?;
    cmd!(sh, "cp assets/{SERVICE} dist/{dist_name}/").run()?;
    if sh.path_exists("README.md") {
        cmd!(sh, "cp README.md dist/{dist_name}/").run()?;
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czvf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{}.tar.gz", dist_name);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages cardsync-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    cmd!(sh, "rm -rf dist").run()?;
    println!("✅ 清理完成");
    Ok(())
}
