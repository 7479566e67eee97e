use anyhow::Result;
use notarial_batch::utils::logging;
use notarial_batch::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env()?;

    // 初始化并运行应用
    let report = App::initialize(config).await?.run().await?;

    std::process::exit(report.exit_code());
}
