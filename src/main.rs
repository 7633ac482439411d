use std::path::Path;

use anyhow::Result;
use objection_coach::{utils::logging, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置：可选的 TOML 路径作为第一个参数
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_toml_file(Path::new(&path))?,
        None => Config::from_env(),
    };

    // 初始化并运行应用
    let _report = App::initialize(config).await?.run().await?;

    Ok(())
}
