/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 订阅器
///
/// 读取 `RUST_LOG`，默认 `info`。重复调用不会报错（测试里会多次调用）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `model`: 使用的模型
/// - `max_concurrent`: 最大并发会话数
pub fn log_startup(model: &str, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 异议处理练习评分");
    info!("🤖 模型: {}", model);
    info!("📊 最大并发会话数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录练习加载信息
pub fn log_sessions_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待评分的练习会话", total);
    info!("📋 将以每批 {} 个的方式处理\n", max_concurrent);
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始会话编号
/// - `end`: 结束会话编号
/// - `total`: 会话总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批会话: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 批完成: 成功 {}/{}", batch_num, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `data_file`: 存储文件路径
pub fn print_final_stats(success: usize, failed: usize, total: usize, data_file: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n记录已保存至: {}", data_file);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
