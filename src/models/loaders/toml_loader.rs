use crate::models::practice::PracticeSession;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载一个练习会话
pub async fn load_practice_session(toml_file_path: &Path) -> Result<PracticeSession> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut session: PracticeSession = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    // 设置文件路径
    session.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(session)
}

/// 从文件夹中加载所有练习会话
///
/// 解析失败或轮数不完整的文件会被跳过并记录警告
pub async fn load_all_practice_files(folder_path: &str) -> Result<Vec<PracticeSession>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    // read_dir 顺序不稳定
    paths.sort();

    let mut sessions = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_practice_session(&path).await {
            Ok(session) if session.is_complete() => {
                tracing::info!(
                    "成功加载 {} 轮练习 (销售: {})",
                    session.rounds.len(),
                    session.rep_name
                );
                sessions.push(session);
            }
            Ok(session) => {
                tracing::warn!(
                    "跳过 {}: 需要 {} 轮，实际 {} 轮",
                    path.display(),
                    crate::models::attempt::ROUNDS,
                    session.rounds.len()
                );
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(sessions)
}
