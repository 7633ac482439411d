//! 练习记录：单轮 Attempt 与 5 轮 Session
//!
//! 两者都是只追加的记录，创建后不再修改。

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::grade::GradeResult;

/// 每个会话固定的轮数
pub const ROUNDS: usize = 5;

/// 会话里保留的失败标签数量
pub const SESSION_TOP_TAGS: usize = 5;

/// 标签计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// 按出现次数降序取前 `limit` 个标签，次数相同按首次出现顺序
pub fn top_tags<'a, I>(tags: I, limit: usize) -> Vec<TagCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<TagCount> = Vec::new();
    for tag in tags {
        match counts.iter_mut().find(|c| c.tag == tag) {
            Some(entry) => entry.count += 1,
            None => counts.push(TagCount {
                tag: tag.to_string(),
                count: 1,
            }),
        }
    }
    // sort_by 是稳定排序，保留首次出现顺序
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// 单轮评分记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub team_id: String,
    pub rep_id: String,
    pub rep_name: String,
    /// ISO 8601 (UTC)
    pub created_at: String,
    pub market: String,
    pub scenario_id: String,
    /// 0-100
    pub score: u8,
    #[serde(default)]
    pub fail_tags: Vec<String>,
    pub duration_sec: u32,
}

/// 由评分结果构建 Attempt 时需要的上下文
#[derive(Debug, Clone)]
pub struct AttemptMeta {
    pub team_id: String,
    pub rep_id: String,
    pub rep_name: String,
    pub market: String,
    pub scenario_id: String,
    pub duration_sec: u32,
}

impl Attempt {
    /// 失败标签取自 primary_failure.code
    pub fn from_grade(meta: AttemptMeta, grade: &GradeResult) -> Self {
        Self {
            id: new_id("att"),
            team_id: meta.team_id,
            rep_id: meta.rep_id,
            rep_name: meta.rep_name,
            created_at: Utc::now().to_rfc3339(),
            market: meta.market,
            scenario_id: meta.scenario_id,
            score: grade.overall_score,
            fail_tags: grade.fail_tags(),
            duration_sec: meta.duration_sec.max(1),
        }
    }

    /// createdAt 的日期部分 (YYYY-MM-DD)
    pub fn day(&self) -> &str {
        self.created_at.get(..10).unwrap_or(&self.created_at)
    }
}

/// 5 轮练习的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub team_id: String,
    pub rep_id: String,
    pub rep_name: String,
    pub started_at: String,
    pub ended_at: String,
    pub rounds: usize,
    /// 各轮分数均值（四舍五入）
    pub session_score: u8,
    pub top_fail_tags: Vec<TagCount>,
}

impl Session {
    /// 由恰好 ROUNDS 个 Attempt 构建会话
    pub fn from_attempts(started_at: impl Into<String>, attempts: &[Attempt]) -> AppResult<Self> {
        if attempts.len() != ROUNDS {
            return Err(AppError::validation(format!(
                "一个会话需要 {} 轮，实际 {} 轮",
                ROUNDS,
                attempts.len()
            )));
        }
        let first = &attempts[0];
        if attempts
            .iter()
            .any(|a| a.rep_id != first.rep_id || a.team_id != first.team_id)
        {
            return Err(AppError::validation("会话中的所有轮次必须属于同一名销售"));
        }

        let total: u32 = attempts.iter().map(|a| u32::from(a.score)).sum();
        let session_score = (total as f64 / attempts.len() as f64).round() as u8;

        let top_fail_tags = top_tags(
            attempts
                .iter()
                .flat_map(|a| a.fail_tags.iter().map(String::as_str)),
            SESSION_TOP_TAGS,
        );

        Ok(Self {
            id: new_id("ses"),
            team_id: first.team_id.clone(),
            rep_id: first.rep_id.clone(),
            rep_name: first.rep_name.clone(),
            started_at: started_at.into(),
            ended_at: Utc::now().to_rfc3339(),
            rounds: ROUNDS,
            session_score,
            top_fail_tags,
        })
    }
}
