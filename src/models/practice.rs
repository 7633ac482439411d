use serde::{Deserialize, Serialize};

use crate::models::attempt::ROUNDS;
use crate::models::grade::GradeRequest;

/// 练习文件中的一轮
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeRound {
    /// 异议场景 ID
    pub scenario_id: String,
    /// 房主的异议
    pub objection: String,
    /// 销售的回答
    pub response: String,
    /// 本轮用时（秒）
    #[serde(default)]
    pub duration_sec: u32,
    /// 覆盖会话级别的场景描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// 一个练习会话（对应一个 TOML 文件）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeSession {
    pub rep_id: String,
    pub rep_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    /// 默认场景描述
    pub context: String,
    pub rounds: Vec<PracticeRound>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl PracticeSession {
    /// 轮数是否完整
    pub fn is_complete(&self) -> bool {
        self.rounds.len() == ROUNDS
    }

    /// 为某一轮构建评分请求
    ///
    /// seed 由团队 / 销售 / 轮次拼出，重复提交同一文件时措辞仍会变化
    pub fn grade_request(&self, round_index: usize, team_id: &str) -> Option<GradeRequest> {
        let round = self.rounds.get(round_index)?;
        let context = round.context.clone().unwrap_or_else(|| self.context.clone());
        let seed = format!(
            "{}-{}-{}-{}",
            team_id,
            self.rep_id,
            round_index + 1,
            chrono::Utc::now().timestamp_millis()
        );

        let mut request =
            GradeRequest::new(&round.objection, context, &round.response).with_seed(seed);
        if let Some(market) = &self.market {
            request = request.with_market(market);
        }
        Some(request)
    }
}
