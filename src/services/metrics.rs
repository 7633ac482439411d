//! 经理视图的指标汇总
//!
//! 全部是 Attempt 列表上的纯函数，可以在同一份快照上并发调用。

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::AppResult;
use crate::models::attempt::{top_tags, Attempt, TagCount};
use crate::services::coaching::{build_coaching_plans, CoachingPlan, Impact, Phase};

/// 团队汇总里保留的失败标签数量
pub const SUMMARY_TOP_TAGS: usize = 6;

/// 报告里的行动项数量
pub const INSIGHT_ACTIONS: usize = 3;

/// 平均用时达到这个秒数即视为满分
const FULL_DURATION_SEC: f64 = 90.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean_score<'a>(attempts: impl IntoIterator<Item = &'a Attempt>) -> f64 {
    let (sum, n) = attempts
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), a| (sum + f64::from(a.score), n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn attempt_tags<'a>(attempts: impl IntoIterator<Item = &'a Attempt>) -> Vec<&'a str> {
    attempts
        .into_iter()
        .flat_map(|a| a.fail_tags.iter().map(String::as_str))
        .collect()
}

/// 分数分布
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBuckets {
    #[serde(rename = "0-49")]
    pub low: usize,
    #[serde(rename = "50-69")]
    pub developing: usize,
    #[serde(rename = "70-84")]
    pub solid: usize,
    #[serde(rename = "85-100")]
    pub strong: usize,
}

impl ScoreBuckets {
    fn add(&mut self, score: u8) {
        match score {
            0..=49 => self.low += 1,
            50..=69 => self.developing += 1,
            70..=84 => self.solid += 1,
            _ => self.strong += 1,
        }
    }
}

/// 团队汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_attempts: usize,
    pub active_reps: usize,
    /// 一位小数
    pub avg_score: f64,
    pub score_buckets: ScoreBuckets,
    pub top_fail_tags: Vec<TagCount>,
    /// 0-100 的整数
    pub readiness: u8,
}

/// 单个销售一行
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepRow {
    pub rep_id: String,
    pub rep_name: String,
    pub attempts: usize,
    pub avg_score: f64,
    pub last_score: u8,
    /// 最后一次相对上一次的分差
    pub trend: i32,
    pub top_issue: Option<String>,
}

/// 每日均分
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub day: String,
    pub avg_score: f64,
}

/// 销售行 + 教练计划
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepCoachingRow {
    #[serde(flatten)]
    pub row: RepRow,
    pub focus: Option<Phase>,
    pub drill: Option<String>,
    pub goal: Option<String>,
    pub impact: Option<Impact>,
}

/// 团队级行动项
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightAction {
    pub rep_id: String,
    pub rep_name: String,
    pub issue: Phase,
    pub recommendation: String,
    pub goal: String,
    pub why: String,
    pub impact: Impact,
}

/// 经理报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerInsights {
    pub team_id: String,
    pub readiness: u8,
    pub top_fail_tags: Vec<TagCount>,
    pub actions: Vec<InsightAction>,
    pub plans: Vec<CoachingPlan>,
}

/// 团队汇总
///
/// readiness = clamp(0.7 × 均分 + 0.3 × 用时分, 0, 100)，
/// 平均用时 ≥ 90 秒时用时分为 100，否则按比例
pub fn build_summary(attempts: &[Attempt]) -> Summary {
    let total_attempts = attempts.len();
    let active_reps = attempts
        .iter()
        .map(|a| a.rep_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let avg_score = mean_score(attempts);

    let mut score_buckets = ScoreBuckets::default();
    for attempt in attempts {
        score_buckets.add(attempt.score);
    }

    let top_fail_tags = top_tags(attempt_tags(attempts), SUMMARY_TOP_TAGS);

    let avg_duration = if attempts.is_empty() {
        0.0
    } else {
        attempts.iter().map(|a| f64::from(a.duration_sec)).sum::<f64>() / total_attempts as f64
    };
    let duration_score = if avg_duration >= FULL_DURATION_SEC {
        100.0
    } else {
        avg_duration / FULL_DURATION_SEC * 100.0
    };
    let readiness = (0.7 * avg_score + 0.3 * duration_score).clamp(0.0, 100.0);

    Summary {
        total_attempts,
        active_reps,
        avg_score: round1(avg_score),
        score_buckets,
        top_fail_tags,
        readiness: readiness.round() as u8,
    }
}

fn group_by_rep(attempts: &[Attempt]) -> Vec<Vec<&Attempt>> {
    let mut groups: Vec<Vec<&Attempt>> = Vec::new();
    for attempt in attempts {
        match groups.iter_mut().find(|g| g[0].rep_id == attempt.rep_id) {
            Some(group) => group.push(attempt),
            None => groups.push(vec![attempt]),
        }
    }
    groups
}

fn rep_row(rep_attempts: &[&Attempt]) -> RepRow {
    let mut sorted = rep_attempts.to_vec();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let last = sorted.last().map(|a| a.score).unwrap_or_default();
    let trend = match sorted.len() {
        0 | 1 => 0,
        n => i32::from(last) - i32::from(sorted[n - 2].score),
    };

    let top_issue = top_tags(attempt_tags(rep_attempts.iter().copied()), 1)
        .into_iter()
        .next()
        .map(|t| t.tag);

    RepRow {
        rep_id: rep_attempts[0].rep_id.clone(),
        rep_name: rep_attempts[0].rep_name.clone(),
        attempts: rep_attempts.len(),
        avg_score: round1(mean_score(rep_attempts.iter().copied())),
        last_score: last,
        trend,
        top_issue,
    }
}

/// 每个销售一行，按均分降序
pub fn build_rep_rows(attempts: &[Attempt]) -> Vec<RepRow> {
    let mut rows: Vec<RepRow> = group_by_rep(attempts)
        .iter()
        .map(|group| rep_row(group))
        .collect();
    rows.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));
    rows
}

/// 按 createdAt 前 10 个字符（日期）分组求均分，按日期升序
pub fn build_trend(attempts: &[Attempt]) -> Vec<TrendPoint> {
    let mut by_day: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for attempt in attempts {
        let entry = by_day.entry(attempt.day()).or_insert((0, 0));
        entry.0 += u32::from(attempt.score);
        entry.1 += 1;
    }

    by_day
        .into_iter()
        .map(|(day, (sum, n))| TrendPoint {
            day: day.to_string(),
            avg_score: round1(f64::from(sum) / f64::from(n)),
        })
        .collect()
}

/// 销售行附带各自的教练计划
pub fn build_rep_coaching(attempts: &[Attempt], window_n: usize) -> AppResult<Vec<RepCoachingRow>> {
    let plans = build_coaching_plans(attempts, window_n)?;

    Ok(build_rep_rows(attempts)
        .into_iter()
        .map(|row| {
            let plan = plans.iter().find(|p| p.rep_id == row.rep_id);
            RepCoachingRow {
                focus: plan.map(|p| p.focus),
                drill: plan.map(|p| p.drill_name.to_string()),
                goal: plan.map(|p| p.goal.clone()),
                impact: plan.map(|p| p.impact),
                row,
            }
        })
        .collect())
}

/// 经理报告：readiness、常见失败标签、最紧急的 3 个行动项和全部计划
pub fn build_insights(
    team_id: &str,
    attempts: &[Attempt],
    window_n: usize,
) -> AppResult<ManagerInsights> {
    let summary = build_summary(attempts);
    let plans = build_coaching_plans(attempts, window_n)?;

    let actions = plans
        .iter()
        .take(INSIGHT_ACTIONS)
        .map(|p| InsightAction {
            rep_id: p.rep_id.clone(),
            rep_name: p.rep_name.clone(),
            issue: p.focus,
            recommendation: format!("Run \"{}\" today ({} impact).", p.drill_name, p.impact),
            goal: p.goal.clone(),
            why: p.why.clone(),
            impact: p.impact,
        })
        .collect();

    Ok(ManagerInsights {
        team_id: team_id.to_string(),
        readiness: summary.readiness,
        top_fail_tags: summary.top_fail_tags,
        actions,
        plans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(
        rep: &str,
        created_at: &str,
        score: u8,
        tags: &[&str],
        duration_sec: u32,
    ) -> Attempt {
        Attempt {
            id: format!("att_{}_{}", rep, created_at),
            team_id: "team_1".to_string(),
            rep_id: rep.to_string(),
            rep_name: rep.to_uppercase(),
            created_at: created_at.to_string(),
            market: "d2d_pest".to_string(),
            scenario_id: "price".to_string(),
            score,
            fail_tags: tags.iter().map(|t| t.to_string()).collect(),
            duration_sec,
        }
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = build_summary(&[]);
        assert_eq!(summary.total_attempts, 0);
        assert_eq!(summary.active_reps, 0);
        assert_eq!(summary.avg_score, 0.0);
        assert_eq!(summary.readiness, 0);
        assert!(summary.top_fail_tags.is_empty());
        assert_eq!(summary.score_buckets, ScoreBuckets::default());
    }

    #[test]
    fn test_summary_example() {
        let attempts = vec![
            attempt("a", "2026-03-01T10:00:00Z", 62, &["no_close"], 30),
            attempt("b", "2026-03-01T11:00:00Z", 71, &["no_close"], 30),
            attempt("a", "2026-03-02T10:00:00Z", 44, &["rapport"], 30),
        ];
        let summary = build_summary(&attempts);
        assert_eq!(summary.avg_score, 59.0);
        assert_eq!(summary.active_reps, 2);
        assert_eq!(
            summary.top_fail_tags,
            vec![
                TagCount { tag: "no_close".to_string(), count: 2 },
                TagCount { tag: "rapport".to_string(), count: 1 },
            ]
        );
        assert_eq!(summary.score_buckets.low, 1);
        assert_eq!(summary.score_buckets.developing, 1);
        assert_eq!(summary.score_buckets.solid, 1);
        // 0.7 * 59 + 0.3 * (30 / 90 * 100) = 41.3 + 10 = 51.3
        assert_eq!(summary.readiness, 51);
    }

    #[test]
    fn test_readiness_caps_duration_credit() {
        let attempts = vec![attempt("a", "2026-03-01T10:00:00Z", 100, &[], 600)];
        assert_eq!(build_summary(&attempts).readiness, 100);
        assert_eq!(build_summary(&attempts).score_buckets.strong, 1);
    }

    #[test]
    fn test_summary_keeps_six_tags() {
        let tags = ["t1", "t2", "t3", "t4", "t5", "t6", "t7"];
        let attempts: Vec<Attempt> = tags
            .iter()
            .map(|t| attempt("a", "2026-03-01T10:00:00Z", 50, &[t], 30))
            .collect();
        let summary = build_summary(&attempts);
        assert_eq!(summary.top_fail_tags.len(), SUMMARY_TOP_TAGS);
        assert_eq!(summary.top_fail_tags[0].tag, "t1");
    }

    #[test]
    fn test_rep_rows() {
        let attempts = vec![
            attempt("a", "2026-03-02T10:00:00Z", 60, &["no_close"], 30),
            attempt("b", "2026-03-01T10:00:00Z", 90, &["rapport"], 30),
            attempt("a", "2026-03-01T10:00:00Z", 70, &["no_close"], 30),
            attempt("a", "2026-03-03T10:00:00Z", 65, &["low_trust"], 30),
        ];
        let rows = build_rep_rows(&attempts);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rep_id, "b");
        assert_eq!(rows[0].trend, 0);

        let a = &rows[1];
        assert_eq!(a.attempts, 3);
        assert_eq!(a.avg_score, 65.0);
        assert_eq!(a.last_score, 65);
        assert_eq!(a.trend, 5);
        assert_eq!(a.top_issue.as_deref(), Some("no_close"));
    }

    #[test]
    fn test_trend_groups_by_day() {
        let attempts = vec![
            attempt("a", "2026-03-02T09:00:00Z", 80, &[], 30),
            attempt("a", "2026-03-01T23:59:59Z", 50, &[], 30),
            attempt("b", "2026-03-02T18:00:00Z", 65, &[], 30),
        ];
        let trend = build_trend(&attempts);
        assert_eq!(
            trend,
            vec![
                TrendPoint { day: "2026-03-01".to_string(), avg_score: 50.0 },
                TrendPoint { day: "2026-03-02".to_string(), avg_score: 72.5 },
            ]
        );
    }

    #[test]
    fn test_trend_rounds_to_one_decimal() {
        let attempts = vec![
            attempt("a", "2026-03-01T09:00:00Z", 70, &[], 30),
            attempt("a", "2026-03-01T10:00:00Z", 71, &[], 30),
            attempt("a", "2026-03-01T11:00:00Z", 71, &[], 30),
        ];
        assert_eq!(build_trend(&attempts)[0].avg_score, 70.7);
    }

    #[test]
    fn test_insights_actions() {
        let attempts = vec![
            attempt("a", "2026-03-01T10:00:00Z", 40, &["no_close"], 30),
            attempt("b", "2026-03-01T10:00:00Z", 90, &["rapport"], 30),
            attempt("c", "2026-03-01T10:00:00Z", 70, &["no_isolation"], 30),
            attempt("d", "2026-03-01T10:00:00Z", 50, &["weak_discovery"], 30),
        ];
        let insights = build_insights("team_1", &attempts, 20).unwrap();
        assert_eq!(insights.plans.len(), 4);
        assert_eq!(insights.actions.len(), INSIGHT_ACTIONS);
        assert_eq!(insights.actions[0].rep_id, "a");
        assert_eq!(
            insights.actions[0].recommendation,
            "Run \"Ask for the close 3 times\" today (High impact)."
        );
        assert_eq!(insights.actions[1].rep_id, "d");
        assert_eq!(insights.actions[2].rep_id, "c");
    }

    #[test]
    fn test_rep_coaching_rows_attach_plan() {
        let attempts = vec![attempt("a", "2026-03-01T10:00:00Z", 40, &["no_close"], 30)];
        let rows = build_rep_coaching(&attempts, 20).unwrap();
        assert_eq!(rows[0].focus, Some(Phase::Close));
        assert_eq!(rows[0].impact, Some(Impact::High));
        assert_eq!(rows[0].drill.as_deref(), Some("Ask for the close 3 times"));
    }
}
