//! 教练建议引擎
//!
//! 纯函数：输入一组 Attempt，按销售分组，根据最近窗口内的分数趋势和失败标签
//! 选出重点阶段、练习（drill）、目标文案和紧急程度。结果不持久化，每次现算。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::attempt::{top_tags, Attempt};

/// 销售对话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Opener,
    Discovery,
    Objection,
    Close,
}

impl Phase {
    /// 选重点时的优先级：close > discovery > objection > opener
    pub const PRIORITY: [Phase; 4] = [
        Phase::Close,
        Phase::Discovery,
        Phase::Objection,
        Phase::Opener,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Opener => "opener",
            Phase::Discovery => "discovery",
            Phase::Objection => "objection",
            Phase::Close => "close",
        }
    }

    fn goal_lead(self) -> &'static str {
        match self {
            Phase::Close => "Raise close effectiveness",
            Phase::Discovery => "Improve discovery depth",
            Phase::Objection => "Tighten objection handling",
            Phase::Opener => "Improve opener/rapport",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 紧急程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    fn rank(self) -> u8 {
        match self {
            Impact::High => 3,
            Impact::Medium => 2,
            Impact::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Impact::High => "High",
            Impact::Medium => "Medium",
            Impact::Low => "Low",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 练习项目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Drill {
    pub id: &'static str,
    pub name: &'static str,
    pub duration_min: u32,
    pub prescription: &'static [&'static str],
    /// 达标标准
    pub pass: &'static str,
    pub focus: Phase,
    /// 触发这个练习的失败标签
    pub trigger_tags: &'static [&'static str],
}

impl Drill {
    pub fn is_triggered_by(&self, tag: &str) -> bool {
        self.trigger_tags.iter().any(|t| *t == tag)
    }
}

/// 练习目录，第一个是兜底练习
pub static DRILLS: [Drill; 4] = [
    Drill {
        id: "drill_ask_close_3x",
        name: "Ask for the close 3 times",
        duration_min: 8,
        prescription: &[
            "Run 10 roleplays.",
            "Ask for the sale by minute 2, again by minute 3, again by minute 4.",
            "Use ONE close line. No rambling.",
            "End with a clear next step (schedule / same-day service / inspection).",
        ],
        pass: "Asked 3 times + got a clear next step in 7/10 reps",
        focus: Phase::Close,
        trigger_tags: &["no_close"],
    },
    Drill {
        id: "drill_discovery_5q",
        name: "5-question discovery",
        duration_min: 10,
        prescription: &[
            "Ask: pain, urgency, past attempts, decision maker, next step.",
            "No pitching until all 5 are answered.",
            "Summarize their answers in one sentence before you pitch.",
        ],
        pass: "5/5 questions before pitching in 8/10 reps",
        focus: Phase::Discovery,
        trigger_tags: &["weak_discovery", "too_generic"],
    },
    Drill {
        id: "drill_objection_loop",
        name: "Objection loop (acknowledge → clarify → answer → check)",
        duration_min: 10,
        prescription: &[
            "Run 10 objections back-to-back.",
            "Acknowledge: 'Totally fair.'",
            "Clarify: 'Is it price or trust?'",
            "Answer in 15 seconds max.",
            "Check: 'Does that solve it?' then close.",
        ],
        pass: "Resolved objection + attempted close in 7/10 reps",
        focus: Phase::Objection,
        trigger_tags: &["objection_handling", "no_isolation", "too_wordy"],
    },
    Drill {
        id: "drill_rapport_10sec",
        name: "10-second rapport + permission",
        duration_min: 6,
        prescription: &[
            "Open with a human line + permission: 'I'll be 20 seconds, fair?'",
            "Mirror their energy (calm/fast).",
            "Ask one simple question before pitching.",
        ],
        pass: "Permission asked + question asked in 8/10 reps",
        focus: Phase::Opener,
        trigger_tags: &["rapport", "low_trust", "weak_tone"],
    },
];

/// 单个销售的教练计划
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingPlan {
    pub rep_id: String,
    pub rep_name: String,
    pub focus: Phase,
    pub drill_id: &'static str,
    pub drill_name: &'static str,
    pub goal: String,
    pub why: String,
    pub impact: Impact,
    /// 窗口内均分（取整）
    pub score_now: u8,
    /// 最近 5 次均分 - 之前 5 次均分
    pub trend: f64,
}

/// 空切片均值为 0
fn mean(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64
    }
}

fn pick_focus(tags: &[&str]) -> Phase {
    Phase::PRIORITY
        .into_iter()
        .find(|phase| {
            DRILLS
                .iter()
                .filter(|d| d.focus == *phase)
                .any(|d| tags.iter().any(|t| d.is_triggered_by(t)))
        })
        .unwrap_or(Phase::Discovery)
}

/// 标签命中优先，其次按阶段，最后兜底第一个练习
fn pick_drill(focus: Phase, top_tag: Option<&str>) -> &'static Drill {
    top_tag
        .and_then(|tag| DRILLS.iter().find(|d| d.is_triggered_by(tag)))
        .or_else(|| DRILLS.iter().find(|d| d.focus == focus))
        .unwrap_or(&DRILLS[0])
}

fn pick_impact(trend: f64, score_now: u8) -> Impact {
    if trend < -3.0 || score_now < 60 {
        Impact::High
    } else if score_now < 75 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

fn plan_for_rep(rep_attempts: &[&Attempt], window_n: usize) -> CoachingPlan {
    let mut sorted: Vec<&Attempt> = rep_attempts.to_vec();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let recent = &sorted[sorted.len().saturating_sub(window_n)..];

    let scores: Vec<u8> = recent.iter().map(|a| a.score).collect();
    let n = scores.len();
    let last5 = &scores[n.saturating_sub(5)..];
    let prev5 = &scores[n.saturating_sub(10)..n.saturating_sub(5)];
    let trend = mean(last5) - mean(prev5);

    let tags: Vec<&str> = recent
        .iter()
        .flat_map(|a| a.fail_tags.iter().map(String::as_str))
        .collect();
    let top_tag = top_tags(tags.iter().copied(), 1)
        .into_iter()
        .next()
        .map(|t| t.tag);

    let focus = pick_focus(&tags);
    let drill = pick_drill(focus, top_tag.as_deref());

    let score_now = mean(&scores).round() as u8;
    let target = score_now.saturating_add(10).min(100);
    let impact = pick_impact(trend, score_now);

    let why = match &top_tag {
        Some(tag) => format!("Most common issue is \"{}\".", tag),
        None => "Not enough tag data, defaulting to the most likely bottleneck.".to_string(),
    };
    let goal = format!(
        "{}: score {} → {} by running \"{}\" daily.",
        focus.goal_lead(),
        score_now,
        target,
        drill.name
    );

    let first = rep_attempts[0];
    CoachingPlan {
        rep_id: first.rep_id.clone(),
        rep_name: first.rep_name.clone(),
        focus,
        drill_id: drill.id,
        drill_name: drill.name,
        goal,
        why,
        impact,
        score_now,
        trend,
    }
}

/// 为每个销售生成教练计划
///
/// - 每人只看按时间升序的最近 `window_n` 条
/// - 输出按紧急程度降序，同级保持分组顺序（销售首次出现的顺序）
pub fn build_coaching_plans(attempts: &[Attempt], window_n: usize) -> AppResult<Vec<CoachingPlan>> {
    if window_n == 0 {
        return Err(AppError::validation("教练窗口必须大于 0"));
    }

    let mut by_rep: Vec<(&str, Vec<&Attempt>)> = Vec::new();
    for attempt in attempts {
        match by_rep.iter_mut().find(|(rep, _)| *rep == attempt.rep_id) {
            Some((_, list)) => list.push(attempt),
            None => by_rep.push((attempt.rep_id.as_str(), vec![attempt])),
        }
    }

    let mut plans: Vec<CoachingPlan> = by_rep
        .iter()
        .map(|(_, rep_attempts)| plan_for_rep(rep_attempts, window_n))
        .collect();

    plans.sort_by(|a, b| b.impact.rank().cmp(&a.impact.rank()));
    Ok(plans)
}
