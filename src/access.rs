//! 身份与团队权限
//!
//! - `IdentityResolver`：请求凭据 → 稳定的用户 ID
//! - `TeamAccess`：团队成员和角色；经理看全队，销售只看自己

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::attempt::{Attempt, Session};
use crate::services::metrics::{
    build_insights, build_summary, build_trend, ManagerInsights, Summary, TrendPoint,
};
use crate::store::AttemptStore;

/// 团队角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Rep,
}

/// 团队成员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl TeamMember {
    pub fn new(team_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            team_id: team_id.into(),
            user_id: user_id.into(),
            role,
            display_name: None,
        }
    }
}

/// 凭据解析
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// 缺少或无效的凭据返回权限错误
    async fn resolve(&self, credentials: Option<&str>) -> AppResult<String>;
}

/// 基于 Bearer token 表的解析器
#[derive(Debug, Clone, Default)]
pub struct TokenIdentityResolver {
    tokens: HashMap<String, String>,
}

impl TokenIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl IdentityResolver for TokenIdentityResolver {
    async fn resolve(&self, credentials: Option<&str>) -> AppResult<String> {
        let raw = credentials
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::authorization("缺少 Authorization 凭据"))?;
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

        self.tokens.get(token).cloned().ok_or_else(|| {
            warn!("无效的凭据");
            AppError::authorization("凭据无效")
        })
    }
}

/// 团队成员表 + 按角色过滤的视图
#[derive(Debug, Clone, Default)]
pub struct TeamAccess {
    members: Vec<TeamMember>,
}

impl TeamAccess {
    pub fn new(members: Vec<TeamMember>) -> Self {
        Self { members }
    }

    pub fn add_member(&mut self, member: TeamMember) {
        self.members
            .retain(|m| !(m.team_id == member.team_id && m.user_id == member.user_id));
        self.members.push(member);
    }

    /// 非成员返回权限错误
    pub fn member(&self, team_id: &str, user_id: &str) -> AppResult<&TeamMember> {
        self.members
            .iter()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .ok_or_else(|| {
                AppError::authorization(format!("用户 {} 不是团队 {} 的成员", user_id, team_id))
            })
    }

    /// 经理专属视图
    pub fn require_manager(&self, team_id: &str, user_id: &str) -> AppResult<&TeamMember> {
        let member = self.member(team_id, user_id)?;
        if member.role != Role::Manager {
            return Err(AppError::authorization("仅限经理访问"));
        }
        Ok(member)
    }

    /// 经理看到全队记录，销售只看到自己的
    pub async fn visible_attempts(
        &self,
        store: &dyn AttemptStore,
        team_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<Attempt>> {
        let member = self.member(team_id, user_id)?;
        let attempts = store.list_attempts(team_id).await?;
        Ok(match member.role {
            Role::Manager => attempts,
            Role::Rep => attempts
                .into_iter()
                .filter(|a| a.rep_id == user_id)
                .collect(),
        })
    }

    pub async fn visible_sessions(
        &self,
        store: &dyn AttemptStore,
        team_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<Session>> {
        let member = self.member(team_id, user_id)?;
        let sessions = store.list_sessions(team_id).await?;
        Ok(match member.role {
            Role::Manager => sessions,
            Role::Rep => sessions
                .into_iter()
                .filter(|s| s.rep_id == user_id)
                .collect(),
        })
    }

    /// 经理汇总 + 每日趋势
    pub async fn manager_summary(
        &self,
        store: &dyn AttemptStore,
        team_id: &str,
        user_id: &str,
    ) -> AppResult<(Summary, Vec<TrendPoint>)> {
        self.require_manager(team_id, user_id)?;
        let attempts = store.list_attempts(team_id).await?;
        Ok((build_summary(&attempts), build_trend(&attempts)))
    }

    /// 经理报告
    pub async fn manager_insights(
        &self,
        store: &dyn AttemptStore,
        team_id: &str,
        user_id: &str,
        window_n: usize,
    ) -> AppResult<ManagerInsights> {
        self.require_manager(team_id, user_id)?;
        let attempts = store.list_attempts(team_id).await?;
        build_insights(team_id, &attempts, window_n)
    }
}
