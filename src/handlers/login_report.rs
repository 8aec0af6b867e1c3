use axum::{Json, extract::State};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::LoginStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginReportRequest {
    /// 認証前失敗では不明のため省略可
    #[garde(skip)]
    pub principal_id: Option<Uuid>,
    #[garde(skip)]
    pub email: Option<String>,
    /// 送信元IP（ログインサービスが解決済みの値を渡す）
    #[garde(length(min = 1))]
    pub ip: String,
    #[garde(skip)]
    pub user_agent: Option<String>,
    #[garde(skip)]
    pub status: LoginStatus,
}

#[derive(Debug, Serialize)]
pub struct LoginReportResponse {
    pub blocked: bool,
}

/// POST /api/login/report
///
/// ログイン結果（成功・失敗）をブルートフォースガードへ報告する。
/// ログインサービスは認証処理の前後でこれを呼び、
/// `blocked: true` なら「一時的にブロック中」として試行を短絡する。
pub async fn report_login_outcome(
    State(state): State<AppState>,
    Json(request): Json<LoginReportRequest>,
) -> Result<Json<LoginReportResponse>, AppError> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let blocked = state
        .brute_force_guard
        .report_outcome(
            request.principal_id,
            request.email.as_deref(),
            &request.ip,
            request.user_agent.as_deref(),
            request.status,
        )
        .await?;

    Ok(Json(LoginReportResponse { blocked }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_failure() {
        let request: LoginReportRequest = serde_json::from_str(
            r#"{"email":"taro@example.com","ip":"203.0.113.7","status":"failure"}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.status, LoginStatus::Failure);
        assert_eq!(request.principal_id, None);
    }

    #[test]
    fn test_request_rejects_empty_ip() {
        let request: LoginReportRequest =
            serde_json::from_str(r#"{"ip":"","status":"success"}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
