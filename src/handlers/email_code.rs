use axum::{Json, extract::State, http::HeaderMap};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::{client_context, six_digit_code};
use crate::services::AuthService;
use crate::services::factor::RequestContext;
use crate::state::AppState;

// === Email Code Issue ===

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    /// マスク済みの送信先（宛先そのものは返さない）
    pub destination: String,
}

/// POST /api/email-code/issue
///
/// メールOTPコードを発行して登録済みアドレスへ送信
///
/// # Security
/// - 昇格済みロール必須（発行系操作は境界で一律に特権チェック）
/// - コード値はレスポンス・ログに含めない
pub async fn issue_email_code(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IssueResponse>, AppError> {
    let auth_service = AuthService::new(state.principal_repo.clone());
    let principal = auth_service.authenticate_bearer(&headers).await?;
    AuthService::require_elevated(&principal)?;

    let (ip, user_agent) = client_context(&headers);
    let ctx = RequestContext {
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    let destination = state.factor_service.issue_email_code(&principal, ctx).await?;

    Ok(Json(IssueResponse { destination }))
}

// === Email Code Verify ===

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailCodeRequest {
    #[garde(custom(six_digit_code))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailCodeResponse {
    pub success: bool,
}

/// POST /api/email-code/verify
///
/// メールOTPコードを検証
///
/// 期限切れ・試行上限はそれぞれ明示的なエラーとして返す。
pub async fn verify_email_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VerifyEmailCodeRequest>,
) -> Result<Json<VerifyEmailCodeResponse>, AppError> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let auth_service = AuthService::new(state.principal_repo.clone());
    let principal = auth_service.authenticate_bearer(&headers).await?;

    let (ip, user_agent) = client_context(&headers);
    let ctx = RequestContext {
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    state
        .factor_service
        .verify_email_otp(&principal, &request.code, ctx)
        .await?;

    Ok(Json(VerifyEmailCodeResponse { success: true }))
}
