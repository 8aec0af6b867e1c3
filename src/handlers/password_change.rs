use axum::{Json, extract::State, http::HeaderMap};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::{client_context, six_digit_code};
use crate::services::AuthService;
use crate::services::factor::RequestContext;
use crate::services::password_change::FactorType;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    /// ポリシーのハードゲートはサービス層で検査する
    #[garde(length(min = 1))]
    pub new_password: String,
    #[garde(custom(six_digit_code))]
    pub code: String,
    #[garde(skip)]
    pub factor_type: FactorType,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    pub success: bool,
}

/// POST /api/password/change
///
/// OTP/TOTPによる再認証付きのパスワード変更
///
/// # Security
/// - ベアラー認証必須（失敗は常に汎用 Unauthorized）
/// - 新パスワード・コード値はログ出力禁止
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordResponse>, AppError> {
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
        .password_change_service
        .change_password(
            &principal,
            &request.new_password,
            &request.code,
            request.factor_type,
            ctx,
        )
        .await?;

    Ok(Json(ChangePasswordResponse { success: true }))
}
