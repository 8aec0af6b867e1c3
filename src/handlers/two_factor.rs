use axum::{Json, extract::State, http::HeaderMap};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::{client_context, six_digit_code};
use crate::services::AuthService;
use crate::services::factor::{EnrollOutcome, RequestContext};
use crate::state::AppState;

// === Factor Enroll ===

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_enrolled: Option<bool>,
}

/// POST /api/factor/enroll
///
/// TOTPファクターの登録を開始（シークレット生成、プロビジョニングURI返却）
///
/// # Security
/// - pending 中の再呼び出しは同一シークレット（冪等）
/// - enabled 済みはシークレットを公開しない
/// - シークレット平文はログ出力禁止
pub async fn enroll_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EnrollResponse>, AppError> {
    let auth_service = AuthService::new(state.principal_repo.clone());
    let principal = auth_service.authenticate_bearer(&headers).await?;

    let (ip, user_agent) = client_context(&headers);
    let ctx = RequestContext {
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    match state.factor_service.enroll(&principal, ctx).await? {
        EnrollOutcome::Enrolled {
            secret,
            provisioning_uri,
        } => Ok(Json(EnrollResponse {
            secret: Some(secret),
            provisioning_uri: Some(provisioning_uri),
            already_enrolled: None,
        })),
        EnrollOutcome::AlreadyEnrolled => Ok(Json(EnrollResponse {
            secret: None,
            provisioning_uri: None,
            already_enrolled: Some(true),
        })),
    }
}

// === Factor Verify ===

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[garde(custom(six_digit_code))]
    pub code: String,
    /// 初回セットアップ（enabled への遷移）としての検証か
    #[serde(default)]
    #[garde(skip)]
    pub setup_flow: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
}

/// POST /api/factor/verify
///
/// TOTPコードを検証。pending 中の成功でファクターが有効化される。
///
/// # Security
/// - コード値はログ出力禁止
/// - どの時間ウィンドウで一致したかは返さない
pub async fn verify_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
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
        .verify_totp(&principal, &request.code, request.setup_flow, ctx)
        .await?;

    Ok(Json(VerifyResponse { success: true }))
}

// === Factor Reset ===

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequest {
    #[garde(skip)]
    pub principal_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

/// POST /api/factor/reset
///
/// 対象プリンシパルのファクターを初期化（特権操作）
///
/// # Security
/// - 昇格済みロール必須（違反は監査ログへ記録の上 Forbidden）
pub async fn reset_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, AppError> {
    let auth_service = AuthService::new(state.principal_repo.clone());
    let acting = auth_service.authenticate_bearer(&headers).await?;

    let (ip, user_agent) = client_context(&headers);
    let ctx = RequestContext {
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    state
        .factor_service
        .reset_factor(request.principal_id, &acting, ctx)
        .await?;

    Ok(Json(ResetResponse { reset: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_request_valid_code() {
        let request = VerifyRequest {
            code: "123456".to_string(),
            setup_flow: true,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_verify_request_rejects_short_code() {
        let request = VerifyRequest {
            code: "12345".to_string(),
            setup_flow: false,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_verify_request_setup_flow_defaults_false() {
        let request: VerifyRequest = serde_json::from_str(r#"{"code":"123456"}"#).unwrap();
        assert!(!request.setup_flow);
    }
}
