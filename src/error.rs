use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// セキュリティサブシステムのエラー種別
///
/// エラーは発生源で型付けし、ユーザー向けメッセージへの変換は
/// `IntoResponse` の固定マッピングで一度だけ行う。
/// メッセージ文字列のパターンマッチは禁止。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証エラー")]
    Unauthorized,

    #[error("権限エラー")]
    Forbidden,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("認証コードの有効期限切れ")]
    Expired,

    #[error("アカウントロック中")]
    LockedOut { retry_after_secs: Option<i64> },

    #[error("認証コード不一致")]
    InvalidCode { remaining_attempts: u32 },

    #[error("認証ファクター未設定")]
    NotConfigured,

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<i64>,
}

impl ErrorResponse {
    fn message(message: String) -> Self {
        Self {
            error: message,
            remaining_attempts: None,
            retry_after_secs: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            // 存在有無の漏洩防止のため常に同一メッセージ
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::message("認証に失敗しました".to_string()),
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorResponse::message("この操作を行う権限がありません".to_string()),
            ),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::message(msg.clone())),
            Self::Expired => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::message(
                    "認証コードの有効期限が切れています。新しいコードをリクエストしてください"
                        .to_string(),
                ),
            ),
            Self::LockedOut { retry_after_secs } => {
                let message = match retry_after_secs {
                    Some(secs) => format!(
                        "試行回数の上限に達しました。あと{}分お待ちください",
                        // 残り時間は分単位で切り上げ表示
                        (secs + 59) / 60
                    ),
                    None => "試行回数の上限に達しました。新しいコードをリクエストしてください"
                        .to_string(),
                };
                (
                    StatusCode::LOCKED,
                    ErrorResponse {
                        error: message,
                        remaining_attempts: None,
                        retry_after_secs: *retry_after_secs,
                    },
                )
            }
            Self::InvalidCode { remaining_attempts } => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: format!(
                        "認証コードが正しくありません（残り{}回）",
                        remaining_attempts
                    ),
                    remaining_attempts: Some(*remaining_attempts),
                    retry_after_secs: None,
                },
            ),
            Self::NotConfigured => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::message("二要素認証が設定されていません".to_string()),
            ),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message("内部エラーが発生しました".to_string()),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message("内部エラーが発生しました".to_string()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
