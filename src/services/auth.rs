use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher};
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::Principal;
use crate::repositories::PrincipalRepository;

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// 認証サービス（ベアラートークンによる主体解決）
#[derive(Clone)]
pub struct AuthService {
    principal_repo: PrincipalRepository,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(principal_repo: PrincipalRepository) -> Self {
        Self { principal_repo }
    }

    /// Authorization ヘッダーのベアラートークンからプリンシパルを解決
    ///
    /// # Security
    /// - 失敗理由は区別せず常に Unauthorized（主体の存在有無を漏らさない）
    /// - トークン平文はログに出力しない
    pub async fn authenticate_bearer(&self, headers: &HeaderMap) -> Result<Principal, AppError> {
        let token = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;

        let token_hash = hash_token(token);
        match self.principal_repo.find_by_token_hash(&token_hash).await? {
            Some(principal) => Ok(principal),
            None => {
                tracing::warn!("ベアラートークン照合失敗");
                Err(AppError::Unauthorized)
            }
        }
    }

    /// 昇格済みプリンシパルであることを要求
    pub fn require_elevated(principal: &Principal) -> Result<(), AppError> {
        if principal.role.is_elevated() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Authorization ヘッダーから Bearer トークンを取り出す
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// トークンをSHA256でハッシュ化（平文カラムを持たないための照合形式）
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn test_extract_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc123"),
        );
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer "),
        );
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("token");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // 同一入力は同一ハッシュ
        assert_eq!(hash, hash_token("token"));
    }

    #[test]
    fn test_hash_password_produces_argon2id() {
        let hash = hash_password("Longenough123!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }
}
