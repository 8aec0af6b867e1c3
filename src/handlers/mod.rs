pub mod email_code;
pub mod health;
pub mod login_report;
pub mod password_change;
pub mod two_factor;

pub use email_code::{issue_email_code, verify_email_code};
pub use health::health_check;
pub use login_report::report_login_outcome;
pub use password_change::change_password;
pub use two_factor::{enroll_factor, reset_factor, verify_factor};

use axum::http::HeaderMap;

/// リクエストヘッダーからクライアントコンテキスト（IP・User-Agent）を抽出
///
/// IPはリバースプロキシの `X-Forwarded-For` 先頭値を採用する。
pub(crate) fn client_context(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    (ip, user_agent)
}

/// 6桁数値コードのバリデーター（garde カスタムルール）
pub(crate) fn six_digit_code(value: &str, _context: &()) -> garde::Result {
    if value.len() == 6 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(garde::Error::new(
            "認証コードは6桁の数字で入力してください",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_context_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0"),
        );
        let (ip, ua) = client_context(&headers);
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ua.as_deref(), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_client_context_missing_headers() {
        let (ip, ua) = client_context(&HeaderMap::new());
        assert_eq!(ip, None);
        assert_eq!(ua, None);
    }

    #[test]
    fn test_six_digit_code_validator() {
        assert!(six_digit_code("123456", &()).is_ok());
        assert!(six_digit_code("12345", &()).is_err());
        assert!(six_digit_code("12345a", &()).is_err());
        assert!(six_digit_code("", &()).is_err());
    }
}
