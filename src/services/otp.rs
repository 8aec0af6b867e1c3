//! メール配送OTPエンジンの純粋部分
//!
//! ストアに対する発行・検証のオーケストレーションは
//! `services::factor` が担う。

use rand::Rng;
use time::Duration;

/// メールOTPコードの有効期間
pub const OTP_EXPIRY: Duration = Duration::minutes(10);

/// 一様ランダムな6桁の数値コードを生成（100000〜999999）
pub fn generate_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    code.to_string()
}

/// 送信先メールアドレスをマスクする
///
/// レスポンスに含めるのはマスク済み文字列のみ（宛先の漏洩防止）
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        // '@' なしの不正値はそのまま伏せる
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_is_six_ascii_digits() {
        for _ in 0..256 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("taro@example.com"), "ta***@example.com");
        assert_eq!(mask_email("a@example.com"), "a***@example.com");
        assert_eq!(mask_email("hanako.yamada@hoken.example"), "ha***@hoken.example");
    }

    #[test]
    fn test_mask_email_without_at() {
        assert_eq!(mask_email("not-an-email"), "***");
    }
}
