use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::error::AppError;
use crate::services::base32;

type HmacSha1 = Hmac<Sha1>;

/// TOTP のタイムステップ（秒）
pub const TIME_STEP_SECS: u64 = 30;
/// コード桁数
pub const CODE_DIGITS: usize = 6;
/// 許容するクロックスキュー（前後2ステップ = ±60秒）
const SKEW_STEPS: i64 = 2;

/// TOTP (Time-based One-Time Password) サービス
///
/// RFC 6238 (HMAC-SHA1 / 30秒 / 6桁) のコード生成・検証と、
/// シークレットの保存時暗号化（AES-256-GCM）を担う。
///
/// # Security
/// - シークレットはAES-256-GCMで暗号化してDB保存
/// - シークレット平文・コード値はログに出力しない
/// - どの時間ウィンドウで一致したかは呼び出し元へ返さない
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
    encryption_key: [u8; 32],
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（認証アプリに表示される）
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(issuer: String, encryption_key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "TOTP暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "TOTP暗号化キーの長さが不正"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "encryption key must be 32 bytes"
            )));
        }

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self {
            issuer,
            encryption_key,
        })
    }

    /// 20バイト（160ビット）のランダムシークレットを生成し、Base32でエンコード
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        base32::encode(&bytes)
    }

    /// 登録用プロビジョニングURIを構築
    ///
    /// 認証アプリがQRコード経由で読み取る標準形式
    pub fn provisioning_uri(&self, label: &str, secret: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{label}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30",
            issuer = self.issuer,
            label = label,
            secret = secret,
        )
    }

    /// シークレットをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt_secret(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        // 96ビット (12バイト) のランダムnonce生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        // nonce + ciphertext を結合
        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 暗号化されたシークレットを復号
    pub fn decrypt_secret(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < 12 {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット復号エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }

    /// カウンター値からコードを生成（RFC 4226 動的切り出し）
    ///
    /// カウンターは8バイトbig-endianでHMAC-SHA1に入力し、
    /// 末尾バイトの下位ニブルをオフセットとして4バイトを
    /// 最上位ビットをマスクしてbig-endianで読み、10^6 の剰余を取る。
    pub fn generate_code(secret: &[u8], counter: u64) -> String {
        let mut mac =
            <HmacSha1 as Mac>::new_from_slice(secret).expect("HMAC-SHA1 accepts keys of any length");
        mac.update(&counter.to_be_bytes());
        let hash = mac.finalize().into_bytes();

        let offset = (hash[hash.len() - 1] & 0x0f) as usize;
        let code = u32::from_be_bytes([
            hash[offset] & 0x7f,
            hash[offset + 1],
            hash[offset + 2],
            hash[offset + 3],
        ]);

        format!("{:06}", code % 1_000_000)
    }

    /// 指定UNIX時刻でコードを検証（±2ステップのスキュー許容）
    ///
    /// timeStep ∈ {-2,-1,0,1,2} を順に走査し、最初の一致で打ち切る。
    /// どのウィンドウで一致したかは返さない。
    pub fn verify_at(secret: &[u8], code: &str, unix_now: u64) -> bool {
        if code.len() != CODE_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }

        let counter = (unix_now / TIME_STEP_SECS) as i64;
        for step in -SKEW_STEPS..=SKEW_STEPS {
            let t = counter + step;
            if t < 0 {
                continue;
            }
            if Self::generate_code(secret, t as u64) == code {
                return true;
            }
        }

        false
    }

    /// 現在時刻でコードを検証
    ///
    /// # Arguments
    /// * `secret` - Base32エンコードされたシークレット（平文）
    pub fn verify_code(&self, secret: &str, code: &str) -> Result<bool, AppError> {
        let secret_bytes = base32::decode_permissive(secret);
        if secret_bytes.is_empty() {
            tracing::error!("シークレットのBase32デコード結果が空");
            return Err(AppError::Internal(anyhow::anyhow!("invalid base32 secret")));
        }

        let unix_now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!(error = ?e, "システム時刻取得エラー");
                AppError::Internal(anyhow::anyhow!("system time error"))
            })?
            .as_secs();

        Ok(Self::verify_at(&secret_bytes, code, unix_now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    /// RFC 4226 / RFC 6238 のテストベクター用シークレット
    const RFC_SECRET: &[u8] = b"12345678901234567890";

    fn create_test_service() -> TotpService {
        // テスト用の32バイトキー
        let key = [0u8; 32];
        let key_base64 = STANDARD.encode(key);
        TotpService::new("TestApp".to_string(), &key_base64).unwrap()
    }

    #[test]
    fn test_generate_code_rfc4226_vectors() {
        // RFC 4226 Appendix D
        let expected = [
            "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
            "399871", "520489",
        ];
        for (counter, want) in expected.iter().enumerate() {
            assert_eq!(&TotpService::generate_code(RFC_SECRET, counter as u64), want);
        }
    }

    #[test]
    fn test_generate_code_rfc6238_vectors() {
        // RFC 6238 Appendix B（SHA-1行、8桁の下6桁）
        let cases: [(u64, &str); 5] = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (20_000_000_000, "353130"),
        ];
        for (unix_time, want) in cases {
            let counter = unix_time / TIME_STEP_SECS;
            assert_eq!(&TotpService::generate_code(RFC_SECRET, counter), want);
        }
    }

    #[test]
    fn test_verify_accepts_skew_within_two_steps() {
        let now: u64 = 1_234_567_890;
        let counter = now / TIME_STEP_SECS;
        for step in -2i64..=2 {
            let code = TotpService::generate_code(RFC_SECRET, (counter as i64 + step) as u64);
            assert!(
                TotpService::verify_at(RFC_SECRET, &code, now),
                "step {step} のコードは受理されるべき"
            );
        }
    }

    #[test]
    fn test_verify_rejects_skew_beyond_two_steps() {
        let now: u64 = 1_234_567_890;
        let counter = now / TIME_STEP_SECS;
        for step in [-3i64, 3] {
            let code = TotpService::generate_code(RFC_SECRET, (counter as i64 + step) as u64);
            assert!(
                !TotpService::verify_at(RFC_SECRET, &code, now),
                "step {step} のコードは拒否されるべき"
            );
        }
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let now: u64 = 1_234_567_890;
        assert!(!TotpService::verify_at(RFC_SECRET, "12345", now));
        assert!(!TotpService::verify_at(RFC_SECRET, "1234567", now));
        assert!(!TotpService::verify_at(RFC_SECRET, "12345a", now));
        assert!(!TotpService::verify_at(RFC_SECRET, "", now));
    }

    #[test]
    fn test_generate_secret() {
        let secret = TotpService::generate_secret();
        // Base32エンコードされた20バイト = 32文字
        assert_eq!(secret.len(), 32);
        assert!(
            secret
                .chars()
                .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c))
        );
    }

    #[test]
    fn test_encrypt_decrypt_secret() {
        let service = create_test_service();
        let original = TotpService::generate_secret();

        let encrypted = service.encrypt_secret(&original).unwrap();
        // 12バイトnonce + 暗号文 + 16バイトtag
        assert!(encrypted.len() > 12);

        let decrypted = service.decrypt_secret(&encrypted).unwrap();
        assert_eq!(original, decrypted);
    }

    #[test]
    fn test_decrypt_too_short_fails() {
        let service = create_test_service();
        assert!(service.decrypt_secret(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_provisioning_uri_format() {
        let service = create_test_service();
        let uri = service.provisioning_uri("taro@example.com", "MZXW6YTBOI");
        assert_eq!(
            uri,
            "otpauth://totp/TestApp:taro@example.com?secret=MZXW6YTBOI&issuer=TestApp&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn test_new_with_invalid_key_length() {
        let short_key = STANDARD.encode([0u8; 16]);
        let result = TotpService::new("TestApp".to_string(), &short_key);
        assert!(result.is_err());
    }

    #[test]
    fn test_new_with_invalid_base64() {
        let result = TotpService::new("TestApp".to_string(), "not-valid-base64!!!");
        assert!(result.is_err());
    }
}
