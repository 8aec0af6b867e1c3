use serde::Serialize;

/// パスワードに要求する最小文字数（ハードゲート）
pub const MIN_LENGTH: usize = 12;
/// medium 判定に使う緩い長さ基準
const MEDIUM_LENGTH: usize = 8;
/// 許容する記号の固定セット
const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// パスワード強度（表示用の参考値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

/// 個別要件の充足状況
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Requirements {
    pub length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digit: bool,
    pub special: bool,
}

/// バリデーション結果
///
/// `valid` がハードゲート（12文字以上 かつ 4文字種中3種以上）。
/// `strength` は表示用であり、ゲート判定には使わない。
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PasswordValidation {
    pub valid: bool,
    pub strength: Strength,
    pub requirements: Requirements,
}

/// パスワードの構造チェック（純粋関数 - クライアント/サーバー共通規則）
pub fn validate(password: &str) -> PasswordValidation {
    let requirements = Requirements {
        length: password.chars().count() >= MIN_LENGTH,
        uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
        lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
        digit: password.chars().any(|c| c.is_ascii_digit()),
        special: password.chars().any(|c| SPECIAL_CHARS.contains(c)),
    };

    let classes = [
        requirements.uppercase,
        requirements.lowercase,
        requirements.digit,
        requirements.special,
    ]
    .iter()
    .filter(|&&ok| ok)
    .count();

    let strength = if requirements.length && classes == 4 {
        Strength::Strong
    } else if (requirements.length && classes >= 3)
        || (password.chars().count() >= MEDIUM_LENGTH && classes >= 2)
    {
        Strength::Medium
    } else {
        Strength::Weak
    };

    PasswordValidation {
        valid: requirements.length && classes >= 3,
        strength,
        requirements,
    }
}

/// ハードゲート違反時に、違反した規則を示すメッセージを返す
pub fn violation_message(validation: &PasswordValidation) -> Option<String> {
    if validation.valid {
        return None;
    }
    if !validation.requirements.length {
        return Some(format!(
            "パスワードは{MIN_LENGTH}文字以上で入力してください"
        ));
    }
    Some(
        "パスワードには大文字・小文字・数字・記号のうち3種類以上を含めてください".to_string(),
    )
}
