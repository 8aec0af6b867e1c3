//! Base32 コーデック（TOTP共有シークレット用）
//!
//! エンコードは RFC 4648・パディングなし。
//! デコードは認証アプリの出力実態に合わせて寛容:
//! 大文字小文字を問わず、パディング `=` や区切り文字・空白などの
//! アルファベット外文字は読み飛ばす。

use data_encoding::BASE32_NOPAD;

/// バイト列を Base32（パディングなし）にエンコード
pub fn encode(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes)
}

/// Base32 文字列をバイト列にデコード（寛容版）
///
/// アルファベット外の文字はビットを供給せずスキップする。
/// エラーは返さない（全文字スキップなら空のバイト列）。
pub fn decode_permissive(input: &str) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for c in input.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'a'..=b'z' => c - b'a',
            b'2'..=b'7' => c - b'2' + 26,
            // パディング・区切り・空白などはスキップ
            _ => continue,
        };

        buffer = (buffer << 5) | u64::from(value);
        bits += 5;

        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
        }
    }

    // 末尾の端数ビットはパディング分なので捨てる
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    #[test]
    fn test_encode_rfc4648_vectors() {
        // RFC 4648 §10 のテストベクター（パディング除去済み）
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "MY");
        assert_eq!(encode(b"fo"), "MZXQ");
        assert_eq!(encode(b"foo"), "MZXW6");
        assert_eq!(encode(b"foob"), "MZXW6YQ");
        assert_eq!(encode(b"fooba"), "MZXW6YTB");
        assert_eq!(encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_decode_uppercase() {
        assert_eq!(decode_permissive("MZXW6YTBOI"), b"foobar");
    }

    #[test]
    fn test_decode_lowercase() {
        assert_eq!(decode_permissive("mzxw6ytboi"), b"foobar");
    }

    #[test]
    fn test_decode_with_padding() {
        assert_eq!(decode_permissive("MZXW6YTBOI======"), b"foobar");
    }

    #[test]
    fn test_decode_skips_unknown_characters() {
        // 区切り文字・空白入りの認証アプリ出力
        assert_eq!(decode_permissive("MZXW 6YTB-OI"), b"foobar");
        assert_eq!(decode_permissive("mzxw6\nytboi"), b"foobar");
    }

    #[test]
    fn test_decode_all_unknown_is_empty() {
        assert_eq!(decode_permissive("!!!---"), Vec::<u8>::new());
    }

    #[test]
    fn test_roundtrip_random_20_byte_secrets() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let mut secret = [0u8; 20];
            rng.fill_bytes(&mut secret);
            let encoded = encode(&secret);
            // 20バイト = 160ビット → 32文字ちょうど（パディング不要）
            assert_eq!(encoded.len(), 32);
            assert_eq!(decode_permissive(&encoded), secret);
            assert_eq!(decode_permissive(&encoded.to_lowercase()), secret);
        }
    }

    #[test]
    fn test_alphabet_matches_data_encoding() {
        // 手書きデコーダとdata-encodingのアルファベット一致を保証
        for (i, &c) in ALPHABET.iter().enumerate() {
            let encoded = encode(&[(i as u8) << 3]);
            assert_eq!(encoded.as_bytes()[0], c);
        }
    }
}
