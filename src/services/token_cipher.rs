use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;

use crate::error::AppError;

const NONCE_LEN: usize = 12;

/// 連携先アクセストークンの暗号化
///
/// # Security
/// - AES-256-GCM、保存形式は 96 ビット nonce (12 バイト) + 暗号文
/// - 平文トークンはログに出力しない
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; 32],
}

impl TokenCipher {
    /// Base64 エンコードされた 32 バイトキーから作成
    pub fn from_base64(key_base64: &str) -> Result<Self, AppError> {
        let key_bytes = STANDARD.decode(key_base64).map_err(|e| {
            tracing::error!(error = ?e, "トークン暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        let key: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "トークン暗号化キーの長さが不正"
            );
            AppError::Internal(anyhow::anyhow!("encryption key must be 32 bytes"))
        })?;

        Ok(Self { key })
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })
    }

    pub fn encrypt(&self, token: &str) -> Result<Vec<u8>, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self.cipher()?.encrypt(nonce, token.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "アクセストークン暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    pub fn decrypt(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < NONCE_LEN {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| {
                tracing::error!(error = ?e, "アクセストークン復号エラー");
                AppError::Internal(anyhow::anyhow!("decryption error"))
            })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }
}

#[cfg(test)]
pub(crate) fn test_cipher() -> TokenCipher {
    TokenCipher::from_base64(&STANDARD.encode([7u8; 32])).unwrap()
}
