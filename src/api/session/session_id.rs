//! 会话 ID 签发
//!
//! ID 是 8 字节随机数加 8 字节 HMAC-SHA256 截断标签，按 UUID 文本格式输出。
//! 密钥只存在于当前进程内，无需保存任何记录就能判断一个 ID 是否由本进程签发过。

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 8;
const ID_LEN: usize = 16;

#[derive(Clone)]
pub struct SessionIdIssuer {
    mac: HmacSha256,
}

impl SessionIdIssuer {
    /// 使用随机密钥
    pub fn new() -> Self {
        let mut key = Key::<HmacSha256>::default();
        for chunk in key.chunks_mut(ID_LEN) {
            let random = Uuid::new_v4();
            chunk.copy_from_slice(&random.as_bytes()[..chunk.len()]);
        }
        Self {
            mac: HmacSha256::new(&key),
        }
    }

    pub fn issue(&self) -> String {
        let mut bytes = [0u8; ID_LEN];
        bytes[..NONCE_LEN].copy_from_slice(&Uuid::new_v4().as_bytes()[..NONCE_LEN]);
        let tag = self.tag(&bytes[..NONCE_LEN]);
        bytes[NONCE_LEN..].copy_from_slice(&tag[..ID_LEN - NONCE_LEN]);
        Uuid::from_bytes(bytes).hyphenated().to_string()
    }

    /// 标签校验通过即视为本进程签发
    pub fn is_issued(&self, id: &str) -> bool {
        let Ok(parsed) = Uuid::parse_str(id) else {
            return false;
        };
        let bytes = parsed.as_bytes();
        let mut mac = self.mac.clone();
        mac.update(&bytes[..NONCE_LEN]);
        mac.verify_truncated_left(&bytes[NONCE_LEN..]).is_ok()
    }

    fn tag(&self, nonce: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(nonce);
        mac.finalize().into_bytes().to_vec()
    }
}

impl Default for SessionIdIssuer {
    fn default() -> Self {
        Self::new()
    }
}
