//! 文件内容摘要（SHA-256）
//!
//! 远程描述字段中保存的也是这个摘要，两边必须使用同一算法。

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// 流式读取的块大小
pub const DIGEST_CHUNK_SIZE: usize = 4096;

/// 摘要的十六进制长度
pub const DIGEST_HEX_LEN: usize = 64;

/// 计算内存数据的摘要
pub fn calculate_hash(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

/// 从 reader 分块计算摘要
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; DIGEST_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

/// 计算文件摘要（阻塞 IO，在 async 环境中需放入 spawn_blocking）
pub fn hash_file(path: &Path) -> io::Result<String> {
    hash_reader(File::open(path)?)
}

/// 是否是合法的摘要字符串
pub fn is_valid_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}
