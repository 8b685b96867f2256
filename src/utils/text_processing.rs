// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sha2::{Digest, Sha256};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 折叠空白字符并去掉首尾空白
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 正文的精确哈希（SHA-256，小写十六进制）
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// FNV-1a，跨进程、跨版本稳定
fn token_hash(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// 64位 SimHash
pub fn simhash(text: &str) -> u64 {
    let mut weights = [0i32; 64];
    for word in text.split_whitespace() {
        let word_hash = token_hash(&word.to_lowercase());
        for (bit, weight) in weights.iter_mut().enumerate() {
            if (word_hash >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
}

/// 近似重复指纹：SimHash 的16位十六进制表示
pub fn fingerprint(text: &str) -> String {
    format!("{:016x}", simhash(text))
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
