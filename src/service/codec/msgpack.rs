//! 规范化 msgpack 编码
//!
//! 只覆盖交易编码需要的子集：无符号整数、字符串、二进制与映射。
//! 映射按键的字节序排序，整数使用最短编码，零值与空值字段不写入。

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    UInt(u64),
    Str(String),
    Bin(Vec<u8>),
    Map(CanonicalMap),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Self::UInt(n) => *n == 0,
            Self::Str(s) => s.is_empty(),
            Self::Bin(b) => b.is_empty(),
            Self::Map(m) => m.entries.is_empty(),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::UInt(n) => write_uint(out, *n),
            Self::Str(s) => write_str(out, s),
            Self::Bin(b) => write_bin(out, b),
            Self::Map(m) => m.encode(out),
        }
    }
}

/// 键有序、自动省略空值的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalMap {
    entries: BTreeMap<String, Value>,
}

impl CanonicalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) -> &mut Self {
        if !value.is_empty() {
            self.entries.insert(key.to_string(), value);
        }
        self
    }

    pub fn uint(&mut self, key: &str, value: u64) -> &mut Self {
        self.insert(key, Value::UInt(value))
    }

    pub fn str(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.insert(key, Value::Str(value.into()))
    }

    pub fn bin(&mut self, key: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.insert(key, Value::Bin(value.into()))
    }

    pub fn map(&mut self, key: &str, value: CanonicalMap) -> &mut Self {
        self.insert(key, Value::Map(value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let len = self.entries.len();
        if len < 16 {
            out.push(0x80 | len as u8);
        } else {
            out.push(0xde);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        for (key, value) in &self.entries {
            write_str(out, key);
            value.encode(out);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        self.encode(&mut out);
        out
    }
}

fn write_uint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0x7f => out.push(n as u8),
        0x80..=0xff => {
            out.push(0xcc);
            out.push(n as u8);
        }
        0x100..=0xffff => {
            out.push(0xcd);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xce);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
        _ => {
            out.push(0xcf);
            out.extend_from_slice(&n.to_be_bytes());
        }
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    let len = s.len();
    if len < 32 {
        out.push(0xa0 | len as u8);
    } else if len <= 0xff {
        out.push(0xd9);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0xda);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xdb);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(s.as_bytes());
}

fn write_bin(out: &mut Vec<u8>, b: &[u8]) {
    let len = b.len();
    if len <= 0xff {
        out.push(0xc4);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0xc5);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xc6);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(b);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_integers() {
        let encode = |n| {
            let mut out = Vec::new();
            write_uint(&mut out, n);
            out
        };
        assert_eq!(encode(5), vec![0x05]);
        assert_eq!(encode(200), vec![0xcc, 0xc8]);
        assert_eq!(encode(1000), vec![0xcd, 0x03, 0xe8]);
        assert_eq!(encode(36_253_878), vec![0xce, 0x02, 0x29, 0x30, 0xb6]);
        assert_eq!(encode(u64::MAX)[0], 0xcf);
    }

    #[test]
    fn test_sorted_and_omits_empty() {
        let mut map = CanonicalMap::new();
        map.str("type", "pay").uint("amt", 0).bin("note", Vec::new()).uint("fee", 1000);
        assert_eq!(map.len(), 2);
        assert_eq!(
            hex::encode(map.to_bytes()),
            "82a3666565cd03e8a474797065a3706179"
        );
    }
}
