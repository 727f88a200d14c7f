//! 字节拼装工具

/// 去掉大端整数的前导零（零值得到空切片）
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// 左侧补零到 32 字节；超长时保留低位 32 字节
pub fn left_pad32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let src = if bytes.len() > 32 { &bytes[bytes.len() - 32..] } else { bytes };
    out[32 - src.len()..].copy_from_slice(src);
    out
}

/// u128 → 32 字节大端
pub fn u128_word(value: u128) -> [u8; 32] {
    left_pad32(&value.to_be_bytes())
}

/// Bitcoin CompactSize
pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// 变长前缀的字节串
pub fn write_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_varint(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Solana compact-u16（7 位一组，高位为续接标志）
pub fn write_compact_u16(out: &mut Vec<u8>, mut n: u16) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}
