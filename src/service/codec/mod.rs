//! 协议编解码器
//!
//! 每个协议族一个实现：
//! - `build_for_sign`：由交易意图生成待签名原像（UTXO 每个输入一个，账户模型恰好一个）
//! - `build_for_send`：把外部签名拼装进线路格式，得到可广播的字节
//!
//! 编解码器是纯同步计算，不做任何网络或签名交互，可在任意线程并发调用。

pub mod algorand;
pub mod commit_reveal;
pub mod evm;
pub mod evm_calldata;
pub mod factory;
pub mod msgpack;
pub mod solana;
pub mod utxo;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};

pub use factory::CodecFactory;

use crate::{
    domain::{
        chain_config::ProtocolFamily,
        transaction::{Preimage, Signature, UncompiledTransaction},
    },
    error::{SdkResult, ValidationError},
    utils::bytes::strip_leading_zeros,
};

/// 协议编解码器 trait
pub trait TransactionCodec: Send + Sync {
    fn family(&self) -> ProtocolFamily;

    /// 生成待签名原像
    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>>;

    /// 拼装签名后的线路字节
    fn build_for_send(
        &self,
        transaction: &UncompiledTransaction,
        signatures: &[Signature],
        preimages: &[Preimage],
    ) -> SdkResult<Vec<u8>>;
}

/// 签名数量必须与原像数量一致
pub(crate) fn ensure_signature_count(
    signatures: &[Signature],
    preimages: &[Preimage],
) -> Result<(), ValidationError> {
    if signatures.len() != preimages.len() {
        return Err(ValidationError::InvalidSignature(format!(
            "expected {} signatures, got {}",
            preimages.len(),
            signatures.len()
        )));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// secp256k1 签名处理
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 解析 r‖s(‖v) 签名，s 归一化到低半区
pub(crate) fn parse_secp256k1(signature: &Signature) -> Result<EcdsaSignature, ValidationError> {
    let parsed = EcdsaSignature::from_slice(signature.compact()?)
        .map_err(|e| ValidationError::InvalidSignature(e.to_string()))?;
    Ok(parsed.normalize_s().unwrap_or(parsed))
}

/// 通过公钥恢复确定 recovery id
pub(crate) fn recovery_id(
    key: &VerifyingKey,
    digest: &[u8],
    signature: &EcdsaSignature,
) -> Result<RecoveryId, ValidationError> {
    [false, true]
        .into_iter()
        .map(|odd| RecoveryId::new(odd, false))
        .find(|id| {
            VerifyingKey::recover_from_prehash(digest, signature, *id)
                .map(|recovered| &recovered == key)
                .unwrap_or(false)
        })
        .ok_or_else(|| ValidationError::InvalidSignature("signature does not match wallet key".into()))
}

/// r、s 各自的 32 字节大端表示
pub(crate) fn split_rs(signature: &EcdsaSignature) -> ([u8; 32], [u8; 32]) {
    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    (r, s)
}

/// DER 编码（严格最小编码）
pub(crate) fn der_encode(signature: &EcdsaSignature) -> Vec<u8> {
    fn der_integer(out: &mut Vec<u8>, value: &[u8]) {
        let trimmed = strip_leading_zeros(value);
        let needs_pad = trimmed.first().map_or(true, |b| b & 0x80 != 0);
        out.push(0x02);
        out.push((trimmed.len() + needs_pad as usize) as u8);
        if needs_pad {
            out.push(0x00);
        }
        out.extend_from_slice(trimmed);
    }

    let (r, s) = split_rs(signature);
    let mut body = Vec::with_capacity(70);
    der_integer(&mut body, &r);
    der_integer(&mut body, &s);

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(0x30);
    out.push(body.len() as u8);
    out.extend_from_slice(&body);
    out
}
