//! 合约调用数据：`methodSelector ‖ leftPad32(args...)`

use crate::{
    domain::address::Eip55AddressStrategy,
    error::ValidationError,
    utils::bytes::{left_pad32, u128_word},
};

pub const ERC20_TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
pub const ERC20_APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
/// safeTransferFrom(address,address,uint256)
pub const ERC721_SAFE_TRANSFER_FROM: [u8; 4] = [0x42, 0x84, 0x2e, 0x0e];
/// safeTransferFrom(address,address,uint256,uint256,bytes)
pub const ERC1155_SAFE_TRANSFER_FROM: [u8; 4] = [0xf2, 0x42, 0x43, 0x2a];

/// 无限授权
pub const UNLIMITED_ALLOWANCE: [u8; 32] = [0xff; 32];

/// ABI 编码器
#[derive(Debug, Default)]
pub struct CallData {
    bytes: Vec<u8>,
}

impl CallData {
    pub fn new(selector: [u8; 4]) -> Self {
        let mut bytes = Vec::with_capacity(4 + 32 * 5);
        bytes.extend_from_slice(&selector);
        Self { bytes }
    }

    pub fn address(mut self, address: &str) -> Result<Self, ValidationError> {
        let raw = Eip55AddressStrategy::parse(address)?;
        self.bytes.extend_from_slice(&left_pad32(&raw));
        Ok(self)
    }

    pub fn uint(mut self, value: u128) -> Self {
        self.bytes.extend_from_slice(&u128_word(value));
        self
    }

    pub fn word(mut self, word: [u8; 32]) -> Self {
        self.bytes.extend_from_slice(&word);
        self
    }

    /// 动态 bytes 尾部：长度 + 右补零到 32 字节倍数
    pub fn dynamic_bytes(mut self, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(&u128_word(data.len() as u128));
        self.bytes.extend_from_slice(data);
        let rem = data.len() % 32;
        if rem != 0 {
            self.bytes.resize(self.bytes.len() + 32 - rem, 0);
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn erc20_transfer(to: &str, amount: u128) -> Result<Vec<u8>, ValidationError> {
    Ok(CallData::new(ERC20_TRANSFER).address(to)?.uint(amount).finish())
}

/// `amount` 为空时授权额度为 `0xFF..FF`
pub fn erc20_approve(spender: &str, amount: Option<u128>) -> Result<Vec<u8>, ValidationError> {
    let call = CallData::new(ERC20_APPROVE).address(spender)?;
    Ok(match amount {
        Some(value) => call.uint(value),
        None => call.word(UNLIMITED_ALLOWANCE),
    }
    .finish())
}

pub fn erc721_safe_transfer_from(from: &str, to: &str, token_id: u128) -> Result<Vec<u8>, ValidationError> {
    Ok(CallData::new(ERC721_SAFE_TRANSFER_FROM)
        .address(from)?
        .address(to)?
        .uint(token_id)
        .finish())
}

pub fn erc1155_safe_transfer_from(
    from: &str,
    to: &str,
    token_id: u128,
    quantity: u128,
    data: &[u8],
) -> Result<Vec<u8>, ValidationError> {
    // 5 个头部参数之后是 bytes 的内容
    const DATA_OFFSET: u128 = 32 * 5;
    Ok(CallData::new(ERC1155_SAFE_TRANSFER_FROM)
        .address(from)?
        .address(to)?
        .uint(token_id)
        .uint(quantity)
        .uint(DATA_OFFSET)
        .dynamic_bytes(data)
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::keccak256;

    const TO: &str = "0x7655b9b19ffab8b897f836857dae22a1e7f8d735";

    #[test]
    fn test_selectors_match_signatures() {
        let selector = |sig: &str| {
            let mut out = [0u8; 4];
            out.copy_from_slice(&keccak256(sig.as_bytes())[..4]);
            out
        };
        assert_eq!(selector("transfer(address,uint256)"), ERC20_TRANSFER);
        assert_eq!(selector("approve(address,uint256)"), ERC20_APPROVE);
        assert_eq!(
            selector("safeTransferFrom(address,address,uint256)"),
            ERC721_SAFE_TRANSFER_FROM
        );
        assert_eq!(
            selector("safeTransferFrom(address,address,uint256,uint256,bytes)"),
            ERC1155_SAFE_TRANSFER_FROM
        );
    }

    #[test]
    fn test_erc20_transfer() {
        let data = erc20_transfer(TO, 100_000_000_000_000_000).unwrap();
        assert_eq!(
            hex::encode(data),
            "a9059cbb0000000000000000000000007655b9b19ffab8b897f836857dae22a1e7f8d735000000000000000000000000000000000000000000000000016345785d8a0000"
        );
    }

    #[test]
    fn test_unlimited_approve() {
        let data = erc20_approve(TO, None).unwrap();
        assert_eq!(data.len(), 68);
        assert_eq!(&data[36..], &[0xff; 32]);
    }

    #[test]
    fn test_erc1155_dynamic_data() {
        let data = erc1155_safe_transfer_from(TO, TO, 7, 2, &[0xde, 0xad]).unwrap();
        // selector + 5 个头部字 + 长度字 + 1 个数据字
        assert_eq!(data.len(), 4 + 32 * 7);
        assert_eq!(data[4 + 32 * 4 + 31], 0xa0);
        assert_eq!(data[4 + 32 * 5 + 31], 2);
        assert_eq!(&data[4 + 32 * 6..4 + 32 * 6 + 2], &[0xde, 0xad]);
    }

    #[test]
    fn test_invalid_address() {
        assert!(erc721_safe_transfer_from("0x1234", TO, 1).is_err());
    }
}
