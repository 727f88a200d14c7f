//! 账户/nonce RLP 族编解码器（EVM）
//!
//! - 传统交易 (EIP-155)：签名原像 `keccak(rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]))`，
//!   发送时 `v = recid + 35 + 2 * chainId`
//! - EIP-1559 (类型 0x02)：`keccak(0x02 ‖ rlp([chainId, nonce, maxPriorityFee, maxFee, gasLimit, to, value, data, []]))`，
//!   发送时追加 `yParity, r, s`
//!
//! 代币金额自动转为 ERC-20 transfer 调用，合约调用通过 `EvmExtras::call` 指定。

use k256::ecdsa::VerifyingKey;
use rlp::RlpStream;

use super::{
    ensure_signature_count, evm_calldata, parse_secp256k1, recovery_id, split_rs, TransactionCodec,
};
use crate::{
    domain::{
        address::Eip55AddressStrategy,
        amount::AmountKind,
        chain_config::{ChainConfig, ProtocolFamily},
        fee::Fee,
        public_key::PublicKey,
        transaction::{ContractCall, Preimage, Signature, UncompiledTransaction},
    },
    error::{SdkError, SdkResult, ValidationError},
    utils::{bytes::strip_leading_zeros, crypto::keccak256},
};

/// EIP-1559 交易类型
const EIP1559_TX_TYPE: u8 = 0x02;

/// 待编码的交易字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmFields {
    pub nonce: u64,
    pub gas_limit: u64,
    pub pricing: GasPricing,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPricing {
    Legacy { gas_price: u128 },
    Eip1559 { max_fee_per_gas: u128, max_priority_fee_per_gas: u128 },
}

pub struct EvmCodec {
    chain: ChainConfig,
    chain_id: u64,
    key: VerifyingKey,
}

impl EvmCodec {
    pub fn new(chain: ChainConfig, key: &PublicKey) -> SdkResult<Self> {
        let chain_id = chain
            .evm_chain_id
            .ok_or_else(|| SdkError::config(format!("chain {} has no EVM chain id", chain.id)))?;
        Ok(Self {
            chain,
            chain_id,
            key: key.secp256k1_key()?,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// 交易意图 → 字段
    pub fn fields(&self, transaction: &UncompiledTransaction) -> SdkResult<EvmFields> {
        let extras = transaction.extras.evm()?;
        let nonce = extras.nonce.ok_or(ValidationError::MissingRequiredExtra("nonce"))?;

        let (gas_limit, pricing) = match &transaction.fee {
            Fee::EvmLegacy {
                gas_limit, gas_price, ..
            } => (*gas_limit, GasPricing::Legacy { gas_price: *gas_price }),
            Fee::Evm1559 {
                gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                ..
            } => (
                *gas_limit,
                GasPricing::Eip1559 {
                    max_fee_per_gas: *max_fee_per_gas,
                    max_priority_fee_per_gas: *max_priority_fee_per_gas,
                },
            ),
            other => {
                return Err(ValidationError::UnsupportedOperation(format!(
                    "fee {:?} cannot price an EVM transaction",
                    other
                ))
                .into())
            }
        };

        let (to, value, data) = match &extras.call {
            Some(call) => self.contract_call(transaction, call)?,
            None => match &transaction.amount.kind {
                AmountKind::Token(token) => {
                    let data = evm_calldata::erc20_transfer(
                        &transaction.destination,
                        transaction.amount.to_base_units()?,
                    )?;
                    (Eip55AddressStrategy::parse(&token.contract_address)?, 0, data)
                }
                AmountKind::Coin => {
                    self.check_coin(transaction)?;
                    (
                        Eip55AddressStrategy::parse(&transaction.destination)?,
                        transaction.amount.to_base_units()?,
                        extras.data.clone().unwrap_or_default(),
                    )
                }
                AmountKind::Reserve => {
                    return Err(ValidationError::UnsupportedOperation("reserve amount on EVM chain".into()).into())
                }
            },
        };

        Ok(EvmFields {
            nonce,
            gas_limit,
            pricing,
            to,
            value,
            data,
        })
    }

    fn check_coin(&self, transaction: &UncompiledTransaction) -> Result<(), ValidationError> {
        let amount = &transaction.amount;
        if amount.currency_symbol != self.chain.symbol || amount.decimals != self.chain.decimals {
            return Err(ValidationError::CurrencyMismatch {
                expected: self.chain.symbol.clone(),
                actual: amount.currency_symbol.clone(),
            });
        }
        Ok(())
    }

    fn contract_call(
        &self,
        transaction: &UncompiledTransaction,
        call: &ContractCall,
    ) -> SdkResult<([u8; 20], u128, Vec<u8>)> {
        let (contract, data) = match call {
            ContractCall::Erc20Approve {
                contract,
                spender,
                amount,
            } => {
                let allowance = amount.as_ref().map(|a| a.to_base_units()).transpose()?;
                (contract, evm_calldata::erc20_approve(spender, allowance)?)
            }
            ContractCall::Erc721Transfer { contract, token_id } => (
                contract,
                evm_calldata::erc721_safe_transfer_from(&transaction.source, &transaction.destination, *token_id)?,
            ),
            ContractCall::Erc1155Transfer {
                contract,
                token_id,
                quantity,
                data,
            } => (
                contract,
                evm_calldata::erc1155_safe_transfer_from(
                    &transaction.source,
                    &transaction.destination,
                    *token_id,
                    *quantity,
                    data,
                )?,
            ),
        };
        Ok((Eip55AddressStrategy::parse(contract)?, 0, data))
    }

    fn append_body(&self, stream: &mut RlpStream, fields: &EvmFields) {
        stream.append(&fields.to.to_vec());
        stream.append(&fields.value);
        stream.append(&fields.data);
    }

    /// 未签名编码（签名原像）
    pub fn unsigned_payload(&self, fields: &EvmFields) -> Vec<u8> {
        match fields.pricing {
            GasPricing::Legacy { gas_price } => {
                let mut stream = RlpStream::new();
                stream.begin_list(9);
                stream.append(&fields.nonce);
                stream.append(&gas_price);
                stream.append(&fields.gas_limit);
                self.append_body(&mut stream, fields);
                stream.append(&self.chain_id);
                stream.append(&0u8);
                stream.append(&0u8);
                stream.out().to_vec()
            }
            GasPricing::Eip1559 { .. } => {
                let mut stream = RlpStream::new();
                stream.begin_list(9);
                self.append_1559_fields(&mut stream, fields);
                typed(stream.out().to_vec())
            }
        }
    }

    fn append_1559_fields(&self, stream: &mut RlpStream, fields: &EvmFields) {
        if let GasPricing::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } = fields.pricing
        {
            stream.append(&self.chain_id);
            stream.append(&fields.nonce);
            stream.append(&max_priority_fee_per_gas);
            stream.append(&max_fee_per_gas);
            stream.append(&fields.gas_limit);
            self.append_body(stream, fields);
            // 空 access list
            stream.begin_list(0);
        }
    }

    /// 签名后编码
    pub fn signed_payload(&self, fields: &EvmFields, digest: &[u8], signature: &Signature) -> SdkResult<Vec<u8>> {
        let sig = parse_secp256k1(signature)?;
        let recid = recovery_id(&self.key, digest, &sig)?;
        let (r, s) = split_rs(&sig);
        let r = strip_leading_zeros(&r).to_vec();
        let s = strip_leading_zeros(&s).to_vec();

        Ok(match fields.pricing {
            GasPricing::Legacy { gas_price } => {
                let v = recid.to_byte() as u64 + 35 + 2 * self.chain_id;
                let mut stream = RlpStream::new();
                stream.begin_list(9);
                stream.append(&fields.nonce);
                stream.append(&gas_price);
                stream.append(&fields.gas_limit);
                self.append_body(&mut stream, fields);
                stream.append(&v);
                stream.append(&r);
                stream.append(&s);
                stream.out().to_vec()
            }
            GasPricing::Eip1559 { .. } => {
                let mut stream = RlpStream::new();
                stream.begin_list(12);
                self.append_1559_fields(&mut stream, fields);
                stream.append(&recid.to_byte());
                stream.append(&r);
                stream.append(&s);
                typed(stream.out().to_vec())
            }
        })
    }
}

fn typed(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(EIP1559_TX_TYPE);
    out.extend_from_slice(&payload);
    out
}

impl TransactionCodec for EvmCodec {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Evm
    }

    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
        let fields = self.fields(transaction)?;
        Ok(vec![Preimage::digest(keccak256(&self.unsigned_payload(&fields)))])
    }

    fn build_for_send(
        &self,
        transaction: &UncompiledTransaction,
        signatures: &[Signature],
        preimages: &[Preimage],
    ) -> SdkResult<Vec<u8>> {
        ensure_signature_count(signatures, preimages)?;
        let fields = self.fields(transaction)?;
        let digest = keccak256(&self.unsigned_payload(&fields));
        match signatures {
            [signature] => self.signed_payload(&fields, &digest, signature),
            _ => Err(ValidationError::InvalidSignature(format!("expected 1 signature, got {}", signatures.len())).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{
        amount::{Amount, Token},
        chain_config::ChainRegistry,
        transaction::{EvmExtras, TransactionExtras},
    };

    const WALLET_KEY: &str = "04EB30400CE9D1DEED12B84D4161A1FA922EF4185A155EF3EC208078B3807B126FA22C335081AAEBF161095C11C7D8BD550EF8882A3125B0EE9AE96DDDE1AE743F";
    const SOURCE: &str = "0xb1123efF798183B7Cb32F62607D3D39E950d9cc3";
    const DESTINATION: &str = "0x7655b9b19ffab8b897f836857dae22a1e7f8d735";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn codec() -> EvmCodec {
        let chain = ChainRegistry::new().get("ethereum").unwrap().clone();
        EvmCodec::new(chain, &PublicKey::from_hex(WALLET_KEY).unwrap()).unwrap()
    }

    fn legacy_fee() -> Fee {
        Fee::EvmLegacy {
            amount: Amount::coin(Decimal::new(1, 3), "ETH", 18),
            gas_limit: 21_000,
            gas_price: 0x6E_DF2A_079E,
        }
    }

    fn intent(amount: Amount) -> UncompiledTransaction {
        UncompiledTransaction::new(
            SOURCE,
            DESTINATION,
            amount,
            legacy_fee(),
            TransactionExtras::Evm(EvmExtras {
                nonce: Some(15),
                ..EvmExtras::default()
            }),
        )
    }

    #[test]
    fn test_legacy_coin_transfer_vector() {
        let codec = codec();
        let tx = intent(Amount::coin(Decimal::new(1, 1), "ETH", 18));

        let preimages = codec.build_for_sign(&tx).unwrap();
        assert_eq!(
            hex::encode_upper(&preimages[0].bytes),
            "BDBECF64B443F82D1F9FDA3F2D6BA69AF6D82029B8271339B7E775613AE57761"
        );

        let signature = Signature::from_hex("B945398FB90158761F6D61789B594D042F0F490F9656FBFFAE8F18B49D5F30054F43EE43CCAB2703F0E2E4E61D99CF3D4A875CD759569787CF0AED02415434C6").unwrap();
        let signed = codec.build_for_send(&tx, &[signature], &preimages).unwrap();
        assert_eq!(
            hex::encode_upper(signed),
            "F86C0F856EDF2A079E825208947655B9B19FFAB8B897F836857DAE22A1E7F8D73588016345785D8A00008025A0B945398FB90158761F6D61789B594D042F0F490F9656FBFFAE8F18B49D5F3005A04F43EE43CCAB2703F0E2E4E61D99CF3D4A875CD759569787CF0AED02415434C6"
        );
    }

    #[test]
    fn test_legacy_token_transfer_vector() {
        let codec = codec();
        let token = Token::new("USDC", USDC, 18);
        let tx = intent(Amount::token(Decimal::new(1, 1), &token));

        let preimages = codec.build_for_sign(&tx).unwrap();
        assert_eq!(
            hex::encode_upper(&preimages[0].bytes),
            "2F47B058A0C4A91EC6E26372FA926ACB899235D7A639565B4FC82C7A9356D6C5"
        );

        // s 位于高半区，拼装时归一化
        let signature = Signature::from_hex("F408C40F8D8B4A40E35502355C87FBBF218EC9ECB036D42DAA6211EAD4498A6FBC800E82CB2CC0FAB1D68FD3F8E895EC3E0DCB5A05342F5153210142E4224D4C").unwrap();
        let signed = codec.build_for_send(&tx, &[signature], &preimages).unwrap();
        assert_eq!(
            hex::encode_upper(signed),
            "F8A90F856EDF2A079E82520894A0B86991C6218B36C1D19D4A2E9EB0CE3606EB4880B844A9059CBB0000000000000000000000007655B9B19FFAB8B897F836857DAE22A1E7F8D735000000000000000000000000000000000000000000000000016345785D8A000025A0F408C40F8D8B4A40E35502355C87FBBF218EC9ECB036D42DAA6211EAD4498A6FA0437FF17D34D33F054E29702C07176A127CA1118CAA1470EA6CB15D49EC13F3F5"
        );
    }

    #[test]
    fn test_65_byte_signature_accepted() {
        let codec = codec();
        let tx = intent(Amount::coin(Decimal::new(1, 1), "ETH", 18));
        let preimages = codec.build_for_sign(&tx).unwrap();
        let mut bytes = hex::decode("B945398FB90158761F6D61789B594D042F0F490F9656FBFFAE8F18B49D5F30054F43EE43CCAB2703F0E2E4E61D99CF3D4A875CD759569787CF0AED02415434C6").unwrap();
        bytes.push(0x1b);
        let signed = codec.build_for_send(&tx, &[Signature::new(bytes)], &preimages).unwrap();
        assert_eq!(signed[0], 0xF8);
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let codec = codec();
        let tx = intent(Amount::coin(Decimal::new(1, 1), "ETH", 18));
        let preimages = codec.build_for_sign(&tx).unwrap();
        let err = codec
            .build_for_send(&tx, &[Signature::new(vec![1u8; 64])], &preimages)
            .unwrap_err();
        assert!(matches!(err, SdkError::Validation(ValidationError::InvalidSignature(_))));
    }

    #[test]
    fn test_missing_nonce() {
        let mut tx = intent(Amount::coin(Decimal::new(1, 1), "ETH", 18));
        tx.extras = TransactionExtras::Evm(EvmExtras::default());
        let err = codec().build_for_sign(&tx).unwrap_err();
        assert!(matches!(
            err,
            SdkError::Validation(ValidationError::MissingRequiredExtra("nonce"))
        ));
    }

    #[test]
    fn test_eip1559_is_typed() {
        let codec = codec();
        let mut tx = intent(Amount::coin(Decimal::new(1, 1), "ETH", 18));
        tx.fee = Fee::Evm1559 {
            amount: Amount::coin(Decimal::new(1, 3), "ETH", 18),
            gas_limit: 21_000,
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 1_500_000_000,
        };
        let fields = codec.fields(&tx).unwrap();
        let unsigned = codec.unsigned_payload(&fields);
        assert_eq!(unsigned[0], EIP1559_TX_TYPE);
        // 列表末尾为空 access list
        assert_eq!(*unsigned.last().unwrap(), 0xc0);

        let first = codec.build_for_sign(&tx).unwrap();
        let second = codec.build_for_sign(&tx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_approve_call() {
        let codec = codec();
        let mut tx = intent(Amount::coin(Decimal::ZERO, "ETH", 18));
        tx.extras = TransactionExtras::Evm(EvmExtras {
            nonce: Some(1),
            data: None,
            call: Some(ContractCall::Erc20Approve {
                contract: USDC.into(),
                spender: DESTINATION.into(),
                amount: None,
            }),
        });
        let fields = codec.fields(&tx).unwrap();
        assert_eq!(hex::encode(fields.to), USDC.trim_start_matches("0x"));
        assert_eq!(fields.value, 0);
        assert_eq!(&fields.data[..4], &evm_calldata::ERC20_APPROVE);
        assert_eq!(&fields.data[36..], &[0xff; 32]);
    }

    #[test]
    fn test_utxo_fee_rejected() {
        let mut tx = intent(Amount::coin(Decimal::new(1, 1), "ETH", 18));
        tx.fee = Fee::Common(Amount::coin(Decimal::new(1, 3), "ETH", 18));
        assert!(codec().build_for_sign(&tx).is_err());
    }
}
