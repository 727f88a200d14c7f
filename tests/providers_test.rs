//! 节点响应解析集成测试（wiremock 模拟节点）

mod common;

use std::time::Duration;

use common::{chain, d, rpc_result};
use ironcore_sdk::{
    domain::{address::BitcoinAddressStrategy, GasSpeed},
    infrastructure::providers::{
        AlgodProvider, AlgorandNetworkProvider, BlockbookProvider, EvmCallRequest, EvmJsonRpcProvider,
        NetworkProvider, ProviderDescriptor, SolanaNetworkProvider, SolanaRpcProvider, UtxoNetworkProvider,
    },
    service::fee_estimation::{self, EvmFeeMultipliers},
};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, body_string, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const SEGWIT: &str = "bc1qm9wu5ncxk8mqhm3nfmxa552728wkty70marsfl";

#[tokio::test]
async fn test_blockbook_confirmed_utxos_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/utxo/{}", SEGWIT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "txid": "aa", "vout": 0, "value": "150000", "confirmations": 3 },
            { "txid": "bb", "vout": 1, "value": "2000", "confirmations": 0 },
            { "txid": "cc", "vout": 2, "value": "99" , "confirmations": 1 }
        ])))
        .mount(&server)
        .await;

    let provider = BlockbookProvider::new(&ProviderDescriptor::new(server.uri()), &chain("bitcoin"), TIMEOUT).unwrap();
    let utxos = provider.get_unspent_outputs(SEGWIT).await.unwrap();

    assert_eq!(utxos.len(), 2);
    assert_eq!(utxos[0].amount, d("0.0015"));
    assert_eq!(utxos[1].amount, d("0.00000099"));
    let script = BitcoinAddressStrategy::bitcoin_mainnet().script_pubkey(SEGWIT).unwrap();
    assert!(utxos.iter().all(|u| u.script == script));
}

#[tokio::test]
async fn test_blockbook_fee_tiers() {
    let server = MockServer::start().await;
    for (blocks, rate) in [(8, 0.00012294), (4, 0.0001898), (1, 0.00034559)] {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "estimatesmartfee", "params": [blocks] })))
            .respond_with(rpc_result(json!({ "feerate": rate, "blocks": blocks })))
            .mount(&server)
            .await;
    }

    let btc = chain("bitcoin");
    let provider = BlockbookProvider::new(&ProviderDescriptor::new(server.uri()), &btc, TIMEOUT).unwrap();
    let rates = fee_estimation::fetch_utxo_fee_rates(&provider, &btc).await.unwrap();
    assert_eq!(rates, [d("0.00012294"), d("0.0001898"), d("0.00034559")]);

    let tiers = fee_estimation::utxo_fee_tiers(&btc, &btc.params, rates, 222).unwrap();
    assert_eq!(tiers.normal.amount().value, d("0.00004114"));
}

#[tokio::test]
async fn test_blockbook_submit_posts_hex() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sendtx/"))
        .and(body_string("0100ff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "abcd" })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = BlockbookProvider::new(&ProviderDescriptor::new(server.uri()), &chain("bitcoin"), TIMEOUT).unwrap();
    assert_eq!(provider.submit_transaction(&[0x01, 0x00, 0xff]).await.unwrap(), "abcd");
}

#[tokio::test]
async fn test_blockbook_rejects_non_utxo_chain() {
    let descriptor = ProviderDescriptor::new("http://localhost");
    assert!(BlockbookProvider::new(&descriptor, &chain("ethereum"), TIMEOUT).is_err());
}

#[tokio::test]
async fn test_evm_fee_snapshot_to_tiers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_estimateGas" })))
        .respond_with(rpc_result(json!("0x5208")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_gasPrice" })))
        .respond_with(rpc_result(json!("0x3b9aca00")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_feeHistory", "params": [5, "latest", [25, 50, 75]] })))
        .respond_with(rpc_result(json!({
            "oldestBlock": "0x10",
            "baseFeePerGas": ["0x3b9aca00", "0x3b9aca00", "0x77359400"],
            "reward": [["0x0", "0x64", "0xc8"], ["0x2", "0x66", "0xca"]]
        })))
        .mount(&server)
        .await;

    let eth = chain("ethereum");
    let provider = EvmJsonRpcProvider::new(&ProviderDescriptor::new(server.uri()), TIMEOUT).unwrap();
    let call = EvmCallRequest {
        from: "0xb1123efF798183B7Cb32F62607D3D39E950d9cc3".into(),
        to: "0x7655b9b19ffab8b897f836857dae22a1e7f8d735".into(),
        value: Some(1),
        data: None,
    };
    let snapshot = fee_estimation::fetch_evm_snapshot(&provider, &call, true).await.unwrap();
    assert_eq!(snapshot.gas_limit, 21_000);

    let tiers = fee_estimation::evm_fee_tiers(&eth, &snapshot, &EvmFeeMultipliers::default()).unwrap();
    match tiers.get(GasSpeed::Fast) {
        ironcore_sdk::domain::Fee::Evm1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            gas_limit,
            ..
        } => {
            // 基础费 2 gwei × 1.5 + 平均奖励 (200 + 202) / 2
            assert_eq!(*max_priority_fee_per_gas, 201);
            assert_eq!(*max_fee_per_gas, 3_000_000_201);
            assert_eq!(*gas_limit, 21_000);
        }
        other => panic!("unexpected fee {:?}", other),
    }
}

#[tokio::test]
async fn test_algod_params_and_submit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/transactions/params"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "consensus-version": "v38",
            "fee": 0,
            "genesis-hash": "wGHE2Pwdvd7S12BL5FaOP20EGYesN73ktiC1qzkkit8=",
            "genesis-id": "mainnet-v1.0",
            "last-round": 36253878,
            "min-fee": 1000
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/transactions"))
        .and(header("content-type", "application/x-binary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "txId": "ALGOTX" })))
        .mount(&server)
        .await;

    let provider = AlgodProvider::new(&ProviderDescriptor::new(server.uri()), TIMEOUT).unwrap();
    let params = provider.get_transaction_params().await.unwrap();
    assert_eq!(params.min_fee, 1000);
    assert_eq!(params.genesis_id, "mainnet-v1.0");
    assert_eq!(params.genesis_hash[0], 0xc0);
    assert_eq!(params.extras(None).last_round, 36_254_878);

    let algo = chain("algorand");
    let tiers = fee_estimation::algorand_fee(&algo, &algo.params, params.fee_per_byte, params.min_fee, 240).unwrap();
    assert_eq!(tiers.normal.amount().value, d("0.001"));

    assert_eq!(provider.submit_transaction(&[0x82]).await.unwrap(), "ALGOTX");
}

#[tokio::test]
async fn test_solana_blockhash_and_fee() {
    let server = MockServer::start().await;
    let blockhash = bs58::encode([7u8; 32]).into_string();
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getLatestBlockhash" })))
        .respond_with(rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "blockhash": blockhash, "lastValidBlockHeight": 100 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getFeeForMessage" })))
        .respond_with(rpc_result(json!({ "context": { "slot": 1 }, "value": 5000 })))
        .mount(&server)
        .await;

    let provider = SolanaRpcProvider::new(&ProviderDescriptor::new(server.uri()), TIMEOUT).unwrap();
    assert_eq!(provider.get_latest_blockhash().await.unwrap(), [7u8; 32]);

    let lamports = provider.get_fee_for_message(&[1, 2, 3]).await.unwrap();
    let sol = chain("solana");
    let tiers = fee_estimation::fixed_fee(&sol, &sol.params, lamports as u128).unwrap();
    assert_eq!(tiers.priority.amount().value, d("0.000005"));
}

#[tokio::test]
async fn test_solana_expired_blockhash_fee_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!({ "context": { "slot": 1 }, "value": null })))
        .mount(&server)
        .await;

    let provider = SolanaRpcProvider::new(&ProviderDescriptor::new(server.uri()), TIMEOUT).unwrap();
    assert!(provider.get_fee_for_message(&[1]).await.unwrap_err().is_retryable());
}
