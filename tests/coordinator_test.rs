//! 签名协调器端到端测试：真实编解码器 + 本地签名器 + 模拟节点

mod common;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use common::{chain, d, rpc_result, LocalSecp256k1Signer};
use ironcore_sdk::{
    domain::{
        address::BitcoinAddressStrategy,
        Amount, AddressStrategyFactory, AddressType, EvmExtras, Fee, TransactionExtras,
        UncompiledTransaction, UnspentOutput, UtxoExtras,
    },
    error::{SdkError, SdkResult, SignerError},
    infrastructure::{
        gateway::MultiProviderGateway,
        providers::{BlockbookProvider, EvmJsonRpcProvider, NetworkProvider, ProviderDescriptor},
    },
    service::{
        codec::CodecFactory,
        coin_selection::fund_transaction,
        signing_coordinator::{fan_out_by_chain, Signer, SigningContext, SigningCoordinator},
    },
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

const TIMEOUT: Duration = Duration::from_secs(5);
type ChainTask = Pin<Box<dyn Future<Output = SdkResult<String>> + Send>>;

const DESTINATION: &str = "0x7655b9b19ffab8b897f836857dae22a1e7f8d735";

fn evm_intent(source: &str) -> UncompiledTransaction {
    UncompiledTransaction::new(
        source,
        DESTINATION,
        Amount::coin(d("0.1"), "ETH", 18),
        Fee::EvmLegacy {
            amount: Amount::coin(d("0.00042"), "ETH", 18),
            gas_limit: 21_000,
            gas_price: 20_000_000_000,
        },
        TransactionExtras::Evm(EvmExtras {
            nonce: Some(7),
            ..EvmExtras::default()
        }),
    )
}

#[tokio::test]
async fn test_evm_transfer_through_gateway() {
    let down = MockServer::start().await;
    let node = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_sendRawTransaction" })))
        .respond_with(rpc_result(json!("0xfeed")))
        .expect(1)
        .mount(&node)
        .await;

    let eth = chain("ethereum");
    let signer = LocalSecp256k1Signer::new(7);
    let key = signer.public_key();
    let source = AddressStrategyFactory::for_chain(&eth)
        .make_address(&key, AddressType::Default)
        .unwrap()
        .value;

    let providers: Vec<Arc<dyn NetworkProvider>> = [&down, &node]
        .into_iter()
        .map(|server| {
            Arc::new(EvmJsonRpcProvider::new(&ProviderDescriptor::new(server.uri()), TIMEOUT).unwrap())
                as Arc<dyn NetworkProvider>
        })
        .collect();
    let gateway = Arc::new(MultiProviderGateway::new(providers).unwrap());

    let coordinator = SigningCoordinator::new(
        CodecFactory::for_chain(&eth, key.clone()).unwrap(),
        signer,
        gateway.clone(),
        SigningContext::new("ethereum", key),
    );
    let submitted = coordinator.execute(evm_intent(&source)).await.unwrap();

    assert_eq!(submitted.tx_hash, "0xfeed");
    // 传统交易 RLP 列表
    assert!(submitted.wire_bytes[0] >= 0xf8);
    assert_eq!(gateway.current_index(), 1);

    let requests = node.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["params"][0], format!("0x{}", hex::encode(&submitted.wire_bytes)));
}

#[tokio::test]
async fn test_foreign_signer_fails_at_assembly() {
    let eth = chain("ethereum");
    let wallet = LocalSecp256k1Signer::new(7);
    let other = LocalSecp256k1Signer::new(9);
    let key = wallet.public_key();

    let coordinator = SigningCoordinator::new(
        CodecFactory::for_chain(&eth, key.clone()).unwrap(),
        other,
        Arc::new(EvmJsonRpcProvider::new(&ProviderDescriptor::new("http://127.0.0.1:9"), TIMEOUT).unwrap()),
        SigningContext::new("ethereum", key),
    );
    let err = coordinator.execute(evm_intent(DESTINATION)).await.unwrap_err();
    assert!(matches!(err, SdkError::Validation(_)));
}

#[tokio::test]
async fn test_shared_cancellation_token() {
    let eth = chain("ethereum");
    let signer = LocalSecp256k1Signer::new(7);
    let key = signer.public_key();
    let token = CancellationToken::new();

    let coordinator = SigningCoordinator::new(
        CodecFactory::for_chain(&eth, key.clone()).unwrap(),
        signer,
        Arc::new(EvmJsonRpcProvider::new(&ProviderDescriptor::new("http://127.0.0.1:9"), TIMEOUT).unwrap()),
        SigningContext::new("ethereum", key),
    )
    .with_cancellation(token.clone());

    let built = coordinator.prepare(evm_intent(DESTINATION)).unwrap();
    let signatures = coordinator.sign(&built).await.unwrap();
    let signed = coordinator.assemble(built, signatures).unwrap();

    token.cancel();
    assert!(matches!(coordinator.submit(signed).await, Err(SdkError::Cancelled)));
}

#[tokio::test]
async fn test_bitcoin_multi_input_signing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sendtx/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "btc-tx" })))
        .mount(&server)
        .await;

    let btc = chain("bitcoin");
    let signer = LocalSecp256k1Signer::new(3);
    let key = signer.public_key();
    let source = AddressStrategyFactory::for_chain(&btc)
        .make_address(&key, AddressType::Segwit)
        .unwrap()
        .value;
    let script = BitcoinAddressStrategy::bitcoin_mainnet().script_pubkey(&source).unwrap();
    let destination = AddressStrategyFactory::for_chain(&btc)
        .make_address(&LocalSecp256k1Signer::new(4).public_key(), AddressType::Legacy)
        .unwrap()
        .value;

    let utxos = vec![
        UnspentOutput::new("11".repeat(32), 0, d("0.0006"), script.clone()),
        UnspentOutput::new("22".repeat(32), 1, d("0.0007"), script),
    ];
    let intent = UncompiledTransaction::new(
        source.clone(),
        destination,
        Amount::coin(d("0.001"), "BTC", 8),
        Fee::Common(Amount::coin(d("0.0001"), "BTC", 8)),
        TransactionExtras::Utxo(UtxoExtras {
            unspent_outputs: utxos,
            change_address: None,
        }),
    );

    let provider = BlockbookProvider::new(&ProviderDescriptor::new(server.uri()), &btc, TIMEOUT).unwrap();
    let coordinator = SigningCoordinator::new(
        CodecFactory::for_chain(&btc, key.clone()).unwrap(),
        signer,
        Arc::new(provider),
        SigningContext::new("bitcoin", key),
    );

    let built = coordinator.prepare(intent).unwrap();
    assert_eq!(built.preimages().len(), 2);
    let submitted = coordinator
        .submit(coordinator.assemble(built.clone(), coordinator.sign(&built).await.unwrap()).unwrap())
        .await
        .unwrap();
    assert_eq!(submitted.tx_hash, "btc-tx");
    // 隔离见证标记
    assert_eq!(&submitted.wire_bytes[4..6], &[0x00, 0x01]);
}

#[tokio::test]
async fn test_bitcoin_transfer_funded_from_wallet() {
    let btc = chain("bitcoin");
    let signer = LocalSecp256k1Signer::new(3);
    let key = signer.public_key();
    let source = AddressStrategyFactory::for_chain(&btc)
        .make_address(&key, AddressType::Segwit)
        .unwrap()
        .value;
    let script = BitcoinAddressStrategy::bitcoin_mainnet().script_pubkey(&source).unwrap();
    let destination = AddressStrategyFactory::for_chain(&btc)
        .make_address(&LocalSecp256k1Signer::new(4).public_key(), AddressType::Legacy)
        .unwrap()
        .value;

    let wallet: Vec<UnspentOutput> = (0..6u8)
        .map(|i| UnspentOutput::new(format!("{:02x}", i + 1).repeat(32), 0, d("1"), script.clone()))
        .collect();
    let mut intent = UncompiledTransaction::new(
        source,
        destination,
        Amount::coin(d("0.1"), "BTC", 8),
        Fee::Common(Amount::coin(d("0.001"), "BTC", 8)),
        TransactionExtras::Utxo(UtxoExtras::default()),
    );
    fund_transaction(&mut intent, &wallet, &btc.params).unwrap();

    let coordinator = SigningCoordinator::new(
        CodecFactory::for_chain(&btc, key.clone()).unwrap(),
        signer,
        Arc::new(EvmJsonRpcProvider::new(&ProviderDescriptor::new("http://127.0.0.1:9"), TIMEOUT).unwrap()),
        SigningContext::new("bitcoin", key),
    );
    let signed = coordinator.sign_and_assemble(intent).await.unwrap();
    // 一个 1 BTC 输入已足够
    assert_eq!(signed.transaction().extras.utxo().unwrap().unspent_outputs.len(), 1);
    assert_eq!(signed.wire_bytes()[6], 1);
}

#[tokio::test]
async fn test_fan_out_keeps_chains_independent() {
    let eth = chain("ethereum");
    let signer = LocalSecp256k1Signer::new(7);
    let key = signer.public_key();
    let coordinator = SigningCoordinator::new(
        CodecFactory::for_chain(&eth, key.clone()).unwrap(),
        signer.clone(),
        Arc::new(EvmJsonRpcProvider::new(&ProviderDescriptor::new("http://127.0.0.1:9"), TIMEOUT).unwrap()),
        SigningContext::new("ethereum", key),
    );

    let eth_task: ChainTask = {
        let coordinator = coordinator.clone();
        Box::pin(async move {
            coordinator
                .sign_and_assemble(evm_intent(DESTINATION))
                .await
                .map(|signed| signed.wire_hex())
        })
    };
    let failing_task: ChainTask = Box::pin(async { Err(SdkError::Signer(SignerError::UserCancelled)) });

    let results = fan_out_by_chain(vec![("ethereum".to_string(), eth_task), ("bitcoin".to_string(), failing_task)]).await;
    assert!(results["ethereum"].as_ref().unwrap().starts_with("f8"));
    assert!(matches!(results["bitcoin"], Err(SdkError::Signer(_))));

    // 签名器 trait 对象可以共享
    let _shared: Arc<dyn Signer> = signer;
}
