// Wire-level tests for the OKX REST client against a local mock server

use mockito::Matcher;

use perp_trading_bot::config::ExchangeConfig;
use perp_trading_bot::error::TradingError;
use perp_trading_bot::exchange::{ExchangeClient, OkxClient};

fn client_for(url: &str) -> OkxClient {
    OkxClient::new(&ExchangeConfig {
        rest_url: url.to_string(),
        ws_url: "wss://unused".to_string(),
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
        passphrase: "pass".to_string(),
        simulated: true,
    })
    .unwrap()
}

#[tokio::test]
async fn ticker_parses_last_price() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v5/market/ticker")
        .match_query(Matcher::UrlEncoded(
            "instId".to_string(),
            "SOL-USDT-SWAP".to_string(),
        ))
        .with_body(r#"{"code":"0","msg":"","data":[{"instId":"SOL-USDT-SWAP","last":"142.37"}]}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let price = client.ticker("SOL-USDT-SWAP").await.unwrap();
    assert!((price - 142.37).abs() < 1e-9);
}

#[tokio::test]
async fn candles_are_oldest_first_and_confirmed_only() {
    let mut server = mockito::Server::new_async().await;
    // OKX returns newest first; the middle row is still building
    let body = r#"{"code":"0","msg":"","data":[
        ["180000","101","102","100","101.5","60","0","0","0"],
        ["120000","100","101","99","100.5","55","0","0","1"],
        ["60000","99","100","98","99.5","50","0","0","1"]
    ]}"#;
    let _m = server
        .mock("GET", "/api/v5/market/candles")
        .match_query(Matcher::Any)
        .with_body(body)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let bars = client.candles("SOL-USDT-SWAP", "1m", 3).await.unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].ts, 60_000);
    assert_eq!(bars[1].ts, 120_000);
    assert!((bars[1].close - 100.5).abs() < 1e-9);
}

#[tokio::test]
async fn envelope_error_code_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v5/account/balance")
        .with_body(r#"{"code":"50111","msg":"Invalid OK-ACCESS-KEY","data":[]}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let err = client.account_balance().await.unwrap_err();
    assert!(matches!(err, TradingError::ExchangeRejected(_)));
    assert!(err.to_string().contains("50111"));
}

#[tokio::test]
async fn server_errors_are_transient() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v5/account/balance")
        .with_status(503)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let err = client.account_balance().await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn balance_maps_equity_and_margin() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v5/account/balance")
        .with_body(r#"{"code":"0","msg":"","data":[{"totalEq":"1234.5","imr":"120.25"}]}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let balance = client.account_balance().await.unwrap();
    assert!((balance.equity - 1234.5).abs() < 1e-9);
    assert!((balance.margin_used - 120.25).abs() < 1e-9);
}

#[tokio::test]
async fn positions_map_direction_from_signed_size() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"{"code":"0","msg":"","data":[
        {"instId":"SOL-USDT-SWAP","pos":"-2","avgPx":"140","lever":"5","upl":"-3.2","markPx":"141"},
        {"instId":"ETH-USDT-SWAP","pos":"0","avgPx":"0","lever":"5","upl":"0","markPx":"0"}
    ]}"#;
    let _m = server
        .mock("GET", "/api/v5/account/positions")
        .match_query(Matcher::Any)
        .with_body(body)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let positions = client.positions().await.unwrap();
    // Zero-size rows are dropped
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, "SOL-USDT-SWAP");
    assert_eq!(
        positions[0].direction,
        perp_trading_bot::core::types::Direction::Short
    );
    assert!((positions[0].size - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn order_rejection_surfaces_scode() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"{"code":"0","msg":"","data":[{"ordId":"","sCode":"51008","sMsg":"Insufficient balance"}]}"#;
    let _m = server
        .mock("POST", "/api/v5/trade/cancel-order")
        .with_body(body)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let err = client
        .cancel_order("SOL-USDT-SWAP", "ord-1")
        .await
        .unwrap_err();
    assert!(matches!(err, TradingError::ExchangeRejected(_)));
    assert!(err.to_string().contains("51008"));
}
