//! End-to-end book flow tests
//!
//! Drives the assembled engine through the maker → sweep → query/quote
//! path and checks the observable contract:
//! - valid levels survive into the next snapshot verbatim
//! - below-minimum sizes vanish silently
//! - replacement semantics (resubmission is idempotent)
//! - quoting against the walked ladder, including exhaustion
//! - drained markets read as empty books, never errors

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use liquidity::config::CoreConfig;
use liquidity::engine::LiquidityEngine;
use liquidity::levels::LevelSubmission;
use liquidity::oracle::StaticPriceOracle;
use liquidity::orders::InMemoryOrderStore;
use liquidity::query::BookGranularity;
use types::errors::CoreError;
use types::ids::{AccountId, ChainId, MarketId};
use types::market::{MarketCatalog, MarketSpec};
use types::numeric::{Price, Quantity};
use types::order::Side;

fn catalog() -> Arc<MarketCatalog> {
    let mut catalog = MarketCatalog::new();
    catalog.register(MarketSpec {
        market: MarketId::new("ETH/USDT"),
        price_decimals: 2,
        base_decimals: 6,
        quote_decimals: 6,
        fee_rate: Decimal::ZERO,
        min_base_size: Quantity::from_str("0.01").unwrap(),
    });
    Arc::new(catalog)
}

fn engine() -> LiquidityEngine {
    let oracle = StaticPriceOracle::new();
    oracle.set("ETH", Decimal::from(100));

    LiquidityEngine::new(
        CoreConfig::default(),
        catalog(),
        Arc::new(oracle),
        Arc::new(InMemoryOrderStore::new()),
    )
}

fn level(side: &str, price: &str, size: &str) -> LevelSubmission {
    LevelSubmission {
        side: side.to_string(),
        price: price.to_string(),
        size: size.to_string(),
        expires_at: None,
    }
}

fn seed_scenario_book(engine: &LiquidityEngine, maker: AccountId) {
    // bids [(100,2),(99,3)], asks [(101,2),(102,4)], fee 0.
    let errors = engine
        .update_liquidity(
            ChainId::new(1),
            &MarketId::new("ETH/USDT"),
            maker,
            vec![
                level("BID", "100", "2"),
                level("BID", "99", "3"),
                level("ASK", "101", "2"),
                level("ASK", "102", "4"),
            ],
        )
        .unwrap();
    assert!(errors.is_empty());
    engine.sweep_once();
}

#[tokio::test]
async fn test_valid_levels_survive_dust_drops_silently() {
    let engine = engine();
    let market = MarketId::new("ETH/USDT");

    // ETH at $100 with a $10 floor → minimum size 0.1.
    let errors = engine
        .update_liquidity(
            ChainId::new(1),
            &market,
            AccountId::new(),
            vec![
                level("BID", "100", "0.05"), // below minimum, silent
                level("BID", "100", "2"),
            ],
        )
        .unwrap();
    assert!(errors.is_empty(), "dust must not produce an error string");

    engine.sweep_once();
    let view = engine.get_order_book(ChainId::new(1), &market, None, BookGranularity::Full);
    assert_eq!(view.bids.len(), 1);
    assert_eq!(view.bids[0].price, Price::from_u64(100));
    assert_eq!(view.bids[0].size, Quantity::from_u64(2));
}

#[tokio::test]
async fn test_resubmission_yields_identical_snapshot() {
    let engine = engine();
    let market = MarketId::new("ETH/USDT");
    let maker = AccountId::new();

    seed_scenario_book(&engine, maker);
    let first = engine.get_order_book(ChainId::new(1), &market, None, BookGranularity::Full);

    seed_scenario_book(&engine, maker);
    let second = engine.get_order_book(ChainId::new(1), &market, None, BookGranularity::Full);

    assert_eq!(first.bids, second.bids);
    assert_eq!(first.asks, second.asks);
}

#[tokio::test]
async fn test_level1_and_walked_quote_scenario() {
    let engine = engine();
    let market = MarketId::new("ETH/USDT");
    seed_scenario_book(&engine, AccountId::new());

    let top = engine.get_order_book(ChainId::new(1), &market, None, BookGranularity::Top);
    assert_eq!(top.best_bid, Some(Price::from_u64(100)));
    assert_eq!(top.best_ask, Some(Price::from_u64(101)));

    // Buy 3 base: 2@101 + 1@102 → 304 quote, ≈101.33 per base.
    let quote = engine
        .quote(
            ChainId::new(1),
            &market,
            Side::Bid,
            Some(Quantity::from_u64(3)),
            None,
        )
        .unwrap();
    assert_eq!(quote.hard_base_quantity, Decimal::from(3));
    assert_eq!(quote.hard_quote_quantity, Decimal::from(304));
    assert_eq!(quote.hard_price, Decimal::from(304) / Decimal::from(3));
}

#[tokio::test]
async fn test_sell_quote_price_identity() {
    let engine = engine();
    let market = MarketId::new("ETH/USDT");
    seed_scenario_book(&engine, AccountId::new());

    let quote = engine
        .quote(
            ChainId::new(1),
            &market,
            Side::Ask,
            Some(Quantity::from_u64(3)),
            None,
        )
        .unwrap();
    assert_eq!(
        quote.hard_price,
        quote.hard_quote_quantity / quote.hard_base_quantity
    );
}

#[tokio::test]
async fn test_quote_beyond_depth_fails_without_price() {
    let engine = engine();
    let market = MarketId::new("ETH/USDT");
    seed_scenario_book(&engine, AccountId::new());

    // Total visible asks: 6 base.
    let err = engine
        .quote(
            ChainId::new(1),
            &market,
            Side::Bid,
            Some(Quantity::from_u64(7)),
            None,
        )
        .unwrap_err();
    match err {
        CoreError::InsufficientLiquidity { requested, available } => {
            assert_eq!(requested, Decimal::from(7));
            assert_eq!(available, Decimal::from(6));
        }
        other => panic!("expected InsufficientLiquidity, got {:?}", other),
    }
}

#[tokio::test]
async fn test_withdrawn_market_reads_empty_not_error() {
    let engine = engine();
    let market = MarketId::new("ETH/USDT");
    let maker = AccountId::new();
    seed_scenario_book(&engine, maker);

    let before = engine.get_order_book(ChainId::new(1), &market, None, BookGranularity::Full);
    assert!(!before.is_empty());

    // The maker withdraws its last resting levels.
    engine
        .update_liquidity(ChainId::new(1), &market, maker, vec![])
        .unwrap();
    engine.sweep_once();

    let after = engine.get_order_book(ChainId::new(1), &market, None, BookGranularity::Full);
    assert!(after.bids.is_empty());
    assert!(after.asks.is_empty());
}
