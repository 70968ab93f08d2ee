//! Ladder quote engine
//!
//! Prices a requested size by walking the opposite side of the
//! consolidated book: buying base walks the asks, selling base walks
//! the bids. The walk accumulates both legs level by level (partial
//! take at the crossing level); the per-market fee folds in
//! asymmetrically and a fixed slippage buffer derives the indicative
//! soft price from the guaranteed hard price.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use types::errors::CoreError;
use types::ids::{ChainId, MarketId};
use types::market::{BookLevel, MarketCatalog, MarketSpec};
use types::numeric::Quantity;
use types::order::Side;

use crate::config::CoreConfig;
use crate::snapshot::SnapshotCache;
use crate::store::BookKey;

/// A priced quote: the hard quantities are guaranteed against the
/// snapshot the walk saw; the soft price pads the taker-unfavorable
/// direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub market: MarketId,
    pub side: Side,
    pub hard_base_quantity: Decimal,
    pub hard_quote_quantity: Decimal,
    pub hard_price: Decimal,
    pub soft_price: Decimal,
}

/// Which leg the caller sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizedLeg {
    Base(Decimal),
    Quote(Decimal),
}

/// Quote engine reading the snapshotter's cache by handle.
pub struct LadderQuoteEngine {
    cache: Arc<SnapshotCache>,
    catalog: Arc<MarketCatalog>,
    config: CoreConfig,
}

impl LadderQuoteEngine {
    pub fn new(cache: Arc<SnapshotCache>, catalog: Arc<MarketCatalog>, config: CoreConfig) -> Self {
        Self {
            cache,
            catalog,
            config,
        }
    }

    /// Price `base_size` or `quote_size` (exactly one) for a taker on
    /// `side`. Side is the taker's: Bid buys base, Ask sells base.
    pub fn quote(
        &self,
        chain: ChainId,
        market: &MarketId,
        side: Side,
        base_size: Option<Quantity>,
        quote_size: Option<Quantity>,
        now: i64,
    ) -> Result<Quote, CoreError> {
        let leg = match (base_size, quote_size) {
            (Some(base), None) => SizedLeg::Base(base.as_decimal()),
            (None, Some(quote)) => SizedLeg::Quote(quote.as_decimal()),
            _ => {
                return Err(CoreError::Validation(
                    "exactly one of baseSize and quoteSize must be set".to_string(),
                ))
            }
        };
        let requested = match leg {
            SizedLeg::Base(v) | SizedLeg::Quote(v) => v,
        };
        if requested <= Decimal::ZERO {
            return Err(CoreError::Validation(
                "requested size must be positive".to_string(),
            ));
        }

        let spec = self
            .catalog
            .get(market)
            .ok_or_else(|| CoreError::Validation(format!("unknown market '{}'", market)))?;

        let key = BookKey::new(chain, market.clone());
        let book = self.cache.book(&key, now).ok_or_else(|| {
            CoreError::InsufficientLiquidity {
                requested,
                available: Decimal::ZERO,
            }
        })?;

        // Buying base consumes asks; selling base consumes bids.
        let ladder = match side {
            Side::Bid => &book.asks,
            Side::Ask => &book.bids,
        };

        let (raw_base, raw_quote) = walk_ladder(ladder, leg)?;
        debug!(%market, side = side.label(), %raw_base, %raw_quote, "ladder walk complete");

        let (hard_base, hard_quote) = fold_fee(spec, side, leg, raw_base, raw_quote);
        if hard_base <= Decimal::ZERO || hard_quote <= Decimal::ZERO {
            return Err(CoreError::Internal(format!(
                "degenerate quote legs: base {}, quote {}",
                hard_base, hard_quote
            )));
        }

        let hard_price = hard_quote
            .checked_div(hard_base)
            .ok_or_else(|| CoreError::Internal("hard price division failed".to_string()))?;
        if hard_price <= Decimal::ZERO {
            return Err(CoreError::Internal(format!(
                "degenerate hard price {}",
                hard_price
            )));
        }

        let buffer = match leg {
            SizedLeg::Base(_) => self.config.slippage_base_leg,
            SizedLeg::Quote(_) => self.config.slippage_quote_leg,
        };
        // Nudge against the taker: buyers see a higher soft price,
        // sellers a lower one.
        let soft_price = match side {
            Side::Bid => hard_price * (Decimal::ONE + buffer),
            Side::Ask => hard_price * (Decimal::ONE - buffer),
        };
        if soft_price <= Decimal::ZERO {
            return Err(CoreError::Internal(format!(
                "degenerate soft price {}",
                soft_price
            )));
        }

        Ok(Quote {
            market: market.clone(),
            side,
            hard_base_quantity: hard_base,
            hard_quote_quantity: hard_quote,
            hard_price,
            soft_price,
        })
    }
}

/// Walk the ladder accumulating both legs until the sized leg crosses
/// its threshold. Errors with insufficient-liquidity on exhaustion —
/// no partial quote.
fn walk_ladder(ladder: &[BookLevel], leg: SizedLeg) -> Result<(Decimal, Decimal), CoreError> {
    let mut base = Decimal::ZERO;
    let mut quote = Decimal::ZERO;

    match leg {
        SizedLeg::Base(target) => {
            let mut remaining = target;
            for level in ladder {
                let price = level.price.as_decimal();
                let size = level.size.as_decimal();
                let take = remaining.min(size);
                base += take;
                quote += take * price;
                remaining -= take;
                if remaining.is_zero() {
                    return Ok((base, quote));
                }
            }
            Err(CoreError::InsufficientLiquidity {
                requested: target,
                available: base,
            })
        }
        SizedLeg::Quote(target) => {
            let mut remaining = target;
            for level in ladder {
                let price = level.price.as_decimal();
                let size = level.size.as_decimal();
                let level_quote = price * size;
                if level_quote <= remaining {
                    base += size;
                    quote += level_quote;
                    remaining -= level_quote;
                } else {
                    // Crossing level: price > 0 here since level_quote > remaining ≥ 0.
                    base += remaining / price;
                    quote += remaining;
                    remaining = Decimal::ZERO;
                }
                if remaining.is_zero() {
                    return Ok((base, quote));
                }
            }
            Err(CoreError::InsufficientLiquidity {
                requested: target,
                available: quote,
            })
        }
    }
}

/// Apply the per-market fee to the derived leg, decimals-aware.
///
/// The sized leg is what the taker asked for and stays fixed; the fee
/// moves the other leg against the taker.
fn fold_fee(
    spec: &MarketSpec,
    side: Side,
    leg: SizedLeg,
    raw_base: Decimal,
    raw_quote: Decimal,
) -> (Decimal, Decimal) {
    let fee = spec.fee_rate;
    match (side, leg) {
        // Buyer pays the fee in quote.
        (Side::Bid, SizedLeg::Base(_)) => {
            (spec.round_base(raw_base), spec.round_quote(raw_quote * (Decimal::ONE + fee)))
        }
        // Buyer receives less base for a fixed quote spend.
        (Side::Bid, SizedLeg::Quote(_)) => {
            (spec.round_base(raw_base * (Decimal::ONE - fee)), spec.round_quote(raw_quote))
        }
        // Seller receives less quote.
        (Side::Ask, SizedLeg::Base(_)) => {
            (spec.round_base(raw_base), spec.round_quote(raw_quote * (Decimal::ONE - fee)))
        }
        // Seller must cover more base to net a fixed quote amount.
        (Side::Ask, SizedLeg::Quote(_)) => {
            (spec.round_base(raw_base * (Decimal::ONE + fee)), spec.round_quote(raw_quote))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastFabric;
    use crate::levels::{LevelSubmission, LiquidityStore};
    use crate::oracle::StaticPriceOracle;
    use crate::snapshot::{BookSnapshotter, VolumeTracker};
    use crate::store::TtlMap;
    use std::str::FromStr;
    use types::ids::AccountId;
    use types::market::MarketSpec;

    const T0: i64 = 1_708_123_456_789_000_000;

    fn catalog(fee: &str) -> Arc<MarketCatalog> {
        let mut catalog = MarketCatalog::new();
        catalog.register(MarketSpec {
            market: MarketId::new("ETH/USDT"),
            price_decimals: 4,
            base_decimals: 8,
            quote_decimals: 8,
            fee_rate: Decimal::from_str(fee).unwrap(),
            min_base_size: Quantity::from_str("0.001").unwrap(),
        });
        Arc::new(catalog)
    }

    fn engine_with_book(fee: &str, rows: Vec<LevelSubmission>) -> LadderQuoteEngine {
        let oracle = StaticPriceOracle::new();
        oracle.set("ETH", Decimal::from(100));

        let config = CoreConfig::default();
        let catalog = catalog(fee);
        let levels = Arc::new(LiquidityStore::new(
            Arc::clone(&catalog),
            Arc::new(oracle),
            Arc::new(TtlMap::new()),
            config.clone(),
        ));
        let cache = Arc::new(SnapshotCache::new());
        let snapshotter = BookSnapshotter::new(
            Arc::clone(&levels),
            Arc::clone(&cache),
            Arc::new(VolumeTracker::new()),
            BroadcastFabric::new(8),
            config.clone(),
        );

        levels
            .update_liquidity(ChainId::new(1), &MarketId::new("ETH/USDT"), AccountId::new(), rows, T0)
            .unwrap();
        snapshotter.sweep(T0 + 1);

        LadderQuoteEngine::new(cache, catalog, config)
    }

    fn level(side: &str, price: &str, size: &str) -> LevelSubmission {
        LevelSubmission {
            side: side.to_string(),
            price: price.to_string(),
            size: size.to_string(),
            expires_at: None,
        }
    }

    fn scenario_rows() -> Vec<LevelSubmission> {
        vec![
            level("BID", "100", "2"),
            level("BID", "99", "3"),
            level("ASK", "101", "2"),
            level("ASK", "102", "4"),
        ]
    }

    #[test]
    fn test_exactly_one_leg_required() {
        let engine = engine_with_book("0", scenario_rows());
        let market = MarketId::new("ETH/USDT");

        let err = engine
            .quote(ChainId::new(1), &market, Side::Bid, None, None, T0 + 2)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = engine
            .quote(
                ChainId::new(1),
                &market,
                Side::Bid,
                Some(Quantity::from_u64(1)),
                Some(Quantity::from_u64(100)),
                T0 + 2,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_buy_walks_asks_weighted_price() {
        // Buy 3 base against asks (101,2),(102,4), fee 0:
        // hard quote 2·101 + 1·102 = 304, hard price 304/3 ≈ 101.33.
        let engine = engine_with_book("0", scenario_rows());
        let quote = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Bid,
                Some(Quantity::from_u64(3)),
                None,
                T0 + 2,
            )
            .unwrap();

        assert_eq!(quote.hard_base_quantity, Decimal::from(3));
        assert_eq!(quote.hard_quote_quantity, Decimal::from(304));
        assert_eq!(
            quote.hard_price,
            Decimal::from(304) / Decimal::from(3)
        );
        // Soft price padded upward for a buyer.
        assert!(quote.soft_price > quote.hard_price);
    }

    #[test]
    fn test_sell_walks_bids_and_pads_down() {
        let engine = engine_with_book("0", scenario_rows());
        let quote = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Ask,
                Some(Quantity::from_u64(3)),
                None,
                T0 + 2,
            )
            .unwrap();

        // 2@100 + 1@99 = 299
        assert_eq!(quote.hard_quote_quantity, Decimal::from(299));
        assert_eq!(
            quote.hard_price,
            quote.hard_quote_quantity / quote.hard_base_quantity
        );
        assert!(quote.soft_price < quote.hard_price);
    }

    #[test]
    fn test_quote_leg_partial_crossing() {
        let engine = engine_with_book("0", scenario_rows());
        // Spend 253 quote buying base: 2@101 = 202, then 51/102 = 0.5 base.
        let quote = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Bid,
                None,
                Some(Quantity::from_u64(253)),
                T0 + 2,
            )
            .unwrap();

        assert_eq!(quote.hard_quote_quantity, Decimal::from(253));
        assert_eq!(quote.hard_base_quantity, Decimal::from_str("2.5").unwrap());
    }

    #[test]
    fn test_exhaustion_fails_without_price() {
        let engine = engine_with_book("0", scenario_rows());
        let err = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Bid,
                Some(Quantity::from_u64(10)),
                None,
                T0 + 2,
            )
            .unwrap_err();

        match err {
            CoreError::InsufficientLiquidity { requested, available } => {
                assert_eq!(requested, Decimal::from(10));
                assert_eq!(available, Decimal::from(6));
            }
            other => panic!("expected InsufficientLiquidity, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_snapshot_is_insufficient_liquidity() {
        let engine = engine_with_book("0", scenario_rows());
        // Quote after the snapshot TTL has elapsed.
        let err = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Bid,
                Some(Quantity::from_u64(1)),
                None,
                T0 + 20 * crate::store::NANOS_PER_SEC,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn test_fee_fold_asymmetry() {
        // 10 bps fee. Buy 2 base at 101 → raw quote 202.
        let engine = engine_with_book("0.001", scenario_rows());
        let market = MarketId::new("ETH/USDT");

        let buy = engine
            .quote(ChainId::new(1), &market, Side::Bid, Some(Quantity::from_u64(2)), None, T0 + 2)
            .unwrap();
        assert_eq!(buy.hard_quote_quantity, Decimal::from_str("202.202").unwrap());

        // Sell 2 base at 100 → raw quote 200, seller nets less.
        let sell = engine
            .quote(ChainId::new(1), &market, Side::Ask, Some(Quantity::from_u64(2)), None, T0 + 2)
            .unwrap();
        assert_eq!(sell.hard_quote_quantity, Decimal::from_str("199.8").unwrap());

        // Quote-sized legs move the base leg instead.
        let buy_q = engine
            .quote(ChainId::new(1), &market, Side::Bid, None, Some(Quantity::from_u64(202)), T0 + 2)
            .unwrap();
        assert_eq!(buy_q.hard_quote_quantity, Decimal::from(202));
        assert_eq!(buy_q.hard_base_quantity, Decimal::from_str("1.998").unwrap());
    }

    #[test]
    fn test_hard_price_is_quote_over_base() {
        let engine = engine_with_book("0.001", scenario_rows());
        let quote = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Ask,
                Some(Quantity::from_u64(3)),
                None,
                T0 + 2,
            )
            .unwrap();

        assert_eq!(
            quote.hard_price,
            quote.hard_quote_quantity / quote.hard_base_quantity
        );
    }

    #[test]
    fn test_soft_buffer_depends_on_sized_leg() {
        let engine = engine_with_book("0", scenario_rows());
        let market = MarketId::new("ETH/USDT");

        let by_base = engine
            .quote(ChainId::new(1), &market, Side::Bid, Some(Quantity::from_u64(2)), None, T0 + 2)
            .unwrap();
        let by_quote = engine
            .quote(ChainId::new(1), &market, Side::Bid, None, Some(Quantity::from_u64(202)), T0 + 2)
            .unwrap();

        // Same walk, but the quote-sized request carries the wider buffer.
        assert_eq!(by_base.hard_price, by_quote.hard_price);
        assert!(by_quote.soft_price > by_base.soft_price);
    }

    #[test]
    fn test_zero_size_rejected() {
        let engine = engine_with_book("0", scenario_rows());
        let err = engine
            .quote(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                Side::Bid,
                Some(Quantity::zero()),
                None,
                T0 + 2,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
