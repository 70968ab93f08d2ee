//! Liquidity Service
//!
//! Off-chain liquidity, quoting, and matching core of the multi-chain
//! spot-exchange gateway. Market makers stream resting price levels;
//! takers request instant quotes or auction fills against a specific
//! order; the service aggregates maker liquidity into a consolidated
//! book and arbitrates the short RFQ auction that assigns each taker
//! order to exactly one maker.
//!
//! # Architecture
//!
//! ```text
//! maker level updates          taker requests
//!        │                           │
//!    ┌───▼────┐              ┌───────┴────────┐
//!    │ Levels │              │                │
//!    └───┬────┘         ┌────▼────┐     ┌─────▼─────┐
//!        │ periodic     │  Query  │     │  Auction  │
//!    ┌───▼────────┐     └────▲────┘     └─────┬─────┘
//!    │ Snapshotter│──────────┤                │
//!    └───┬────────┘     ┌────▼────┐           │
//!        │              │  Quote  │           │
//!        │              └─────────┘           │
//!   ┌────▼────────────────────────────────────▼──┐
//!   │              Broadcast Fabric              │
//!   └────────────────────────────────────────────┘
//! ```
//!
//! All races resolve through the shared TTL maps in `store`; liquidity
//! state is rebuilt from scratch as makers re-subscribe.

pub mod auction;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod levels;
pub mod oracle;
pub mod orders;
pub mod query;
pub mod quote;
pub mod snapshot;
pub mod store;

pub use engine::LiquidityEngine;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
