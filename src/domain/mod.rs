//! Domain types for the decision-cycle trading agent.
//!
//! This module provides:
//! - Primitives: TimeMs, PositionSide, TradeSide, PositionKey
//! - Exchange-facing data: Kline, Balance, AccountTrade, OrderAck, Position
//! - Decisions and their priority ordering
//! - Trade outcomes and decision-cycle records

pub mod cycle;
pub mod decision;
pub mod market;
pub mod outcome;
pub mod position;
pub mod primitives;

pub use cycle::{AccountSnapshot, DecisionCycleRecord, ExecutionOutcome, LearningSummary};
pub use decision::{sort_by_priority, Action, Decision};
pub use market::{AccountTrade, Balance, Kline, OrderAck};
pub use outcome::{CloseEvent, CloseTrigger, FailureType, FillSource, TradeOutcome};
pub use position::Position;
pub use primitives::{PositionKey, PositionSide, TimeMs, TradeSide};
