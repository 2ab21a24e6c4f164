//! Pure computation engines: indicators, risk governor, reconciliation,
//! close economics and performance analysis. Nothing here performs I/O.

pub mod indicators;
pub mod outcome;
pub mod performance;
pub mod reconciler;
pub mod risk;

pub use indicators::MarketSnapshot;
pub use outcome::build_outcome;
pub use performance::{analyze, sharpe_ratio, PerformanceSummary};
pub use reconciler::{estimate_fill, FillEstimate, PositionBook, ReconcileDiff};
pub use risk::{RiskBreach, RiskGovernor, RiskLimits, RiskState};
