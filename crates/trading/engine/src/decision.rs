//! Decision engine: recommendation + budget + price -> order intent
//!
//! Each cycle is independent. There is no position tracking and an intent
//! is never retried: it is logged (dry-run) or submitted once, then dropped.

use crate::advisory::{Action, Recommendation};
use common::constants::trading::QUANTITY_DECIMALS;
use common::{OrderId, OrderRequest, Side, Symbol};
use feeds::ExchangeGateway;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use tracing::{error, info, warn};

/// Order the engine wants placed this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    /// Quote amount the quantity was sized from
    pub budget: Decimal,
    /// Price the quantity was sized at
    pub price: Decimal,
    pub dry_run: bool,
}

impl OrderIntent {
    /// Market order request for this intent
    #[must_use]
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest::market(self.symbol.clone(), self.side, self.quantity)
    }
}

/// Why a cycle produced no order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    Flat,
    InvalidPrice(Decimal),
    InvalidBudget(Decimal),
    /// Sized quantity under the minimum (or zero after truncation)
    BelowMinimum { quantity: Decimal, minimum: Decimal },
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("advisory is flat"),
            Self::InvalidPrice(p) => write!(f, "invalid price {p}"),
            Self::InvalidBudget(b) => write!(f, "invalid budget {b}"),
            Self::BelowMinimum { quantity, minimum } => {
                write!(f, "quantity {quantity} below minimum {minimum}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Order(OrderIntent),
    NoOp(NoOpReason),
}

/// What happened to an intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Logged only
    DryRun,
    Submitted(OrderId),
    /// Gateway refused or failed; the intent is dropped
    Failed(String),
}

/// Sizes and gates orders for one symbol
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    symbol: Symbol,
    dry_run: bool,
}

impl DecisionEngine {
    #[must_use]
    pub fn new(symbol: Symbol, dry_run: bool) -> Self {
        Self { symbol, dry_run }
    }

    /// Turn a recommendation into an order intent or a no-op.
    ///
    /// `quantity = budget / price`, truncated to six decimals.
    #[must_use]
    pub fn decide(
        &self,
        recommendation: &Recommendation,
        budget: Decimal,
        price: Decimal,
        min_quantity: Decimal,
    ) -> Decision {
        let side = match recommendation.action {
            Action::Flat => return Decision::NoOp(NoOpReason::Flat),
            Action::Buy => Side::Buy,
            Action::Sell => Side::Sell,
        };
        if price <= Decimal::ZERO {
            return Decision::NoOp(NoOpReason::InvalidPrice(price));
        }
        if budget <= Decimal::ZERO {
            return Decision::NoOp(NoOpReason::InvalidBudget(budget));
        }

        let Some(raw) = budget.checked_div(price) else {
            return Decision::NoOp(NoOpReason::InvalidPrice(price));
        };
        let quantity = raw
            .round_dp_with_strategy(QUANTITY_DECIMALS, RoundingStrategy::ToZero)
            .normalize();
        if quantity <= Decimal::ZERO || quantity < min_quantity {
            return Decision::NoOp(NoOpReason::BelowMinimum {
                quantity,
                minimum: min_quantity,
            });
        }

        Decision::Order(OrderIntent {
            symbol: self.symbol.clone(),
            side,
            quantity,
            budget,
            price,
            dry_run: self.dry_run,
        })
    }

    /// Log or submit an intent exactly once
    pub async fn execute<G: ExchangeGateway + ?Sized>(
        &self,
        intent: &OrderIntent,
        gateway: &G,
    ) -> ExecutionOutcome {
        if intent.dry_run {
            info!(
                "DRY_RUN: would {} {} {} at ~{} (budget {})",
                intent.side, intent.quantity, intent.symbol, intent.price, intent.budget
            );
            return ExecutionOutcome::DryRun;
        }

        info!(
            "Placing {} {} {} at market (~{})",
            intent.side, intent.quantity, intent.symbol, intent.price
        );
        match gateway.place_order(&intent.to_request()).await {
            Ok(order_id) => {
                info!("Order placed: {}", order_id);
                ExecutionOutcome::Submitted(order_id)
            }
            Err(e) => {
                error!("Order placement failed: {}", e);
                ExecutionOutcome::Failed(e.to_string())
            }
        }
    }

    /// Decide and, when there is an intent, execute it
    pub async fn run_cycle<G: ExchangeGateway + ?Sized>(
        &self,
        recommendation: &Recommendation,
        budget: Decimal,
        price: Decimal,
        min_quantity: Decimal,
        gateway: &G,
    ) -> Option<ExecutionOutcome> {
        match self.decide(recommendation, budget, price, min_quantity) {
            Decision::Order(intent) => Some(self.execute(&intent, gateway).await),
            Decision::NoOp(NoOpReason::Flat) => {
                info!("Advisory suggests flat; no order");
                None
            }
            Decision::NoOp(reason) => {
                warn!("Skipping order: {}", reason);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeds::testing::{StubGateway, test_symbol};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn buy() -> Recommendation {
        Recommendation::new(Action::Buy, 0.9, "test")
    }

    #[test]
    fn test_budget_over_price() {
        let engine = DecisionEngine::new(test_symbol(), false);
        match engine.decide(&buy(), dec("10"), dec("5"), dec("0.000001")) {
            Decision::Order(intent) => {
                assert_eq!(intent.quantity, dec("2"));
                assert_eq!(intent.side, Side::Buy);
                assert!(!intent.dry_run);
            }
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[rstest]
    #[case("10", "5", "3", "below")]
    #[case("10", "0", "0.000001", "price")]
    #[case("10", "-1", "0.000001", "price")]
    #[case("0", "5", "0.000001", "budget")]
    #[case("0.000001", "100", "0", "below")]
    fn test_noop_boundaries(
        #[case] budget: &str,
        #[case] price: &str,
        #[case] min_qty: &str,
        #[case] kind: &str,
    ) {
        let engine = DecisionEngine::new(test_symbol(), false);
        let decision = engine.decide(&buy(), dec(budget), dec(price), dec(min_qty));
        let matched = match (&decision, kind) {
            (Decision::NoOp(NoOpReason::BelowMinimum { .. }), "below") => true,
            (Decision::NoOp(NoOpReason::InvalidPrice(_)), "price") => true,
            (Decision::NoOp(NoOpReason::InvalidBudget(_)), "budget") => true,
            _ => false,
        };
        assert!(matched, "unexpected decision {decision:?}");
    }

    #[test]
    fn test_flat_is_noop() {
        let engine = DecisionEngine::new(test_symbol(), false);
        let flat = Recommendation::flat("nothing to do");
        assert_eq!(
            engine.decide(&flat, dec("10"), dec("5"), dec("0")),
            Decision::NoOp(NoOpReason::Flat)
        );
    }

    #[test]
    fn test_quantity_truncated_to_six_decimals() {
        let engine = DecisionEngine::new(test_symbol(), false);
        let Decision::Order(intent) = engine.decide(&buy(), dec("10"), dec("102"), dec("0.000001"))
        else {
            panic!("expected order");
        };
        assert_eq!(intent.quantity, dec("0.098039"));
    }

    #[test]
    fn test_dry_run_never_calls_gateway() {
        let engine = DecisionEngine::new(test_symbol(), true);
        let gateway = StubGateway::new();
        let outcome = tokio_test::block_on(engine.run_cycle(
            &buy(),
            dec("10"),
            dec("5"),
            dec("0.000001"),
            &gateway,
        ));
        assert_eq!(outcome, Some(ExecutionOutcome::DryRun));
        assert_eq!(gateway.place_calls(), 0);
    }

    #[tokio::test]
    async fn test_live_submits_once() {
        let engine = DecisionEngine::new(test_symbol(), false);
        let gateway = StubGateway::new();
        let outcome = engine
            .run_cycle(&buy(), dec("10"), dec("5"), dec("0.000001"), &gateway)
            .await;
        assert!(matches!(outcome, Some(ExecutionOutcome::Submitted(_))));
        let placed = gateway.placed_orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].quantity, dec("2"));
    }

    #[tokio::test]
    async fn test_failed_order_is_not_retried() {
        let engine = DecisionEngine::new(test_symbol(), false);
        let gateway = StubGateway::new();
        gateway.fail_orders(true);
        let outcome = engine
            .run_cycle(&buy(), dec("10"), dec("5"), dec("0.000001"), &gateway)
            .await;
        assert!(matches!(outcome, Some(ExecutionOutcome::Failed(_))));
        assert_eq!(gateway.place_calls(), 1);
        assert!(gateway.placed_orders().is_empty());
    }

    proptest! {
        #[test]
        fn prop_intent_never_exceeds_budget(budget in 1u32..1_000_000, price_cents in 1u32..10_000_000) {
            let engine = DecisionEngine::new(test_symbol(), true);
            let budget = Decimal::from(budget);
            let price = Decimal::new(i64::from(price_cents), 2);
            if let Decision::Order(intent) = engine.decide(&buy(), budget, price, Decimal::ZERO) {
                prop_assert!(intent.quantity > Decimal::ZERO);
                prop_assert!(intent.quantity * price <= budget);
                prop_assert!(intent.quantity.scale() <= QUANTITY_DECIMALS);
            }
        }
    }
}
