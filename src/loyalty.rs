use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

/// Loyalty program: one point per 2 € spent on completed orders, 10 points
/// convert to 1 € of discount.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LoyaltyStats {
    #[schema(value_type = String)]
    pub total_spent: Decimal,
    pub points: i64,
    pub discount_eur: i64,
    pub points_to_next_eur: i64,
}

pub fn loyalty_stats(total_spent: Decimal) -> LoyaltyStats {
    let total_spent = total_spent.round_dp(2);
    let points = (total_spent / Decimal::TWO).floor().to_i64().unwrap_or(0).max(0);
    let discount_eur = points / 10;
    let remainder = points % 10;
    let points_to_next_eur = if remainder == 0 { 0 } else { 10 - remainder };
    LoyaltyStats { total_spent, points, discount_eur, points_to_next_eur }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn zero_spend_gives_zero_everything() {
        let s = loyalty_stats(Decimal::ZERO);
        assert_eq!(s.points, 0);
        assert_eq!(s.discount_eur, 0);
        assert_eq!(s.points_to_next_eur, 0);
    }

    #[test]
    fn points_floor_at_two_eur_per_point() {
        assert_eq!(loyalty_stats(eur(1999)).points, 9); // 19.99 € -> 9 points
        assert_eq!(loyalty_stats(eur(2000)).points, 10);
    }

    #[test]
    fn discount_and_next_threshold() {
        let s = loyalty_stats(eur(6900)); // 69 € -> 34 points
        assert_eq!(s.points, 34);
        assert_eq!(s.discount_eur, 3);
        assert_eq!(s.points_to_next_eur, 6);

        let exact = loyalty_stats(eur(4000)); // 40 € -> 20 points, on a boundary
        assert_eq!(exact.discount_eur, 2);
        assert_eq!(exact.points_to_next_eur, 0);
    }
}
