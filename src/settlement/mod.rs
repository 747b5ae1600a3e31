//! Payout computation per model, as a tagged variant over a closed set
//! of behavior rather than trait objects.

use crate::model::money::{Bps, Cents, apply_bps};
use crate::model::payout::PayoutModel;

#[derive(Debug, Clone)]
pub struct PlacementInput {
    pub account_id: String,
    pub placement: u32,
    pub final_mass: f64,
}

#[derive(Debug, Clone)]
pub struct PayoutOutcome {
    pub account_id: String,
    pub payout: Cents,
}

#[derive(Debug, Clone, Copy)]
pub struct Pot {
    pub pot: Cents,
    pub rake_bps: Bps,
    pub rake_cap: Option<Cents>,
}

impl Pot {
    pub fn rake(&self) -> Cents {
        let raw = apply_bps(self.pot, self.rake_bps);
        match self.rake_cap {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }

    pub fn net_pot(&self) -> Cents {
        self.pot - self.rake()
    }
}

/// Compute payouts for every placement. `placements` MUST already be
/// ordered by rank ascending (rank 1 first); residue from integer division
/// always goes to rank 1, guaranteeing `sum(payouts) + rake == pot` exactly.
pub fn compute_payouts(pot: Pot, model: PayoutModel, placements: &[PlacementInput]) -> Vec<PayoutOutcome> {
    let net_pot = pot.net_pot();

    let raw: Vec<Cents> = match model {
        PayoutModel::WinnerTakeAll => placements
            .iter()
            .map(|p| if p.placement == 1 { net_pot } else { 0 })
            .collect(),
        PayoutModel::Top3Ladder => placements
            .iter()
            .map(|p| match p.placement {
                1 => (net_pot as f64 * 0.65) as Cents,
                2 => (net_pot as f64 * 0.25) as Cents,
                3 => (net_pot as f64 * 0.10) as Cents,
                _ => 0,
            })
            .collect(),
        PayoutModel::Proportional => {
            let total_mass: f64 = placements.iter().map(|p| p.final_mass).sum();
            if total_mass <= 0.0 {
                let share = net_pot / placements.len() as Cents;
                placements.iter().map(|_| share).collect()
            } else {
                placements
                    .iter()
                    .map(|p| ((p.final_mass / total_mass) * net_pot as f64) as Cents)
                    .collect()
            }
        }
    };

    let distributed: Cents = raw.iter().sum();
    let residue = net_pot - distributed;

    let mut outcomes: Vec<PayoutOutcome> = placements
        .iter()
        .zip(raw.into_iter())
        .map(|(p, amount)| PayoutOutcome { account_id: p.account_id.clone(), payout: amount })
        .collect();

    if let Some(rank1) = outcomes
        .iter_mut()
        .zip(placements.iter())
        .find(|(_, p)| p.placement == 1)
        .map(|(o, _)| o)
    {
        rank1.payout += residue;
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(id: &str, rank: u32, mass: f64) -> PlacementInput {
        PlacementInput { account_id: id.to_string(), placement: rank, final_mass: mass }
    }

    #[test]
    fn scenario_s1_winner_take_all() {
        let pot = Pot { pot: 2000, rake_bps: 800, rake_cap: None };
        assert_eq!(pot.rake(), 160);
        assert_eq!(pot.net_pot(), 1840);
        let placements = vec![placement("a", 1, 200.0), placement("b", 2, 50.0)];
        let outcomes = compute_payouts(pot, PayoutModel::WinnerTakeAll, &placements);
        assert_eq!(outcomes[0].payout, 1840);
        assert_eq!(outcomes[1].payout, 0);
    }

    #[test]
    fn scenario_s2_top3_ladder_with_cap() {
        let pot = Pot { pot: 8000, rake_bps: 1000, rake_cap: Some(500) };
        assert_eq!(pot.rake(), 500);
        assert_eq!(pot.net_pot(), 7500);
        let placements = vec![
            placement("a", 1, 400.0),
            placement("b", 2, 300.0),
            placement("c", 3, 200.0),
            placement("d", 4, 100.0),
        ];
        let outcomes = compute_payouts(pot, PayoutModel::Top3Ladder, &placements);
        assert_eq!(outcomes[0].payout, 4875);
        assert_eq!(outcomes[1].payout, 1875);
        assert_eq!(outcomes[2].payout, 750);
        assert_eq!(outcomes[3].payout, 0);
        let total: Cents = outcomes.iter().map(|o| o.payout).sum();
        assert_eq!(total + pot.rake(), pot.pot);
    }

    #[test]
    fn scenario_s3_proportional() {
        let pot = Pot { pot: 15000, rake_bps: 800, rake_cap: None };
        assert_eq!(pot.rake(), 1200);
        assert_eq!(pot.net_pot(), 13800);
        let placements = vec![
            placement("a", 1, 300.0),
            placement("b", 2, 200.0),
            placement("c", 3, 100.0),
        ];
        let outcomes = compute_payouts(pot, PayoutModel::Proportional, &placements);
        assert_eq!(outcomes[0].payout, 6900);
        assert_eq!(outcomes[1].payout, 4600);
        assert_eq!(outcomes[2].payout, 2300);
    }

    #[test]
    fn proportional_zero_mass_splits_evenly_with_residue_to_rank1() {
        let pot = Pot { pot: 1000, rake_bps: 0, rake_cap: None };
        let placements = vec![placement("a", 1, 0.0), placement("b", 2, 0.0), placement("c", 3, 0.0)];
        let outcomes = compute_payouts(pot, PayoutModel::Proportional, &placements);
        let total: Cents = outcomes.iter().map(|o| o.payout).sum();
        assert_eq!(total, 1000);
        assert_eq!(outcomes[0].payout, 334);
    }

    #[test]
    fn sum_plus_rake_always_equals_pot() {
        for pot_amount in [1999i64, 2001, 9999, 10000, 3] {
            let pot = Pot { pot: pot_amount, rake_bps: 733, rake_cap: None };
            let placements = vec![placement("a", 1, 77.0), placement("b", 2, 23.0), placement("c", 3, 5.0)];
            let outcomes = compute_payouts(pot, PayoutModel::Top3Ladder, &placements);
            let total: Cents = outcomes.iter().map(|o| o.payout).sum();
            assert_eq!(total + pot.rake(), pot.pot);
        }
    }
}
