/// Integer minor-unit money amount (cents). Never a float.
pub type Cents = i64;

/// Basis points, 0..=10000.
pub type Bps = u32;

pub fn apply_bps(amount: Cents, bps: Bps) -> Cents {
    (amount * bps as i64) / 10_000
}
