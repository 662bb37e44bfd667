/// Wall and manual clocks.
pub mod clock;
pub mod controller;
/// Per-contributor power bookkeeping.
pub mod power_balance;
