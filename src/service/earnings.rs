// service/earnings.rs
//
// Pure earnings math for settling appointments. No I/O; every amount
// is integer cents. The splitting rules guarantee that worker net
// shares always sum to exactly the post-fee net, whatever the rounding
// does to individual shares.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerShare {
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
    pub percent_of_work: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsSplit {
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
    pub shares: Vec<WorkerShare>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoloEarnings {
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialPayment {
    pub partial_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
    pub percent_complete: i32,
}

pub fn platform_fee(total_cents: i64, fee_percent: f64) -> i64 {
    (total_cents as f64 * fee_percent / 100.0).round() as i64
}

/// Split an appointment price evenly across `worker_count` cleaners.
///
/// The integer remainder of both the net and the fee goes to worker 0
/// (first in assignment order), so shares always sum back to the
/// exact net and fee.
pub fn equal_split(total_cents: i64, fee_percent: f64, worker_count: usize) -> EarningsSplit {
    let fee = platform_fee(total_cents, fee_percent);
    let net = total_cents - fee;

    if worker_count == 0 {
        return EarningsSplit {
            gross_cents: total_cents,
            platform_fee_cents: fee,
            net_cents: net,
            shares: Vec::new(),
        };
    }

    let n = worker_count as i64;
    let net_base = net / n;
    let net_remainder = net - net_base * n;
    let fee_base = fee / n;
    let fee_remainder = fee - fee_base * n;
    let percent = (100.0 / worker_count as f64).round() as i32;

    let shares = (0..worker_count)
        .map(|i| {
            let net_share = if i == 0 { net_base + net_remainder } else { net_base };
            let fee_share = if i == 0 { fee_base + fee_remainder } else { fee_base };
            WorkerShare {
                gross_cents: net_share + fee_share,
                platform_fee_cents: fee_share,
                net_cents: net_share,
                percent_of_work: percent,
            }
        })
        .collect();

    EarningsSplit {
        gross_cents: total_cents,
        platform_fee_cents: fee,
        net_cents: net,
        shares,
    }
}

/// Split proportionally to recorded effort minutes, in the given
/// (stable) worker order.
///
/// Every worker but the last with nonzero effort gets a rounded
/// proportional share; that last worker absorbs the rounding
/// remainder. Zero-effort workers get exactly 0. An all-zero effort
/// vector falls back to an equal split.
pub fn proportional_split(total_cents: i64, fee_percent: f64, effort_minutes: &[i64]) -> EarningsSplit {
    let total_effort: i64 = effort_minutes.iter().sum();
    if total_effort == 0 {
        return equal_split(total_cents, fee_percent, effort_minutes.len());
    }

    let fee = platform_fee(total_cents, fee_percent);
    let net = total_cents - fee;

    let last_working = effort_minutes
        .iter()
        .rposition(|&m| m > 0)
        .expect("total_effort > 0 implies a nonzero entry");

    let mut shares: Vec<WorkerShare> = Vec::with_capacity(effort_minutes.len());
    let mut net_assigned: i64 = 0;
    let mut fee_assigned: i64 = 0;

    for (i, &minutes) in effort_minutes.iter().enumerate() {
        let ratio = minutes as f64 / total_effort as f64;
        let percent = (ratio * 100.0).round() as i32;

        let (net_share, fee_share) = if minutes == 0 {
            (0, 0)
        } else if i == last_working {
            (net - net_assigned, fee - fee_assigned)
        } else {
            (
                (net as f64 * ratio).round() as i64,
                (fee as f64 * ratio).round() as i64,
            )
        };

        net_assigned += net_share;
        fee_assigned += fee_share;
        shares.push(WorkerShare {
            gross_cents: net_share + fee_share,
            platform_fee_cents: fee_share,
            net_cents: net_share,
            percent_of_work: if minutes == 0 { 0 } else { percent },
        });
    }

    EarningsSplit {
        gross_cents: total_cents,
        platform_fee_cents: fee,
        net_cents: net,
        shares,
    }
}

/// Earnings for a cleaner absorbing a whole multi-cleaner job after a
/// co-worker dropped out. The regular single-cleaner fee applies to
/// the full price, plus a flat bonus.
pub fn solo_completion_earnings(
    job_price_cents: i64,
    regular_fee_percent: f64,
    solo_bonus_cents: i64,
) -> SoloEarnings {
    let fee = platform_fee(job_price_cents, regular_fee_percent);
    SoloEarnings {
        gross_cents: job_price_cents + solo_bonus_cents,
        platform_fee_cents: fee,
        net_cents: job_price_cents - fee + solo_bonus_cents,
    }
}

/// Pro-rated payment for partially finished work. The percentage is
/// rounded for display only; the money uses the raw ratio.
pub fn partial_payment(
    completed_units: i64,
    total_units: i64,
    total_price_cents: i64,
    fee_percent: f64,
) -> PartialPayment {
    let ratio = if total_units == 0 {
        0.0
    } else {
        completed_units as f64 / total_units as f64
    };

    let partial = (total_price_cents as f64 * ratio).round() as i64;
    let fee = platform_fee(partial, fee_percent);

    PartialPayment {
        partial_cents: partial,
        platform_fee_cents: fee,
        net_cents: partial - fee,
        percent_complete: (ratio * 100.0).round() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_sum(split: &EarningsSplit) -> i64 {
        split.shares.iter().map(|s| s.net_cents).sum()
    }

    fn fee_sum(split: &EarningsSplit) -> i64 {
        split.shares.iter().map(|s| s.platform_fee_cents).sum()
    }

    #[test]
    fn test_fee_correctness() {
        assert_eq!(platform_fee(10000, 13.0), 1300);
        assert_eq!(platform_fee(99, 10.0), 10); // 9.9 rounds up
        assert_eq!(platform_fee(0, 10.0), 0);
        assert_eq!(platform_fee(1, 10.0), 0);

        let split = equal_split(99, 10.0, 1);
        assert_eq!(split.platform_fee_cents, 10);
        assert_eq!(split.net_cents, 89);
        assert_eq!(split.platform_fee_cents + split.net_cents, 99);
    }

    #[test]
    fn test_equal_split_two_workers() {
        let split = equal_split(10000, 13.0, 2);
        assert_eq!(split.platform_fee_cents, 1300);
        assert_eq!(split.net_cents, 8700);
        assert_eq!(split.shares[0].net_cents, 4350);
        assert_eq!(split.shares[1].net_cents, 4350);

        // Odd cent goes to worker 0.
        let split = equal_split(10001, 13.0, 2);
        assert_eq!(split.net_cents, 8701);
        assert_eq!(split.shares[0].net_cents, 4351);
        assert_eq!(split.shares[1].net_cents, 4350);
        assert_eq!(net_sum(&split), 8701);
    }

    #[test]
    fn test_equal_split_sum_invariant() {
        for total in [0i64, 1, 99, 100, 10001, 99999, 123457] {
            for count in 1..=7usize {
                let split = equal_split(total, 13.0, count);
                assert_eq!(net_sum(&split), split.net_cents, "total={} n={}", total, count);
                assert_eq!(fee_sum(&split), split.platform_fee_cents);
                for share in &split.shares {
                    assert_eq!(share.gross_cents, share.platform_fee_cents + share.net_cents);
                    assert!(share.net_cents >= 0);
                }
            }
        }
    }

    #[test]
    fn test_single_worker_takes_everything() {
        let split = equal_split(15000, 10.0, 1);
        assert_eq!(split.shares.len(), 1);
        assert_eq!(split.shares[0].net_cents, 13500);
        assert_eq!(split.shares[0].gross_cents, 15000);
    }

    #[test]
    fn test_proportional_split_scenario() {
        // 60/30/30 minutes on 10000 cents at 13%: net 8700, half to
        // the first worker, the rest split with the remainder on the
        // last.
        let split = proportional_split(10000, 13.0, &[60, 30, 30]);
        assert_eq!(split.net_cents, 8700);
        assert_eq!(split.shares[0].net_cents, 4350);
        assert_eq!(split.shares[0].percent_of_work, 50);
        assert_eq!(split.shares[1].net_cents + split.shares[2].net_cents, 4350);
        assert_eq!(net_sum(&split), 8700);
    }

    #[test]
    fn test_proportional_split_last_absorbs_remainder() {
        // Thirds of 10000 cents at 10%: net 9000 splits cleanly, but
        // 10001 leaves the odd cents on the last worker.
        let split = proportional_split(10001, 10.0, &[20, 20, 20]);
        assert_eq!(net_sum(&split), split.net_cents);
        let expected_last = split.net_cents - split.shares[0].net_cents - split.shares[1].net_cents;
        assert_eq!(split.shares[2].net_cents, expected_last);
    }

    #[test]
    fn test_proportional_split_zero_effort_worker() {
        let split = proportional_split(10000, 13.0, &[90, 0, 30]);
        assert_eq!(split.shares[1].net_cents, 0);
        assert_eq!(split.shares[1].percent_of_work, 0);
        assert_eq!(net_sum(&split), split.net_cents);
        // Remainder lands on the last worker with actual effort, not
        // the zero-effort one.
        assert_eq!(
            split.shares[2].net_cents,
            split.net_cents - split.shares[0].net_cents
        );
    }

    #[test]
    fn test_proportional_split_all_zero_falls_back_to_equal() {
        let split = proportional_split(10000, 13.0, &[0, 0]);
        assert_eq!(split.shares.len(), 2);
        assert_eq!(split.shares[0].net_cents, 4350);
        assert_eq!(split.shares[1].net_cents, 4350);
    }

    #[test]
    fn test_proportional_sum_invariant_under_uneven_efforts() {
        for efforts in [
            vec![7i64, 11, 13],
            vec![1, 1, 1, 1, 1, 1, 1],
            vec![120, 1],
            vec![0, 45, 0, 77, 33],
        ] {
            let split = proportional_split(99999, 17.5, &efforts);
            assert_eq!(net_sum(&split), split.net_cents, "efforts={:?}", efforts);
            assert_eq!(fee_sum(&split), split.platform_fee_cents);
        }
    }

    #[test]
    fn test_solo_completion_earnings() {
        let solo = solo_completion_earnings(15000, 10.0, 500);
        assert_eq!(solo.net_cents, 14000);

        let solo = solo_completion_earnings(15000, 10.0, 0);
        assert_eq!(solo.net_cents, 13500);
        assert_eq!(solo.platform_fee_cents, 1500);
    }

    #[test]
    fn test_partial_payment() {
        let partial = partial_payment(3, 4, 10000, 10.0);
        assert_eq!(partial.partial_cents, 7500);
        assert_eq!(partial.platform_fee_cents, 750);
        assert_eq!(partial.net_cents, 6750);
        assert_eq!(partial.percent_complete, 75);
    }

    #[test]
    fn test_partial_payment_zero_units() {
        let partial = partial_payment(0, 0, 10000, 10.0);
        assert_eq!(partial.partial_cents, 0);
        assert_eq!(partial.net_cents, 0);
        assert_eq!(partial.percent_complete, 0);
    }

    #[test]
    fn test_partial_payment_rounds_money_from_raw_ratio() {
        // 1/3 of 10000 is 3333.33…; money rounds the raw ratio, the
        // display percent rounds separately.
        let partial = partial_payment(1, 3, 10000, 10.0);
        assert_eq!(partial.partial_cents, 3333);
        assert_eq!(partial.percent_complete, 33);
    }
}
