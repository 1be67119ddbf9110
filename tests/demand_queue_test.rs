//! Demand queue behaviour: arrivals, boarding decrease, bounding and reset

use bus_corridor::simulation::{sample_poisson, DemandQueue, LineId, SimError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

fn queue(rates: &[(u32, f64)]) -> DemandQueue<LineId> {
    let lambdas: BTreeMap<LineId, f64> = rates.iter().map(|(l, r)| (LineId(*l), *r)).collect();
    DemandQueue::new(lambdas)
}

#[test]
fn test_new_queue_starts_empty() {
    let q = queue(&[(0, 1.0), (1, 2.0)]);
    assert_eq!(q.query(LineId(0)), Ok(0.0));
    assert_eq!(q.query(LineId(1)), Ok(0.0));
    assert_eq!(q.total(), 0.0);
}

#[test]
fn test_query_unknown_key_is_invalid_key() {
    let q = queue(&[(0, 1.0)]);
    assert!(matches!(q.query(LineId(7)), Err(SimError::InvalidKey(_))));
}

#[test]
fn test_decrease_unknown_key_is_invalid_key() {
    let mut q = queue(&[(0, 1.0)]);
    assert!(matches!(
        q.decrease(LineId(7), 0.0),
        Err(SimError::InvalidKey(_))
    ));
}

#[test]
fn test_arrivals_accumulate_and_stay_non_negative() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut q = queue(&[(0, 0.5), (1, 3.0)]);

    let mut previous = 0.0;
    for _ in 0..200 {
        q.arrival(&mut rng);
        let level = q.query(LineId(1)).unwrap();
        assert!(level >= previous, "arrivals alone must never lower a level");
        previous = level;
        assert!(q.query(LineId(0)).unwrap() >= 0.0);
    }
    // 200 ticks at 3 per tick
    assert!(previous > 400.0 && previous < 800.0, "level was {previous}");
}

#[test]
fn test_decrease_removes_exactly_the_amount() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut q = queue(&[(0, 5.0)]);
    for _ in 0..10 {
        q.arrival(&mut rng);
    }

    let before = q.query(LineId(0)).unwrap();
    assert!(before > 0.0);
    q.decrease(LineId(0), 1.5).unwrap();
    assert_eq!(q.query(LineId(0)).unwrap(), before - 1.5);

    let rest = q.query(LineId(0)).unwrap();
    q.decrease(LineId(0), rest).unwrap();
    assert_eq!(q.query(LineId(0)).unwrap(), 0.0);
}

#[test]
fn test_bounding_clamps_existing_and_future_levels() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut q = queue(&[(0, 50.0), (1, 50.0)]);
    for _ in 0..10 {
        q.arrival(&mut rng);
    }
    assert!(q.query(LineId(0)).unwrap() > 20.0);

    q.pax_demand_bounding(20.0);
    assert!(q.query(LineId(0)).unwrap() <= 20.0);
    assert_eq!(q.cap(LineId(1)), Some(20.0));

    for _ in 0..50 {
        q.arrival(&mut rng);
        assert!(q.query(LineId(0)).unwrap() <= 20.0);
        assert!(q.query(LineId(1)).unwrap() <= 20.0);
    }
}

#[test]
fn test_reset_zeroes_levels_but_keeps_rates_and_caps() {
    let mut rng = StdRng::seed_from_u64(4);
    let mut q = queue(&[(0, 2.0)]);
    q.pax_demand_bounding(100.0);
    for _ in 0..20 {
        q.arrival(&mut rng);
    }

    q.reset();
    assert_eq!(q.query(LineId(0)), Ok(0.0));
    assert_eq!(q.lambda(LineId(0)), Some(2.0));
    assert_eq!(q.cap(LineId(0)), Some(100.0));
}

#[test]
fn test_poisson_sample_mean() {
    let mut rng = StdRng::seed_from_u64(5);
    let n = 10_000;
    let small: u64 = (0..n).map(|_| sample_poisson(&mut rng, 2.0)).sum();
    let mean = small as f64 / n as f64;
    assert!((mean - 2.0).abs() < 0.1, "mean was {mean}");

    // large rates are sampled in chunks
    let n = 2_000;
    let large: u64 = (0..n).map(|_| sample_poisson(&mut rng, 100.0)).sum();
    let mean = large as f64 / n as f64;
    assert!((mean - 100.0).abs() < 2.0, "mean was {mean}");
}

#[test]
fn test_poisson_zero_rate_never_arrives() {
    let mut rng = StdRng::seed_from_u64(6);
    for _ in 0..100 {
        assert_eq!(sample_poisson(&mut rng, 0.0), 0);
    }
}
