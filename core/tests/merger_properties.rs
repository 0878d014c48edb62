//! Record merger properties over seeded random inputs.
//!
//! merge(merge(a,b),c) == merge(a,merge(b,c)) == merge(c,merge(b,a)),
//! output sorted by year, one record per year.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use scenario_impact_core::record_merger::{merge_all, merge_records};
use scenario_impact_core::sourcing::PurchaseRecord;

fn random_records(rng: &mut Pcg64Mcg) -> Vec<PurchaseRecord> {
    let count: usize = rng.gen_range(0..8);
    let mut years: Vec<i32> = (0..count).map(|_| rng.gen_range(2015..2030)).collect();
    years.sort_unstable();
    years.dedup();
    years
        .into_iter()
        // Quarter-tonne volumes keep sums exact in any order.
        .map(|year| PurchaseRecord::new(year, f64::from(rng.gen_range(0..4000_i32)) * 0.25))
        .collect()
}

#[test]
fn merge_is_associative_and_commutative() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x5EED_0001);

    for case in 0..500 {
        let a = random_records(&mut rng);
        let b = random_records(&mut rng);
        let c = random_records(&mut rng);

        let left = merge_records(&merge_records(&a, &b), &c);
        let right = merge_records(&a, &merge_records(&b, &c));
        let reversed = merge_records(&c, &merge_records(&b, &a));

        assert_eq!(left, right, "associativity broke in case {case}");
        assert_eq!(left, reversed, "commutativity broke in case {case}");
        assert_eq!(
            left,
            merge_all([a.as_slice(), b.as_slice(), c.as_slice()]),
            "merge_all disagrees with pairwise merge in case {case}"
        );
    }
}

#[test]
fn merge_output_is_sorted_with_unique_years() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x5EED_0002);

    for _ in 0..200 {
        let merged = merge_records(&random_records(&mut rng), &random_records(&mut rng));
        assert!(
            merged.windows(2).all(|w| w[0].year < w[1].year),
            "years must be strictly ascending: {merged:?}"
        );
    }
}

#[test]
fn merge_keeps_years_present_on_one_side_only() {
    let a = vec![PurchaseRecord::new(2020, 40.0)];
    let b = vec![PurchaseRecord::new(2020, 60.0), PurchaseRecord::new(2021, 5.0)];

    let merged = merge_records(&a, &b);

    assert_eq!(merged, vec![PurchaseRecord::new(2020, 100.0), PurchaseRecord::new(2021, 5.0)]);
}
