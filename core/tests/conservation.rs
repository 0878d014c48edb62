//! Volume conservation across interventions.
//!
//! For material and supplier/location switches, replacing volume must
//! equal canceled volume year by year, and the scenario's active total
//! must equal the baseline total. Random baselines, fixed seeds.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use scenario_impact_core::{
    geocoding::StaticGeocoder,
    intervention::{Intervention, InterventionType, LocationFilter, NewLocation, Scenario},
    progress::NoProgress,
    record_merger::yearly_totals,
    scenario::apply_scenario,
    sourcing::{InterventionRole, LocationType, PurchaseLocation},
};
use std::collections::BTreeMap;

const TOLERANCE: f64 = 1e-6;

fn random_baseline(rng: &mut Pcg64Mcg) -> Vec<PurchaseLocation> {
    let count = rng.gen_range(1..12);
    (0..count)
        .map(|i| {
            let material = format!("M{}", rng.gen_range(1..4));
            let bu = format!("B{}", rng.gen_range(1..3));
            let first = rng.gen_range(2018..2021);
            let last = rng.gen_range(first..2024);
            PurchaseLocation::baseline(format!("L{i}"), material, bu, LocationType::CountryOfProduction)
                .with_supplier(format!("S{}", rng.gen_range(1..5)))
                .with_records((first..=last).map(|y| (y, rng.gen_range(1.0..500.0))))
        })
        .collect()
}

fn totals<'a>(locations: impl Iterator<Item = &'a PurchaseLocation>) -> BTreeMap<i32, f64> {
    yearly_totals(locations.map(|l| l.records.as_slice()))
}

fn assert_totals_match(expected: &BTreeMap<i32, f64>, actual: &BTreeMap<i32, f64>, context: &str) {
    for (year, volume) in expected {
        let got = actual.get(year).copied().unwrap_or(0.0);
        assert!(
            (volume - got).abs() < TOLERANCE * 1000.0,
            "{context}: year {year} expected {volume}, got {got}"
        );
    }
}

fn switch(kind: InterventionType, material: &str, percentage: f64) -> Intervention {
    let mut iv = Intervention::new("iv", kind, 2021)
        .with_filter(LocationFilter::materials([material]))
        .with_percentage(percentage);
    match kind {
        InterventionType::NewMaterial => iv.new_material_id = Some("M-new".into()),
        _ => {
            iv.new_supplier_id = Some("S-new".into());
            iv.new_location = Some(NewLocation {
                location_type: LocationType::PointOfProduction,
                country:       "Brazil".into(),
                address:       None,
                lat:           None,
                lng:           None,
            });
        }
    }
    iv
}

#[test]
fn replacing_volume_equals_canceled_volume() {
    let mut rng = Pcg64Mcg::seed_from_u64(0xC0_5E_7A_11);
    let geocoder = StaticGeocoder::new().with_country("Brazil", "AR-BR", "GR-BR");

    for case in 0..300 {
        let baseline = random_baseline(&mut rng);
        let material = baseline[0].material_id.clone();
        let kind = if rng.gen_bool(0.5) {
            InterventionType::NewMaterial
        } else {
            InterventionType::NewSupplierOrLocation
        };
        let percentage = [100.0, 75.0, 50.0, 10.0][rng.gen_range(0..4)];
        let scenario = Scenario::new("s", vec![switch(kind, &material, percentage)]);

        let snapshot = apply_scenario(&baseline, &scenario, &geocoder, TOLERANCE, &mut NoProgress)
            .unwrap_or_else(|e| panic!("case {case}: {e}"));

        let replacing = totals(snapshot.replacing());
        let canceled = totals(snapshot.canceled());
        assert_totals_match(&canceled, &replacing, &format!("case {case} ({kind:?} {percentage}%)"));

        let before = totals(baseline.iter());
        let after = totals(snapshot.active());
        assert_totals_match(&before, &after, &format!("case {case} scenario total"));
    }
}

#[test]
fn new_material_collapses_into_one_location() {
    let baseline = vec![
        PurchaseLocation::baseline("L1", "M1", "B1", LocationType::CountryOfProduction)
            .with_records([(2020, 40.0)]),
        PurchaseLocation::baseline("L2", "M1", "B2", LocationType::CountryOfDelivery)
            .with_records([(2020, 60.0)]),
    ];
    let mut iv = Intervention::new("iv", InterventionType::NewMaterial, 2020)
        .with_filter(LocationFilter::materials(["M1"]));
    iv.new_material_id = Some("M2".into());

    let snapshot = apply_scenario(
        &baseline,
        &Scenario::new("s", vec![iv]),
        &StaticGeocoder::new(),
        TOLERANCE,
        &mut NoProgress,
    )
    .expect("apply");

    let replacing: Vec<_> = snapshot.replacing().collect();
    assert_eq!(replacing.len(), 1, "material switch must collapse to one location");
    assert_eq!(replacing[0].material_id, "M2");
    assert_eq!(replacing[0].volume_for(2020), 100.0);
    assert_eq!(snapshot.canceled().count(), 2);
    assert!(snapshot
        .canceled()
        .all(|l| l.intervention_role == InterventionRole::Canceled && l.intervention_id.as_deref() == Some("iv")));
}

#[test]
fn supplier_switch_keeps_material_and_business_unit_pairs_apart() {
    let baseline = vec![
        PurchaseLocation::baseline("L1", "M1", "B1", LocationType::CountryOfProduction)
            .with_supplier("S1")
            .with_records([(2020, 10.0)]),
        PurchaseLocation::baseline("L2", "M1", "B1", LocationType::CountryOfProduction)
            .with_supplier("S2")
            .with_records([(2020, 15.0)]),
        PurchaseLocation::baseline("L3", "M1", "B2", LocationType::CountryOfProduction)
            .with_supplier("S1")
            .with_records([(2020, 7.0)]),
    ];
    let mut iv = Intervention::new("iv", InterventionType::NewSupplierOrLocation, 2020)
        .with_filter(LocationFilter::materials(["M1"]));
    iv.new_supplier_id = Some("S9".into());

    let snapshot = apply_scenario(
        &baseline,
        &Scenario::new("s", vec![iv]),
        &StaticGeocoder::new(),
        TOLERANCE,
        &mut NoProgress,
    )
    .expect("apply");

    let mut replacing: Vec<(String, f64)> = snapshot
        .replacing()
        .map(|l| (l.business_unit_id.clone(), l.volume_for(2020)))
        .collect();
    replacing.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(replacing, vec![("B1".to_string(), 25.0), ("B2".to_string(), 7.0)]);
    assert!(snapshot.replacing().all(|l| l.supplier_id.as_deref() == Some("S9")));
}

#[test]
fn efficiency_change_leaves_years_before_start_untouched() {
    let baseline = vec![PurchaseLocation::baseline("L1", "M1", "B1", LocationType::CountryOfProduction)
        .with_records([(2020, 100.0), (2021, 100.0), (2022, 100.0)])];
    let mut iv = Intervention::new("iv", InterventionType::ChangeEfficiency, 2021);
    iv.efficiency_factor = Some(0.8);

    let snapshot = apply_scenario(
        &baseline,
        &Scenario::new("s", vec![iv]),
        &StaticGeocoder::new(),
        TOLERANCE,
        &mut NoProgress,
    )
    .expect("apply");

    let replacing: Vec<_> = snapshot.replacing().collect();
    assert_eq!(replacing.len(), 1);
    assert_eq!(replacing[0].volume_for(2020), 100.0);
    assert!((replacing[0].volume_for(2021) - 80.0).abs() < TOLERANCE);
    assert!((replacing[0].volume_for(2022) - 80.0).abs() < TOLERANCE);
}

#[test]
fn large_volumes_mixed_with_small_ones_still_conserve() {
    let baseline = vec![
        PurchaseLocation::baseline("L1", "M1", "B1", LocationType::CountryOfProduction)
            .with_records([(2020, 0.1)]),
        PurchaseLocation::baseline("L2", "M2", "B1", LocationType::CountryOfProduction)
            .with_records([(2020, 98_765_432_109.87)]),
        PurchaseLocation::baseline("L3", "M1", "B1", LocationType::CountryOfProduction)
            .with_records([(2020, 0.1)]),
    ];
    let mut iv = Intervention::new("iv", InterventionType::NewSupplierOrLocation, 2020);
    iv.new_supplier_id = Some("S9".into());

    let snapshot = apply_scenario(
        &baseline,
        &Scenario::new("s", vec![iv]),
        &StaticGeocoder::new(),
        TOLERANCE,
        &mut NoProgress,
    )
    .expect("summation order must not break conservation at large volumes");

    let before = totals(baseline.iter());
    let after = totals(snapshot.active());
    for (year, volume) in &before {
        let got = after.get(year).copied().unwrap_or(0.0);
        assert!(
            (volume - got).abs() <= TOLERANCE * volume.abs(),
            "year {year}: expected {volume}, got {got}"
        );
    }
    assert_eq!(snapshot.replacing().count(), 2, "one replacement per material/business unit pair");
}
