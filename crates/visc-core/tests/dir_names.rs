use std::collections::HashSet;

use proptest::prelude::*;
use visc_core::{DirTokens, ParameterCombination};

#[test]
fn full_combination_name() {
    let combo = ParameterCombination::new(250000.0, Some(1), Some(2.5));
    assert_eq!(combo.dir_name(), "Mw_250000_0__D1__PDI_2_5");
    assert_eq!(combo.job_suffix(), "MW250000_0_D1_PDI2_5");
    assert_eq!(
        combo.input_file_name("inp.dat"),
        "inp_MW_250000_0_D1_PDI_2_5.dat"
    );
}

#[test]
fn missing_dimensions_render_sentinel() {
    let combo = ParameterCombination::new(10000.0, None, None);
    assert_eq!(combo.dir_name(), "Mw_10000_0__DNA__PDI_NA");
    let decoded = ParameterCombination::from_dir_name(&combo.dir_name()).expect("decode");
    assert_eq!(decoded, combo);
}

#[test]
fn legacy_names_without_optional_segments_decode() {
    let tokens = DirTokens::parse("Mw_50000_0").expect("legacy name");
    assert_eq!(tokens.molecular_weight, Some(50000.0));
    assert_eq!(tokens.distribution_code, None);
    assert_eq!(tokens.polydispersity, None);

    let tokens = DirTokens::parse("Mw_50000_0__D2").expect("legacy name");
    assert_eq!(tokens.distribution_code, Some(2));
}

#[test]
fn foreign_names_are_rejected() {
    assert!(DirTokens::parse("results").is_none());
    assert!(DirTokens::parse("Mw_abc__D1__PDI_2_0").is_none());
    assert!(ParameterCombination::from_dir_name("Mw_NA__D1__PDI_2_0").is_none());
}

#[test]
fn distribution_labels_follow_solver_codes() {
    let labels: Vec<_> = (0..6)
        .map(|code| ParameterCombination::new(1.0, Some(code), None).distribution_label())
        .collect();
    assert_eq!(
        labels,
        vec![
            Some("Monodisperse"),
            Some("Gaussian"),
            Some("Log-normal"),
            Some("Poisson"),
            Some("Flory"),
            None
        ]
    );
    assert_eq!(visc_core::distribution_code("Log-normal"), Some(2));
    assert_eq!(visc_core::distribution_code("Bimodal"), None);
}

proptest! {
    #[test]
    fn names_decode_to_the_same_triple(
        mw in 1.0f64..1.0e7,
        dist in proptest::option::of(0i64..5),
        pdi in proptest::option::of(1.0f64..10.0),
    ) {
        let combo = ParameterCombination::new(mw, dist, pdi);
        let decoded = ParameterCombination::from_dir_name(&combo.dir_name());
        prop_assert_eq!(decoded, Some(combo));
    }

    #[test]
    fn distinct_weights_give_distinct_names(values in proptest::collection::hash_set(1u32..1_000_000, 1..16)) {
        let names: HashSet<String> = values
            .iter()
            .map(|mw| ParameterCombination::new(f64::from(*mw), None, Some(1.5)).dir_name())
            .collect();
        prop_assert_eq!(names.len(), values.len());
    }
}
