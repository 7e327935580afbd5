mod common;

use std::collections::BTreeMap;

use common::{complete_run, summary, write_run, DYNAMIC, RELAXATION};
use rusqlite::Connection;
use tempfile::tempdir;
use visc_core::{IssueKind, SweepError};
use visc_dsr::{ingest_tree, IngestOptions, JobState, StoreQuery};

#[test]
fn summary_values_take_precedence_over_directory_name() {
    let tree = tempdir().expect("tree");
    let info = summary("2.5e5", "3.5e4", "2.0e6");
    write_run(
        tree.path(),
        "Mw_10000_0__D1__PDI_2_5",
        &[("gt.dat", RELAXATION), ("gtp.dat", DYNAMIC), ("info.txt", &info)],
    );
    let db = tree.path().join("out/simulations.db");
    let report = ingest_tree(tree.path(), &db, &IngestOptions::default()).expect("ingest");
    assert_eq!(report.accepted.len(), 1);
    let meta = &report.accepted[0].metadata;
    assert_eq!(meta.molecular_weight, Some(2.5e5));
    assert_eq!(meta.polydispersity, Some(2.5));
    assert_eq!(meta.distribution_label.as_deref(), Some("Gaussian"));
    assert_eq!(meta.zero_shear_viscosity, Some(3.5e4));
    assert_eq!(meta.complex_viscosity, Some(2.0));

    let conn = Connection::open(&db).expect("open");
    let store = StoreQuery::load(&conn).expect("load");
    assert_eq!(store.simulations.len(), 1);
    assert_eq!(store.dynamic.len(), 3);
    assert_eq!(store.relaxation.len(), 3);
    assert_eq!(store.job_status[0].status, JobState::Finished);
    store.ensure_referential().expect("referential");

    let versions = &report.provenance.tool_versions;
    assert!(versions.contains_key("visc"));
    assert_eq!(versions.get("sqlite").map(String::as_str), Some(rusqlite::version()));
}

#[test]
fn incomplete_runs_are_reported_and_leave_no_rows() {
    let tree = tempdir().expect("tree");
    complete_run(tree.path(), "Mw_10000_0__DNA__PDI_NA");
    write_run(tree.path(), "Mw_20000_0__DNA__PDI_NA", &[("gt.dat", RELAXATION)]);
    write_run(
        tree.path(),
        "Mw_30000_0__DNA__PDI_NA",
        &[("gt.dat", RELAXATION), ("gtp.dat", "")],
    );
    let db = tree.path().join("simulations.db");
    let report = ingest_tree(tree.path(), &db, &IngestOptions::default()).expect("ingest");
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.skipped, 2);
    let skipped: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| issue.kind == IssueKind::IngestionSkip)
        .filter_map(|issue| issue.run.clone())
        .collect();
    assert_eq!(skipped, vec!["Mw_20000_0__DNA__PDI_NA", "Mw_30000_0__DNA__PDI_NA"]);

    let conn = Connection::open(&db).expect("open");
    let store = StoreQuery::load(&conn).expect("load");
    assert_eq!(store.simulations.len(), 1);
    assert_eq!(store.simulations[0].molecular_weight, Some(10000.0));
    assert_eq!(store.simulations[0].pdi, None);
    assert_eq!(store.simulations[0].distribution_label, None);
}

#[test]
fn empty_tree_removes_previous_store() {
    let tree = tempdir().expect("tree");
    write_run(tree.path(), "Mw_10000_0__D0__PDI_1_0", &[("gt.dat", RELAXATION)]);
    let db = tree.path().join("simulations.db");
    std::fs::write(&db, b"stale").expect("stale store");
    let err = ingest_tree(tree.path(), &db, &IngestOptions::default()).expect_err("empty");
    assert!(matches!(err, SweepError::EmptyStore(_)));
    assert_eq!(err.info().code, "visc_dsr.empty_store");
    assert!(!db.exists());
    assert!(!tree.path().join("simulations.db.partial").exists());
}

#[test]
fn molecular_weight_ordering_drives_ids() {
    let tree = tempdir().expect("tree");
    complete_run(tree.path(), "Mw_9000_0__D0__PDI_1_0");
    complete_run(tree.path(), "Mw_50000_0__D0__PDI_1_0");
    complete_run(tree.path(), "Mw_100000_0__D0__PDI_1_0");
    let db = tree.path().join("simulations.db");

    let by_name = ingest_tree(tree.path(), &db, &IngestOptions::default()).expect("ingest");
    let names: Vec<_> = by_name.accepted.iter().map(|run| run.run.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Mw_100000_0__D0__PDI_1_0",
            "Mw_50000_0__D0__PDI_1_0",
            "Mw_9000_0__D0__PDI_1_0"
        ]
    );

    let opts = IngestOptions {
        sort_by_molecular_weight: true,
        ..IngestOptions::default()
    };
    let sorted = ingest_tree(tree.path(), &db, &opts).expect("ingest sorted");
    let pairs: Vec<_> = sorted
        .accepted
        .iter()
        .map(|run| (run.simulation_id, run.metadata.molecular_weight))
        .collect();
    assert_eq!(
        pairs,
        vec![(1, Some(9000.0)), (2, Some(50000.0)), (3, Some(100000.0))]
    );
}

#[test]
fn job_states_and_malformed_rows() {
    let tree = tempdir().expect("tree");
    write_run(
        tree.path(),
        "Mw_10000_0__D2__PDI_1_5",
        &[
            ("gt.dat", "# t G\n1e-3 4.5e5\nbroken\n"),
            ("gtp.dat", "0.1 1.0 2.0\n0.2 3.0\n"),
        ],
    );
    complete_run(tree.path(), "Mw_20000_0__D2__PDI_1_5");
    let mut job_states = BTreeMap::new();
    job_states.insert("Mw_10000_0__D2__PDI_1_5".to_string(), JobState::Error);
    let opts = IngestOptions {
        job_states,
        ..IngestOptions::default()
    };
    let db = tree.path().join("simulations.db");
    let report = ingest_tree(tree.path(), &db, &opts).expect("ingest");
    assert_eq!(report.malformed_rows, 3);
    assert_eq!(report.accepted[0].relaxation_points, 1);
    assert_eq!(report.accepted[0].dynamic_points, 1);

    let conn = Connection::open(&db).expect("open");
    let store = StoreQuery::load(&conn).expect("load");
    let states: Vec<_> = store.job_status.iter().map(|r| r.status).collect();
    assert_eq!(states, vec![JobState::Error, JobState::Finished]);
    assert_eq!(
        store.simulations[0].distribution_label.as_deref(),
        Some("Log-normal")
    );
}

#[test]
fn root_outputs_are_optional() {
    let tree = tempdir().expect("tree");
    std::fs::write(tree.path().join("gt.dat"), RELAXATION).expect("gt");
    std::fs::write(tree.path().join("gtp.dat"), DYNAMIC).expect("gtp");
    std::fs::write(tree.path().join("info.txt"), summary("7.5e4", "1.0", "1.0")).expect("info");
    let db = tree.path().join("store/simulations.db");
    let opts = IngestOptions {
        include_root: true,
        ..IngestOptions::default()
    };
    let report = ingest_tree(tree.path(), &db, &opts).expect("ingest");
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].run, ".");

    let none = tempdir().expect("tree");
    complete_run(none.path(), "Mw_1000_0__DNA__PDI_NA");
    let report = ingest_tree(none.path(), &none.path().join("s.db"), &opts).expect("ingest");
    assert!(report.issues.is_empty());
}

#[test]
fn parameters_fall_back_to_input_deck() {
    let tree = tempdir().expect("tree");
    let deck = "title\nline\nline\nline\nline\n3 64000.0 1.8\n1 1\n";
    write_run(
        tree.path(),
        "Mw_renamed",
        &[("gt.dat", RELAXATION), ("gtp.dat", DYNAMIC), ("inp.dat", deck)],
    );
    let db = tree.path().join("simulations.db");
    let report = ingest_tree(tree.path(), &db, &IngestOptions::default()).expect("ingest");
    let meta = &report.accepted[0].metadata;
    assert_eq!(meta.molecular_weight, Some(64000.0));
    assert_eq!(meta.polydispersity, Some(1.8));
    assert_eq!(meta.distribution_label.as_deref(), Some("Poisson"));
}
