mod common;

use std::fs;

use common::{grid, sweep_config, FakeCluster};
use tempfile::tempdir;
use visc_core::{IssueKind, ParameterCombination, SweepError};
use visc_sweep::materialize::{materialize, RunConfigSource, RunInputs};
use visc_sweep::DispatchStrategy;

#[test]
fn local_run_config_and_polymer_file_are_uploaded() {
    let root = tempdir().expect("tempdir");
    let mut config = sweep_config(root.path(), grid(&[1.0e4], &[], &[]), DispatchStrategy::Direct);
    let rc = root.path().join("local/bob.rc");
    let polymer = root.path().join("local/polyconf.dat");
    fs::write(&rc, "local rc\n").expect("rc");
    fs::write(&polymer, "polymers\n").expect("polymer");
    config.run_config = Some(rc.clone());
    config.polymer_config = Some(polymer);

    let inputs = RunInputs::from_config(&config).expect("inputs");
    assert_eq!(inputs.run_config, RunConfigSource::Upload(rc));
    let cluster = FakeCluster::new(root.path());
    let combo = ParameterCombination::new(1.0e4, None, None);
    let run = materialize(&cluster, "work", &combo, &inputs).expect("materialize");

    assert_eq!(run.polymer_name.as_deref(), Some("polyconf.dat"));
    let dir = cluster.run_path("Mw_10000_0__DNA__PDI_NA");
    assert_eq!(fs::read_to_string(dir.join("bob.rc")).expect("rc"), "local rc\n");
    assert!(dir.join("polyconf.dat").is_file());
    assert!(cluster.commands_containing("wget").is_empty());

    // unspecified distribution and polydispersity keep the template values
    let input = fs::read_to_string(dir.join(&run.input_name)).expect("input");
    assert!(input.contains("\n0 10000.000000 1.1\n"));
}

#[test]
fn missing_candidate_uploads_the_template_unchanged() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(root.path(), grid(&[1.0e4], &[], &[]), DispatchStrategy::Direct);
    fs::write(&config.template_input, "only\nheader\nlines\nhere\nand\nwords here\n")
        .expect("template");
    let inputs = RunInputs::from_config(&config).expect("inputs");
    let cluster = FakeCluster::new(root.path());
    let combo = ParameterCombination::new(2.0e4, Some(1), Some(2.0));

    let run = materialize(&cluster, "work", &combo, &inputs).expect("materialize");

    assert_eq!(run.issues.len(), 1);
    assert_eq!(run.issues[0].kind, IssueKind::InputRewrite);
    let text = fs::read_to_string(
        cluster
            .run_path("Mw_20000_0__D1__PDI_2_0")
            .join("inp_MW_20000_0_D1_PDI_2_0.dat"),
    )
    .expect("input");
    assert_eq!(text, "only\nheader\nlines\nhere\nand\nwords here\n");
}

#[test]
fn fetched_run_config_uses_the_configured_url() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(root.path(), grid(&[1.0e4], &[], &[]), DispatchStrategy::Direct);
    let inputs = RunInputs::from_config(&config).expect("inputs");
    let cluster = FakeCluster::new(root.path());

    materialize(&cluster, "work", &ParameterCombination::new(1.0e4, None, None), &inputs)
        .expect("materialize");

    let fetches = cluster.commands_containing("wget");
    assert_eq!(
        fetches,
        vec!["wget -q 'https://example.org/bob.rc' -O 'work/Mw_10000_0__DNA__PDI_NA/bob.rc'"]
    );
}

#[test]
fn missing_local_inputs_are_configuration_errors() {
    let root = tempdir().expect("tempdir");
    let mut config = sweep_config(root.path(), grid(&[1.0e4], &[], &[]), DispatchStrategy::Direct);
    config.run_config = Some(root.path().join("local/absent.rc"));
    match RunInputs::from_config(&config) {
        Err(SweepError::Config(info)) => assert_eq!(info.code, "run_config"),
        other => panic!("unexpected: {other:?}"),
    }
}
