mod common;

use std::fs;

use common::{grid, sweep_config, Behaviour, FakeCluster};
use tempfile::tempdir;
use visc_core::IssueKind;
use visc_sweep::{run_sweep, DispatchHandle, DispatchStatus, DispatchStrategy};

#[test]
fn direct_sweep_prepares_and_runs_every_combination() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(
        root.path(),
        grid(&[1.0e5, 2.0e5], &[1, 2], &[2.0]),
        DispatchStrategy::Direct,
    );
    let mut cluster = FakeCluster::new(root.path());

    let report = run_sweep(&mut cluster, &config).expect("sweep");

    assert_eq!(
        report.run_names(),
        vec![
            "Mw_100000_0__D1__PDI_2_0",
            "Mw_100000_0__D2__PDI_2_0",
            "Mw_200000_0__D1__PDI_2_0",
            "Mw_200000_0__D2__PDI_2_0",
        ]
    );
    assert_eq!(report.count(DispatchStatus::Succeeded), 4);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert!(report.drain.is_none());

    let run = cluster.run_path("Mw_200000_0__D2__PDI_2_0");
    let input = fs::read_to_string(run.join("inp_MW_200000_0_D2_PDI_2_0.dat")).expect("input");
    assert!(input.contains("\n2 200000.000000 2.000000\n"));
    assert!(run.join("bob.rc").is_file());

    let runs = cluster.commands_containing("bash -lc ");
    assert_eq!(runs.len(), 4);
    assert!(runs[0].contains("conda activate"));
    assert!(runs[0].contains("/opt/conda/etc/profile.d/conda.sh"));
    assert_eq!(cluster.commands_containing("grep -E").len(), 1);
}

#[test]
fn zero_exit_without_dynamic_output_is_an_incomplete_run() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(root.path(), grid(&[3.0e4], &[], &[]), DispatchStrategy::Direct);
    let mut cluster = FakeCluster::new(root.path())
        .behave_by_default(Behaviour::complete().without_dynamic());

    let report = run_sweep(&mut cluster, &config).expect("sweep");

    let record = report.record("Mw_30000_0__DNA__PDI_NA").expect("record");
    assert_eq!(record.status, DispatchStatus::Failed);
    assert_eq!(record.handle, Some(DispatchHandle::ExitCode(0)));
    assert_eq!(report.issue_count(IssueKind::IncompleteRun), 1);
    assert!(report.issues[0].message.contains("gtp.dat"));
}

#[test]
fn solver_failure_and_fetch_failure_do_not_stop_the_sweep() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(
        root.path(),
        grid(&[1.0e4, 2.0e4, 3.0e4], &[], &[]),
        DispatchStrategy::Direct,
    );
    let mut cluster = FakeCluster::new(root.path())
        .behave("Mw_10000_0__DNA__PDI_NA", Behaviour::complete().exiting(139));
    cluster.failing_fetch.push("Mw_20000_0__DNA__PDI_NA".to_string());

    let report = run_sweep(&mut cluster, &config).expect("sweep");

    assert_eq!(report.runs.len(), 3);
    assert_eq!(report.count(DispatchStatus::Failed), 2);
    assert_eq!(
        report.record("Mw_30000_0__DNA__PDI_NA").map(|r| r.status),
        Some(DispatchStatus::Succeeded)
    );
    assert_eq!(report.issue_count(IssueKind::Dispatch), 1);
    assert_eq!(report.issue_count(IssueKind::Materialization), 1);
    // the failed download never reached the solver
    assert_eq!(cluster.commands_containing("bash -lc ").len(), 2);
}

#[test]
fn distribution_output_is_recorded_without_being_required() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(root.path(), grid(&[5.0e4, 6.0e4], &[], &[]), DispatchStrategy::Direct);
    let mut cluster = FakeCluster::new(root.path())
        .behave("Mw_50000_0__DNA__PDI_NA", Behaviour::complete().with_distribution());

    let report = run_sweep(&mut cluster, &config).expect("sweep");

    assert_eq!(report.count(DispatchStatus::Succeeded), 2);
    let flags: Vec<bool> = report.runs.iter().map(|r| r.distribution_output).collect();
    assert_eq!(flags, vec![true, false]);
}

#[test]
fn invalid_grid_is_rejected_before_contacting_the_host() {
    let root = tempdir().expect("tempdir");
    let config = sweep_config(root.path(), grid(&[], &[], &[]), DispatchStrategy::Direct);
    let mut cluster = FakeCluster::new(root.path());

    assert!(run_sweep(&mut cluster, &config).is_err());
    assert!(cluster.commands.borrow().is_empty());
}
