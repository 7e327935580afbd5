use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;
use visc_core::ParameterCombination;
use visc_sweep::dispatch::render_batch_script;
use visc_sweep::environment::Activation;
use visc_sweep::BatchResources;

const RUN_DIR: &str = "work/Mw_250000_0__D1__PDI_2_5";

fn script(resources: &BatchResources) -> String {
    render_batch_script(
        &ParameterCombination::new(2.5e5, Some(1), Some(2.5)),
        resources,
        &Activation::none(),
        "touch solver_ran",
    )
}

fn write_script(run_dir: &Path, resources: &BatchResources) {
    fs::create_dir_all(run_dir).expect("run dir");
    fs::write(run_dir.join("job.sh"), script(resources)).expect("script");
}

#[test]
fn script_runs_from_the_submission_directory() {
    let root = tempdir().expect("tempdir");
    let run_dir = root.path().join(RUN_DIR);
    write_script(&run_dir, &BatchResources::default());

    let status = Command::new("bash")
        .arg("job.sh")
        .current_dir(&run_dir)
        .env_remove("SLURM_SUBMIT_DIR")
        .status()
        .expect("bash");

    assert!(status.success());
    assert!(run_dir.join("solver_ran").is_file());
    assert!(!run_dir.join("work").exists());
}

#[test]
fn script_follows_the_queue_submit_dir() {
    let root = tempdir().expect("tempdir");
    let run_dir = root.path().join(RUN_DIR);
    write_script(&run_dir, &BatchResources::default());
    let spool = root.path().join("spool");
    fs::create_dir_all(&spool).expect("spool");

    // the queue runs a copy of the script elsewhere
    let status = Command::new("bash")
        .arg(run_dir.join("job.sh"))
        .current_dir(&spool)
        .env("SLURM_SUBMIT_DIR", &run_dir)
        .status()
        .expect("bash");

    assert!(status.success());
    assert!(run_dir.join("solver_ran").is_file());
    assert!(!spool.join("solver_ran").exists());
}

#[test]
fn log_paths_are_relative_to_the_submission_directory() {
    let text = script(&BatchResources::default());
    assert!(text.contains("#SBATCH --output=slurm-%j.out\n"));
    assert!(text.contains("#SBATCH --error=slurm-%j.err\n"));
    assert!(!text.contains(RUN_DIR));
}

#[test]
fn empty_partition_leaves_the_cluster_default() {
    let text = script(&BatchResources::default());
    assert!(!text.contains("--partition"));

    let blank = BatchResources {
        partition: "  ".to_string(),
        ..BatchResources::default()
    };
    assert!(!script(&blank).contains("--partition"));

    let named = BatchResources {
        partition: "short".to_string(),
        ..BatchResources::default()
    };
    assert!(script(&named).contains("#SBATCH --partition=short\n"));
}
