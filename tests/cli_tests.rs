use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::str;
use tempfile::TempDir;

fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gaga_cli"));
    // keep device selection deterministic on machines with a GPU
    cmd.env("CUDA_VISIBLE_DEVICES", "-1");
    cmd
}

fn run(args: &[&str]) -> Output {
    cli().args(args).output().expect("Failed to execute gaga_cli")
}

fn write_params(dir: &Path) -> String {
    let path = dir.join("params.json");
    let params = r##"{
        "#comment": "two feature toy",
        "x_dim": 2,
        "z_dim": 3,
        "keys": ["Ekine", "X"],
        "constraints": {"Ekine": [0.0, 6.0]},
        "x_mean": [[1.0, 0.0]],
        "x_std": [[0.5, 10.0]],
        "g_dim": 8,
        "g_layers": 1,
        "epoch": 5,
        "start date": "2019-03-01 10:00:00",
        "end date": "2019-03-01 11:30:00"
    }"##;
    fs::write(&path, params).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_cli_help_message() {
    let output = run(&["--help"]);
    assert!(output.status.success(), "CLI --help exited with error: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("Usage:"));
    for command in ["info", "generate", "compare", "init"] {
        assert!(stdout.contains(command), "help should list '{}'. Output: {}", command, stdout);
    }
}

#[test]
fn test_cli_version_message() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    assert!(str::from_utf8(&output.stdout).unwrap().contains("0.1.0"));
}

#[test]
fn test_cli_missing_required_args() {
    let output = run(&["generate", "gan.safetensors", "-o", "out.txt"]);
    assert!(!output.status.success());
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(
        stderr.contains("the following required arguments were not provided"),
        "Stderr: {}",
        stderr
    );
}

#[test]
fn test_cli_missing_checkpoint_reports_error_chain() {
    let output = run(&["info", "non_existent_gan.safetensors"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("Application error: IO error"), "Stderr: {}", stderr);
    assert!(stderr.contains("Caused by:"), "Stderr: {}", stderr);
}

#[test]
fn test_cli_corrupt_checkpoint_reports_decode_cause() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.safetensors");
    fs::write(&path, b"not a checkpoint").unwrap();
    let output = run(&["info", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("Application error: SafeTensors error"), "Stderr: {}", stderr);
    assert!(stderr.contains("Caused by:"), "Stderr: {}", stderr);
}

#[test]
fn test_cli_init_info_generate_compare() {
    let dir = TempDir::new().unwrap();
    let params = write_params(dir.path());
    let ckpt = dir.path().join("gan.safetensors");
    let ckpt = ckpt.to_str().unwrap();

    let output = run(&["init", &params, "-o", ckpt]);
    assert!(output.status.success(), "init failed: {:?}", output);
    assert!(str::from_utf8(&output.stdout).unwrap().contains("Total number of parameters: 122"));

    let output = run(&["info", ckpt]);
    assert!(output.status.success(), "info failed: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("   epoch                5"), "Stdout: {}", stdout);
    assert!(stdout.contains("   Duration             1:30:00"), "Stdout: {}", stdout);
    assert!(stdout.contains("   Final d_loss         -"), "Stdout: {}", stdout);
    assert!(!stdout.contains("x_mean"));
    assert!(!stdout.contains("#comment"));
    assert!(stdout.contains("(net.0): Linear(in_features=3, out_features=8)"));

    let samples = dir.path().join("samples.txt");
    let samples = samples.to_str().unwrap();
    let output = run(&["generate", ckpt, "-n", "250", "--batch-size", "64", "--gpu", "false", "-o", samples]);
    assert!(output.status.success(), "generate failed: {:?}", output);
    let text = fs::read_to_string(samples).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("# Ekine X"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 250);
    for row in rows {
        let ekine: f32 = row.split_whitespace().next().unwrap().parse().unwrap();
        assert!((0.0..=6.0).contains(&ekine), "Ekine {} outside its constraint", ekine);
    }

    let output = run(&["compare", samples, samples, "--bins", "20", "--directions", "10"]);
    assert!(output.status.success(), "compare failed: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("JSD Ekine"), "Stdout: {}", stdout);
    assert!(stdout.contains("   SWD                  0.000000"), "Stdout: {}", stdout);
}

#[test]
fn test_cli_required_gpu_is_fatal_without_accelerator() {
    let dir = TempDir::new().unwrap();
    let params = write_params(dir.path());
    let ckpt = dir.path().join("gan.safetensors");
    let ckpt = ckpt.to_str().unwrap();
    assert!(run(&["init", &params, "-o", ckpt]).status.success());

    let out = dir.path().join("out.txt");
    let output = run(&["generate", ckpt, "-n", "10", "--gpu", "true", "-o", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("Error GPU mode not available"), "Stderr: {}", stderr);
    assert!(!out.exists());
}
