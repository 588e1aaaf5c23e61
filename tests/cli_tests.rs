use std::fs;
use std::process::Command;

#[test]
fn compress_then_decompress_round_trips_through_the_cli() {
    let exe = env!("CARGO_BIN_EXE_paralog");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.fasta");
    let db_dir = dir.path().join("db");
    let output = dir.path().join("output.fasta");

    fs::write(
        &input,
        ">one first protein\nMSTNPKPQRKTKRNTN\nRRPQDVKFPGG\n>two\nGAVLIMFWPSTCYNQDEKRH\n",
    )
    .unwrap();

    let status = Command::new(exe)
        .args([
            "compress",
            db_dir.to_str().unwrap(),
            input.to_str().unwrap(),
            "--map-seed-size",
            "3",
            "--min-match-len",
            "8",
            "--match-kmer-size",
            "3",
            "--ext-seed-size",
            "1",
        ])
        .status()
        .expect("compress failed to run");
    assert!(status.success());

    let status = Command::new(exe)
        .args([
            "decompress",
            db_dir.to_str().unwrap(),
            output.to_str().unwrap(),
        ])
        .status()
        .expect("decompress failed to run");
    assert!(status.success());

    let out = fs::read_to_string(&output).unwrap();
    assert_eq!(
        out,
        ">one first protein\nMSTNPKPQRKTKRNTNRRPQDVKFPGG\n>two\nGAVLIMFWPSTCYNQDEKRH\n"
    );
}

#[test]
fn append_and_overwrite_together_are_fatal() {
    let exe = env!("CARGO_BIN_EXE_paralog");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.fasta");
    fs::write(&input, ">a\nMSTNPK\n").unwrap();

    let output = Command::new(exe)
        .args([
            "compress",
            dir.path().join("db").to_str().unwrap(),
            input.to_str().unwrap(),
            "--append",
            "--overwrite",
        ])
        .output()
        .expect("compress failed to run");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mutually exclusive"), "stderr: {stderr}");
}

#[test]
fn frozen_seed_size_cannot_change_on_append() {
    let exe = env!("CARGO_BIN_EXE_paralog");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.fasta");
    let db_dir = dir.path().join("db");
    fs::write(&input, ">a\nMSTNPKPQRKTKRNTNRRPQDVKFPGG\n").unwrap();

    let status = Command::new(exe)
        .args([
            "compress",
            db_dir.to_str().unwrap(),
            input.to_str().unwrap(),
            "--map-seed-size",
            "3",
        ])
        .status()
        .expect("compress failed to run");
    assert!(status.success());

    let output = Command::new(exe)
        .args([
            "compress",
            db_dir.to_str().unwrap(),
            input.to_str().unwrap(),
            "--append",
            "--map-seed-size",
            "4",
        ])
        .output()
        .expect("compress failed to run");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("frozen"), "stderr: {stderr}");
}

#[test]
fn appending_through_the_cli_extends_the_database() {
    let exe = env!("CARGO_BIN_EXE_paralog");
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.fasta");
    let second = dir.path().join("second.fasta");
    let db_dir = dir.path().join("db");
    let output = dir.path().join("output.fasta");

    fs::write(&first, ">a\nMSTNPKPQRKTKRNTNRRPQDVKFPGG\n").unwrap();
    fs::write(&second, ">b\nGAVLIMFWPSTCYNQDEKRH\n").unwrap();

    for (fasta, extra) in [(&first, None), (&second, Some("--append"))] {
        let mut args = vec![
            "compress".to_string(),
            db_dir.to_str().unwrap().to_string(),
            fasta.to_str().unwrap().to_string(),
            "--map-seed-size".to_string(),
            "3".to_string(),
        ];
        if let Some(flag) = extra {
            args.push(flag.to_string());
        }
        let status = Command::new(exe).args(&args).status().unwrap();
        assert!(status.success());
    }

    let status = Command::new(exe)
        .args([
            "decompress",
            db_dir.to_str().unwrap(),
            output.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(status.success());
    let out = fs::read_to_string(&output).unwrap();
    assert_eq!(
        out,
        ">a\nMSTNPKPQRKTKRNTNRRPQDVKFPGG\n>b\nGAVLIMFWPSTCYNQDEKRH\n"
    );
}

#[test]
fn missing_input_files_are_fatal() {
    let exe = env!("CARGO_BIN_EXE_paralog");
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(exe)
        .args([
            "compress",
            dir.path().join("db").to_str().unwrap(),
            dir.path().join("nonexistent.fasta").to_str().unwrap(),
        ])
        .output()
        .expect("compress failed to run");
    assert_eq!(output.status.code(), Some(1));
}
