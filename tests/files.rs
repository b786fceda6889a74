use std::path::Path;
use std::process::Command;

use lh5::{
    Array, FileMode, Lh5File, Lh5Object, ReadOptions, Scalar, Table, TruncateOptions,
    VectorOfVectors, WriteOptions, truncate,
};

fn tempdir() -> tempfile::TempDir {
    env_logger::try_init().ok();
    tempfile::tempdir().expect("temporary directory")
}

fn raw_table(n: usize) -> Table {
    Table::from_fields([
        (
            "energy",
            Lh5Object::from(Array::new((0..n).map(|i| i as f64).collect::<Vec<_>>()).with_units("keV")),
        ),
        (
            "waveform",
            Table::waveforms(
                Array::new(vec![0.0f64; n]),
                Array::new(vec![16.0f32; n]),
                Array::equal_sized(vec![7u16; n * 4], 4).expect("valid rows"),
            )
            .expect("valid waveforms")
            .into(),
        ),
        (
            "hits",
            VectorOfVectors::from_vecs((0..n).map(|i| vec![i as i32; i % 2]).collect()).into(),
        ),
    ])
    .expect("valid table")
}

fn write_sample(path: &Path) {
    let mut f = Lh5File::open(path, FileMode::Create).expect("create file");
    let opts = WriteOptions::default().in_group("ch1");
    f.write(&raw_table(10).into(), "raw", &opts)
        .expect("write table");
    f.write(&Scalar::new("p03").into(), "period", &WriteOptions::default())
        .expect("write scalar");
}

#[test]
fn test_filesystem_roundtrip() {
    let dir = tempdir();
    let path = dir.path().join("run.lh5");
    write_sample(&path);

    let f = Lh5File::open(&path, FileMode::Read).expect("open for reading");
    assert_eq!(f.version().expect("version"), lh5::metadata::LH5_VERSION);
    assert_eq!(
        f.read("ch1/raw", &ReadOptions::default()).expect("read"),
        raw_table(10).into()
    );
    assert_eq!(
        f.read("period", &ReadOptions::default()).expect("read"),
        Scalar::new("p03").into()
    );
}

#[test]
fn test_file_modes() {
    let dir = tempdir();
    let path = dir.path().join("run.lh5");
    assert!(matches!(
        Lh5File::open(&path, FileMode::Read),
        Err(lh5::Error::NotFound(_))
    ));
    write_sample(&path);
    assert!(matches!(
        Lh5File::open(&path, FileMode::Create),
        Err(lh5::Error::PathExists(_))
    ));

    let mut f = Lh5File::open(&path, FileMode::ReadWrite).expect("open for writing");
    f.write(&Scalar::new(1u8).into(), "extra", &WriteOptions::default())
        .expect("write");
    assert_eq!(f.ls("").expect("ls"), vec!["ch1", "extra", "period"]);

    let f = Lh5File::open(&path, FileMode::Overwrite).expect("overwrite");
    assert!(f.ls("").expect("ls").is_empty());
}

#[test]
fn test_truncate() {
    let dir = tempdir();
    let input = dir.path().join("in.lh5");
    let output = dir.path().join("out.lh5");
    write_sample(&input);

    let opts = TruncateOptions {
        exclude: vec!["ch1/raw/waveform".into()],
        ..Default::default()
    };
    truncate(&input, &output, 2..5, &opts).expect("truncate");

    let out = Lh5File::open(&output, FileMode::Read).expect("open output");
    let Lh5Object::Table(t) = out.read("ch1/raw", &ReadOptions::default()).expect("read") else {
        panic!("expected a table");
    };
    assert_eq!(t.names().collect::<Vec<_>>(), vec!["energy", "hits"]);
    assert_eq!(t.len(), 3);
    let expected = raw_table(10).slice(2..5).expect("slice");
    assert_eq!(t.get("energy").expect("energy"), expected.get("energy").expect("energy"));
    assert_eq!(t.get("hits").expect("hits"), expected.get("hits").expect("hits"));
    assert_eq!(
        out.read("period", &ReadOptions::default()).expect("read"),
        Scalar::new("p03").into()
    );

    // output exists now
    assert!(truncate(&input, &output, 0..1, &opts).is_err());
    let overwrite = TruncateOptions {
        include: Some(vec!["period".into()]),
        overwrite: true,
        ..Default::default()
    };
    truncate(&input, &output, 0..1, &overwrite).expect("truncate again");
    let out = Lh5File::open(&output, FileMode::Read).expect("open output");
    assert_eq!(out.ls("").expect("ls"), vec!["period"]);
}

#[test]
fn test_truncate_with_globs() {
    let dir = tempdir();
    let input = dir.path().join("in.lh5");
    write_sample(&input);

    let energy_only = TruncateOptions {
        include: Some(vec!["*/energy".into()]),
        ..Default::default()
    };
    let output = dir.path().join("energy.lh5");
    truncate(&input, &output, 0..4, &energy_only).expect("truncate");
    let out = Lh5File::open(&output, FileMode::Read).expect("open output");
    assert_eq!(out.ls("").expect("ls"), vec!["ch1"]);
    let Lh5Object::Table(t) = out.read("ch1/raw", &ReadOptions::default()).expect("read") else {
        panic!("expected a table");
    };
    assert_eq!(t.names().collect::<Vec<_>>(), vec!["energy"]);
    assert_eq!(t.len(), 4);

    // dropping one waveform column drops the whole waveform table
    let no_values = TruncateOptions {
        exclude: vec!["ch*/raw/waveform/values".into()],
        ..Default::default()
    };
    let output = dir.path().join("no_values.lh5");
    truncate(&input, &output, 0..4, &no_values).expect("truncate");
    let out = Lh5File::open(&output, FileMode::Read).expect("open output");
    assert_eq!(
        out.ls("ch1/raw").expect("ls"),
        vec!["ch1/raw/energy", "ch1/raw/hits"]
    );

    let bad = TruncateOptions {
        include: Some(vec!["ch[".into()]),
        ..Default::default()
    };
    let output = dir.path().join("bad.lh5");
    assert!(truncate(&input, &output, 0..4, &bad).is_err());
    assert!(!output.exists());
}

fn lh5ls(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_lh5ls"))
        .args(args)
        .output()
        .expect("run lh5ls")
}

#[test]
fn test_lh5ls() {
    let dir = tempdir();
    let path = dir.path().join("run.lh5");
    write_sample(&path);
    let path = path.to_str().expect("utf-8 path");

    let out = lh5ls(&[path, "-a"]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).expect("utf-8 output");
    assert!(stdout.contains("raw · table{energy,waveform,hits}"));
    assert!(stdout.contains("period · string"));
    assert!(stdout.contains("@units = \"keV\""));

    let out = lh5ls(&[path, "ch1", "--recursive-depth", "1"]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).expect("utf-8 output");
    assert!(stdout.contains("└── raw"));
    assert!(!stdout.contains("── energy"));

    let missing = dir.path().join("missing.lh5");
    let out = lh5ls(&[missing.to_str().expect("utf-8 path")]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(lh5ls(&[path, "-d"]).status.code(), Some(1));
}
