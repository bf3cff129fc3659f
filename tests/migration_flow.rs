use chrono::{TimeZone, Utc};
use otpmig_lib::commands;
use otpmig_otp::migration::{
    build_batches, decode_migration_uri, encode_entry_uri, encode_migration_uri, Algorithm,
    DigitCount, MigrationBatch, MigrationErrorKind, OtpEngine, OtpEntry, OtpType, PngQrEncoder,
};

const SAMPLE: &str = "otpauth-migration://offline?data=CjEKCkhlbGxvId6tvu8SGEV4YW1wbGU6YWxpY2VAZ29vZ2xlLmNvbRoHRXhhbXBsZTAC";

fn credential_list() -> String {
    let mut lines = Vec::new();
    for c in 'a'..='o' {
        lines.push(format!(
            "otpauth://totp/Example:user{}@example.com?secret=JBSWY3DPEHPK3PXP&issuer=Example",
            c
        ));
    }
    lines.push("invalid line".into());
    lines.push("not an otpauth line".into());
    lines.push("otpauth://totp/Missing?issuer=Secret".into());
    lines.join("\n")
}

#[test]
fn credential_uris_survive_a_batch_round_trip() {
    let original = decode_migration_uri(SAMPLE).unwrap();
    let uris: Vec<String> = original.entries.iter().map(encode_entry_uri).collect();

    let builds = build_batches(&uris.join("\n"), 10).unwrap();
    assert_eq!(builds.len(), 1);
    let rebuilt = decode_migration_uri(&builds[0].migration_uri().unwrap()).unwrap();

    let a = &original.entries[0];
    let b = &rebuilt.entries[0];
    assert_eq!(a.secret, b.secret);
    assert_eq!(a.issuer, b.issuer);
    // The rebuilt label drops the redundant issuer prefix.
    assert_eq!(b.name, "alice@google.com");
    assert_eq!(b.algorithm, Algorithm::Sha1);
    assert_eq!(b.digits, DigitCount::Six);
    assert_eq!(b.otp_type, OtpType::Totp);
}

#[test]
fn rebuilt_batch_evaluates_to_the_same_codes() {
    let now = Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap();
    let engine = OtpEngine::default();

    let mut original = decode_migration_uri(SAMPLE).unwrap();
    let uri = encode_entry_uri(&original.entries[0]);
    let mut rebuilt = build_batches(&uri, 1).unwrap().remove(0).batch;

    assert_eq!(engine.evaluate_string(&mut original.entries[0], now).unwrap(), "528064");
    assert_eq!(engine.evaluate_string(&mut rebuilt.entries[0], now).unwrap(), "528064");
}

#[test]
fn multi_entry_batch_round_trip() {
    let batch = MigrationBatch {
        version: 1,
        batch_size: 3,
        batch_index: 2,
        batch_id: -42,
        entries: vec![
            OtpEntry::new("a", b"secret-a".to_vec()).with_algorithm(Algorithm::Sha512),
            OtpEntry::new("b", b"secret-b".to_vec()).as_hotp(u64::MAX),
            OtpEntry::new("c", b"secret-c".to_vec()).with_digits(DigitCount::Eight),
        ],
    };
    assert_eq!(decode_migration_uri(&encode_migration_uri(&batch)).unwrap(), batch);
}

#[test]
fn file_to_batches_writes_pngs_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("urls.txt");
    std::fs::write(&input, credential_list()).unwrap();
    let workdir = dir.path().join("output");

    let mut out = Vec::new();
    let summary = commands::build_from_file(
        &input,
        5,
        &workdir,
        "test-batch",
        &PngQrEncoder::default(),
        &mut out,
    )
    .unwrap();

    assert_eq!(summary.total_urls, 16);
    assert_eq!(summary.processed_urls, 15);
    assert_eq!(summary.skipped_urls, 1);
    assert_eq!(summary.non_empty_batches, 3);

    for n in 1..=3 {
        let png = std::fs::read(workdir.join(format!("test-batch_{}.png", n))).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }
    assert!(!workdir.join("test-batch_4.png").exists());

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Found 16 otpauth URLs, creating 4 batches\n"));
    assert!(text.contains("Skipping batch 4"));
    assert!(text.contains("Successfully processed batches: 3 out of 4"));
    let links: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("otpauth-migration://"))
        .collect();
    assert_eq!(links.len(), 3);
    let first = decode_migration_uri(links[0]).unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(first.batch_size, 4);
}

#[test]
fn file_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.txt");
    std::fs::write(&input, "nothing\nuseful\n").unwrap();
    let mut out = Vec::new();
    let err = commands::build_from_file(&input, 5, dir.path(), "b", &PngQrEncoder::default(), &mut out)
        .unwrap_err();
    assert!(err.to_string().contains("no otpauth:// URLs"));
}

#[test]
fn strict_mode_rejects_uncounted_hotp() {
    let batch = MigrationBatch {
        entries: vec![OtpEntry::new("hotp", b"k".to_vec()).as_hotp(0)],
        ..Default::default()
    };
    let link = encode_migration_uri(&batch);
    let mut out = Vec::new();
    assert!(commands::print_credentials(&link, false, None, &mut out).is_ok());
    let err = commands::print_credentials(&link, true, None, &mut Vec::new()).unwrap_err();
    let err = err.downcast::<otpmig_otp::migration::MigrationError>().unwrap();
    assert_eq!(err.kind, MigrationErrorKind::ValidationFailed);
}
