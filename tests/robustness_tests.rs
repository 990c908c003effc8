use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_malformed_script_rows_are_skipped() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op, credential, arg, extra").unwrap();
    writeln!(script, "start, alice, CART001,").unwrap();
    // Unknown op
    writeln!(script, "dance, alice, CART001,").unwrap();
    // Scan without a tag
    writeln!(script, "scan, alice,,").unwrap();
    writeln!(script, "scan, alice, 53EEC752110001,").unwrap();
    writeln!(script, "checkout, alice, mobile_wallet,").unwrap();
    writeln!(script, "verify, alice,,").unwrap();

    let mut cmd = Command::new(cargo_bin!("shopngo"));
    cmd.arg("replay")
        .arg(script.path())
        .arg("--catalog")
        .arg("tests/fixtures/products.csv");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains(
            ",alice,1,2.50,mobile_wallet,,completed,",
        ));
}

#[test]
fn test_failing_commands_do_not_stop_replay() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op, credential, arg, extra").unwrap();
    // No session yet
    writeln!(script, "scan, alice, 53EEC752110001,").unwrap();
    // Wrong code, then no code sent yet
    writeln!(script, "verify, alice, 12,").unwrap();
    writeln!(script, "start, alice, CART404,").unwrap();
    writeln!(script, "start, alice, CART002,").unwrap();
    writeln!(script, "checkout, alice, mobile_wallet,").unwrap();
    writeln!(script, "scan, alice, 1234567890ABCD,").unwrap();
    writeln!(script, "checkout, alice, visa,").unwrap();
    writeln!(script, "checkout, alice, visa, 5500-0000-0000-0004").unwrap();
    writeln!(script, "verify, alice,,").unwrap();

    let mut cmd = Command::new(cargo_bin!("shopngo"));
    cmd.arg("replay")
        .arg(script.path())
        .arg("--catalog")
        .arg("tests/fixtures/products.csv");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error processing command"))
        .stderr(predicate::str::contains("Card number required for visa payment"))
        .stdout(predicate::str::contains(",alice,1,3.99,visa,****0004,completed,"))
        .stdout(predicate::str::contains("2,CART002,true"));
}

#[test]
fn test_malformed_catalog_rows_are_skipped() {
    let mut catalog = tempfile::NamedTempFile::new().unwrap();
    writeln!(catalog, "id, name, price, stock_quantity, rfid_tag").unwrap();
    writeln!(catalog, "apple, Apple, not_a_number, 10, 53EEC752110001").unwrap();
    writeln!(catalog, "milk, Milk, 3.99, 10, 1234567890ABCD").unwrap();

    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op, credential, arg, extra").unwrap();
    writeln!(script, "start, alice, CART001,").unwrap();
    writeln!(script, "scan, alice, 53EEC752110001,").unwrap();
    writeln!(script, "scan, alice, 1234567890ABCD,").unwrap();
    writeln!(script, "checkout, alice, mobile_wallet,").unwrap();
    writeln!(script, "verify, alice,,").unwrap();

    let mut cmd = Command::new(cargo_bin!("shopngo"));
    cmd.arg("replay")
        .arg(script.path())
        .arg("--catalog")
        .arg(catalog.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading product"))
        .stderr(predicate::str::contains("Product not found: 53EEC752110001"))
        .stdout(predicate::str::contains(",alice,1,3.99,mobile_wallet,,completed,"));
}
