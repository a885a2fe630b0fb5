//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Frame encoding and CRC validation
//! - LSN sequencing across reopen
//! - Reading entries back in order
//! - Recovery from torn tails and corrupted frames

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use stringdb::config::WalSyncStrategy;
use stringdb::wal::{Operation, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE};
use stringdb::StringDbError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn batch(first_key: u64, count: usize) -> Operation {
    Operation::InsertBatch {
        first_key,
        values: (0..count).map(|i| format!("{:>4}", i)).collect(),
    }
}

fn write_batches(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer.append(batch(1 + (i as u64) * 10, 10)).unwrap();
    }
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_frame_layout() {
    let entry = WalEntry::new(7, batch(1, 3));
    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
    assert_eq!(WalEntry::frame_len(&bytes), bytes.len());

    let decoded = WalEntry::deserialize(&bytes).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_entry_crc_detects_flipped_byte() {
    let mut bytes = WalEntry::new(1, batch(1, 5)).serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let err = WalEntry::deserialize(&bytes).unwrap_err();
    assert!(matches!(err, StringDbError::WalCorruption(_)));
}

#[test]
fn test_entry_truncated_payload() {
    let bytes = WalEntry::new(1, batch(1, 5)).serialize().unwrap();
    let err = WalEntry::deserialize(&bytes[..bytes.len() - 3]).unwrap_err();
    assert!(matches!(err, StringDbError::WalCorruption(_)));

    let err = WalEntry::deserialize(&bytes[..HEADER_SIZE - 1]).unwrap_err();
    assert!(matches!(err, StringDbError::WalCorruption(_)));
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_lsn_sequential() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    for expected in 1..=20u64 {
        assert_eq!(writer.append(batch(expected, 1)).unwrap(), expected);
    }
    assert_eq!(writer.current_lsn(), 21);
}

#[test]
fn test_lsn_continues_after_reopen() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 3);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 4);
    assert_eq!(writer.append(batch(31, 1)).unwrap(), 4);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(batch(1, 1)).unwrap();
    writer.append(batch(2, 1)).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(batch(3, 1)).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_truncate_empties_file_keeps_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(batch(1, 10)).unwrap();
    writer.append(batch(11, 10)).unwrap();

    writer.truncate().unwrap();
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    assert_eq!(writer.append(batch(21, 1)).unwrap(), 3);
    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 3);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_returns_entries_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 5);

    let mut reader = WalReader::open(&wal_path).unwrap();
    let mut lsns = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        lsns.push(entry.lsn);
    }

    assert_eq!(lsns, vec![1, 2, 3, 4, 5]);
    assert_eq!(reader.position(), fs::metadata(&wal_path).unwrap().len());
}

#[test]
fn test_reader_reports_partial_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 2);

    let len = fs::metadata(&wal_path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&wal_path)
        .unwrap()
        .set_len(len - 5)
        .unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(matches!(
        reader.next_entry(),
        Err(StringDbError::WalCorruption(_))
    ));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 4);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 4);
    assert_eq!(result.entries_recovered, 4);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 4);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 3);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    // Half of a fourth frame
    let torn = WalEntry::new(4, batch(31, 10)).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&torn[..torn.len() / 2]).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_stops_at_corrupted_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut file = File::create(&wal_path).unwrap();
    let good = WalEntry::new(1, batch(1, 10)).serialize().unwrap();
    let mut bad = WalEntry::new(2, batch(11, 10)).serialize().unwrap();
    bad[HEADER_SIZE + 2] ^= 0xAA;
    let after = WalEntry::new(3, batch(21, 10)).serialize().unwrap();
    file.write_all(&good).unwrap();
    file.write_all(&bad).unwrap();
    file.write_all(&after).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good.len() as u64);
}

#[test]
fn test_verify_does_not_modify() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 2);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    drop(file);
    let len = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len);
}
