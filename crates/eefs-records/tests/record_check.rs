use eefs_core::{EeError, Region, FORMAT_IMAGE};
use eefs_mem::RamMedium;
use eefs_records::RecordStore;

const BASE: u32 = 16;

fn open(len: u32) -> RecordStore<RamMedium> {
    RecordStore::open(RamMedium::new(1024), Region::new(BASE, len)).unwrap()
}

fn bytes(store: &RecordStore<RamMedium>) -> Vec<u8> {
    let r = store.region();
    store.medium().as_bytes()[r.start as usize..r.end() as usize].to_vec()
}

#[test]
fn test_format_is_idempotent() {
    let mut store = open(64);
    assert_eq!(&bytes(&store)[..6], &FORMAT_IMAGE);

    let snapshot = bytes(&store);
    let programs = store.medium().total_writes() + store.medium().total_erases();
    store.begin().unwrap();
    store.begin().unwrap();
    assert_eq!(bytes(&store), snapshot);
    assert_eq!(store.medium().total_writes() + store.medium().total_erases(), programs);
}

#[test]
fn test_region_must_fit() {
    let too_far = RecordStore::open(RamMedium::new(64), Region::new(32, 64));
    assert!(matches!(too_far.err(), Some(EeError::OutOfRange { .. })));

    let too_short = RecordStore::open(RamMedium::new(64), Region::new(0, 5));
    assert!(matches!(too_short.err(), Some(EeError::OutOfRange { .. })));
}

#[test]
fn test_length_byte_repaired_alone() {
    let mut store = open(64);
    store.update_record(9, &[1, 2, 3]).unwrap();

    store.medium_mut().poke(BASE, 0x33);
    store.begin().unwrap();
    assert_eq!(bytes(&store)[0], 0x04);
    assert_eq!(store.read_record(9).unwrap(), Some(vec![1, 2, 3]));
}

#[test]
fn test_bad_signature_reformats() {
    let mut store = open(64);
    store.update_record(9, &[1, 2, 3]).unwrap();

    store.medium_mut().poke(BASE + 2, b'X');
    store.begin().unwrap();
    assert_eq!(&bytes(&store)[..6], &FORMAT_IMAGE);
    assert_eq!(store.get_record_address(9).unwrap(), None);
}

#[test]
fn test_record_layout() {
    let mut store = open(64);
    assert!(store.update_record(5, &[0xAA]).unwrap());

    let b = bytes(&store);
    assert_eq!(&b[5..9], &[2, 5, 0xAA, 0]);
    assert_eq!(store.get_record_address(5).unwrap(), Some((BASE + 6, 1)));
    assert_eq!(store.end_of_records().unwrap(), BASE + 8);
}

#[test]
fn test_lookup_is_deterministic() {
    let mut store = open(64);
    store.update_record(5, &[1, 2]).unwrap();
    let (addr, size) = store.get_record_address(5).unwrap().unwrap();
    store.update_record(9, &[7, 7, 7]).unwrap();
    let end = store.end_of_records().unwrap();

    store.update_record(5, &[3, 4]).unwrap();
    assert_eq!(store.get_record_address(5).unwrap(), Some((addr, size)));
    assert_eq!(store.read_record(5).unwrap(), Some(vec![3, 4]));
    assert_eq!(store.read_record(9).unwrap(), Some(vec![7, 7, 7]));
    assert_eq!(store.end_of_records().unwrap(), end);
}

#[test]
fn test_shorter_update_keeps_tail() {
    let mut store = open(64);
    store.update_record(5, &[1, 2, 3, 4]).unwrap();

    assert!(store.update_record(5, &[9]).unwrap());
    assert_eq!(store.read_record(5).unwrap(), Some(vec![9, 2, 3, 4]));

    let snapshot = bytes(&store);
    assert!(!store.update_record(5, &[1, 2, 3, 4, 5]).unwrap());
    assert_eq!(bytes(&store), snapshot);
}

#[test]
fn test_payload_size_is_clamped() {
    let mut store = open(600);
    assert!(store.update_record(1, &[]).unwrap());
    assert_eq!(store.read_record(1).unwrap(), Some(vec![0]));

    assert!(store.update_record_byte(2, 0x5A).unwrap());
    assert_eq!(store.read_record(2).unwrap(), Some(vec![0x5A]));

    let long: Vec<u8> = (0..300).map(|i| i as u8).collect();
    assert!(store.update_record(3, &long).unwrap());
    assert_eq!(store.read_record(3).unwrap(), Some(long[..254].to_vec()));
}

#[test]
fn test_full_region_rejects_append() {
    let mut store = open(16);
    assert!(store.update_record(1, &[1, 2, 3]).unwrap());
    assert!(store.update_record(2, &[1, 2, 3]).unwrap());

    let snapshot = bytes(&store);
    assert!(!store.update_record(3, &[1, 2, 3]).unwrap());
    assert!(!store.update_record_byte(4, 1).unwrap());
    assert_eq!(bytes(&store), snapshot);

    // Records already present still update in place
    assert!(store.update_record(2, &[4, 5, 6]).unwrap());
    assert_eq!(store.read_record(2).unwrap(), Some(vec![4, 5, 6]));
}

#[test]
fn test_signature_key_is_usable() {
    let mut store = open(64);
    assert_eq!(store.get_record_address(b'C').unwrap(), None);
    assert!(store.update_record(b'C', &[1]).unwrap());
    assert_eq!(store.get_record_address(b'C').unwrap(), Some((BASE + 6, 1)));
    assert_eq!(&bytes(&store)[..5], &FORMAT_IMAGE[..5]);
}

#[test]
fn test_interrupted_append_is_invisible() {
    let region = Region::new(BASE, 64);
    let mut store = RecordStore::open(RamMedium::new(256), region).unwrap();
    store.update_record(5, &[0x11]).unwrap();

    // Terminator, key, three payload bytes, then the length byte
    for budget in 0..7 {
        let mut mem = store.medium().clone();
        mem.cut_power_after(budget);
        let mut victim = RecordStore::open(mem, region).unwrap();
        let _ = victim.update_record(9, &[1, 2, 3]);

        let mut mem = victim.into_inner();
        mem.restore_power();
        let mut rebooted = RecordStore::open(mem, region).unwrap();
        assert_eq!(rebooted.read_record(5).unwrap(), Some(vec![0x11]));

        if budget < 6 {
            assert_eq!(rebooted.get_record_address(9).unwrap(), None, "budget {}", budget);
            assert!(rebooted.update_record(9, &[4, 5, 6]).unwrap());
            assert_eq!(rebooted.read_record(9).unwrap(), Some(vec![4, 5, 6]));
        } else {
            assert_eq!(rebooted.read_record(9).unwrap(), Some(vec![1, 2, 3]));
        }
    }
}

#[test]
fn test_overrunning_length_ends_scan() {
    let mut store = open(32);
    store.update_record(5, &[1]).unwrap();
    let end = store.end_of_records().unwrap();

    // A length that runs past the region hides itself and blocks appends
    store.medium_mut().poke(end, 200);
    assert_eq!(store.end_of_records().unwrap(), end);
    assert_eq!(store.read_record(5).unwrap(), Some(vec![1]));
    assert!(!store.update_record(6, &[1]).unwrap());
}
