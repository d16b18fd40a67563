use eefs_counter::WearLevelCounter;
use eefs_mem::RamMedium;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BASE: u32 = 16;

/// Read the counter from a copy of `mem` with the supply back on (a reboot).
fn read_after_reboot(mut mem: RamMedium, len: u32) -> u32 {
    mem.restore_power();
    WearLevelCounter::new(mem, BASE, len).read().unwrap()
}

#[test]
fn test_interrupted_increment_never_overcounts() {
    for len in [16, 20, 32] {
        let mut counter = WearLevelCounter::new(RamMedium::new(128), BASE, len);
        counter.begin(false).unwrap();
        counter.resetcount(0x00FF_FFF0).unwrap();

        for _ in 0..len * 9 * 3 {
            let before = counter.read().unwrap();

            // Cut the supply after 0, 1, 2 program cycles of the same increment
            for budget in 0..3 {
                let mut mem = counter.medium().clone();
                mem.cut_power_after(budget);
                let mut victim = WearLevelCounter::new(mem, BASE, len);
                let _ = victim.increment();

                let seen = read_after_reboot(victim.into_inner(), len);
                assert!(
                    seen == before || seen == before.wrapping_add(1),
                    "len {}: {} after interrupted increment from {}", len, seen, before
                );
            }

            counter.increment().unwrap();
        }
    }
}

#[test]
fn test_recover_bumps_consistent_counter() {
    let mut counter = WearLevelCounter::new(RamMedium::new(128), BASE, 32);
    counter.begin(false).unwrap();
    counter.resetcount(41).unwrap();

    counter.begin(true).unwrap();
    assert_eq!(counter.read().unwrap(), 42);
}

#[test]
fn test_recover_after_torn_reset() {
    let len = 24;
    for cut in 0..len as usize {
        let mut counter = WearLevelCounter::new(RamMedium::new(128), BASE, len);
        counter.begin(false).unwrap();
        for _ in 0..77 { counter.increment().unwrap(); }

        // Supply fails part way through rewriting the region
        counter.medium_mut().cut_power_after(cut);
        let _ = counter.resetcount(0xABCD_0123);
        counter.medium_mut().restore_power();

        let before = counter.read().unwrap();
        counter.begin(true).unwrap();
        assert_eq!(counter.read().unwrap(), before.wrapping_add(1), "cut after {}", cut);
    }
}

#[test]
fn test_recover_from_corrupted_bytes() {
    let mut rng = StdRng::seed_from_u64(0xEE);
    for round in 0..200 {
        let len = 16 + (round % 20);
        let mut counter = WearLevelCounter::new(RamMedium::new(128), BASE, len);
        counter.begin(false).unwrap();
        counter.resetcount(rng.gen()).unwrap();
        for _ in 0..rng.gen_range(0..200) { counter.increment().unwrap(); }

        // Flip a few bytes anywhere in the region
        for _ in 0..rng.gen_range(1..4) {
            let addr = BASE + rng.gen_range(0..len);
            counter.medium_mut().poke(addr, rng.gen());
        }

        let before = counter.read().unwrap();
        counter.begin(true).unwrap();
        assert_eq!(counter.read().unwrap(), before.wrapping_add(1), "round {}", round);
    }
}

#[test]
fn test_recover_with_torn_erase_write() {
    let mut counter = WearLevelCounter::new(RamMedium::new(128), BASE, 32);
    counter.begin(false).unwrap();
    counter.resetcount(0).unwrap();

    // Only the last chain byte differs (0x80 -> 0x70): its erase lands, its write does not
    counter.medium_mut().tear_next_program();
    let _ = counter.resetcount(0x7F);
    counter.medium_mut().restore_power();
    assert_eq!(counter.medium().as_bytes()[BASE as usize + 4], 0xFF);

    let before = counter.read().unwrap();
    counter.begin(true).unwrap();
    assert_eq!(counter.read().unwrap(), before.wrapping_add(1));
}
