//! Property-based tests for part partitioning

use proptest::prelude::*;
use mpu_core::*;

proptest! {
    #[test]
    fn props_parts_are_contiguous_and_cover_file(
        file_size in 1u64..50_000_000,
        part_size in 1u64..5_000_000,
    ) {
        let partition = Partition::new(file_size, part_size).unwrap();
        let parts: Vec<PartDescriptor> = partition.iter().collect();

        prop_assert_eq!(parts.len() as u64, file_size.div_ceil(part_size));
        prop_assert_eq!(parts.len() as u32, partition.total_parts());

        let mut expected_offset = 0u64;
        for (i, part) in parts.iter().enumerate() {
            prop_assert_eq!(part.part_number, i as u32 + 1);
            prop_assert_eq!(part.byte_offset, expected_offset);
            prop_assert!(part.byte_length >= 1);
            prop_assert!(part.byte_length <= part_size);
            expected_offset = part.end();
        }
        prop_assert_eq!(expected_offset, file_size);
    }

    #[test]
    fn props_only_last_part_may_be_short(
        file_size in 1u64..10_000_000,
        part_size in 1u64..1_000_000,
    ) {
        let partition = Partition::new(file_size, part_size).unwrap();
        let total = partition.total_parts();

        for part in partition.iter().filter(|p| p.part_number < total) {
            prop_assert_eq!(part.byte_length, part_size);
        }

        let last = partition.get(total).unwrap();
        prop_assert_eq!(last.byte_length, file_size - u64::from(total - 1) * part_size);
    }

    #[test]
    fn props_lookup_matches_iteration(
        file_size in 1u64..1_000_000,
        part_size in 1u64..100_000,
    ) {
        let partition = Partition::new(file_size, part_size).unwrap();
        for part in &partition {
            prop_assert_eq!(partition.get(part.part_number), Some(part));
        }
    }
}

#[test]
fn test_zero_size_is_always_rejected() {
    for part_size in [1, 1024, u64::MAX] {
        assert!(matches!(
            Partition::new(0, part_size),
            Err(UploadError::EmptyFile { .. })
        ));
    }
}
