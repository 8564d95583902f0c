//! Property tests: any file layout round-trips through the coordinator

mod common;

use common::*;
use mpu_client::*;
use mpu_core::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_upload_round_trips(
        len in 1usize..20_000,
        part_size in 256u64..4_096,
        concurrency in 1usize..6,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let (path, data) = write_fixture(dir.path(), len);
            let (bucket, key) = ids();
            let store = TestStore::new();

            let config = UploadConfig::default()
                .with_part_size(part_size)
                .with_concurrency(concurrency)
                .with_retry_delay(Duration::ZERO);
            let coordinator = Coordinator::new(store.clone() as Arc<dyn ObjectStore>, config).unwrap();

            let result = coordinator.upload_file(&bucket, &key, &path).await.unwrap();
            let expected_parts = (len as u64).div_ceil(part_size);
            let suffix = format!("-{}", expected_parts);
            let etag = result.etag.unwrap_or_default();
            prop_assert!(etag.ends_with(&suffix), "etag {} lacks part count {}", etag, suffix);
            prop_assert!(TestStore::count(&store.max_in_flight) <= concurrency);

            let stored = store.storage().get_object(&bucket, &key).unwrap().unwrap();
            prop_assert_eq!(stored, data);
            Ok(())
        })?;
    }
}
