//! Subcommand handlers

use anyhow::{anyhow, Context};
use clap::ArgMatches;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use mpu_client::{Coordinator, UploadConfig};
use mpu_core::{BucketId, Key, ObjectStore, UploadResult};
use mpu_engine::Storage;

fn bucket(args: &ArgMatches) -> anyhow::Result<BucketId> {
    let name = args
        .get_one::<String>("bucket")
        .ok_or_else(|| anyhow!("--bucket is required"))?;
    Ok(BucketId::new(name)?)
}

/// Object key for an upload: `--key`, or the file name
fn object_key(args: &ArgMatches, file: &Path) -> anyhow::Result<Key> {
    if let Some(key) = args.get_one::<String>("key") {
        return Ok(Key::new(key)?);
    }
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("cannot derive a key from {}; pass --key", file.display()))?;
    Ok(Key::new(name)?)
}

fn upload_config(args: &ArgMatches) -> UploadConfig {
    let mut config = UploadConfig::default();
    if let Some(&part_size) = args.get_one::<u64>("part-size") {
        config = config.with_part_size(part_size);
    }
    if let Some(&concurrency) = args.get_one::<usize>("concurrency") {
        config = config.with_concurrency(concurrency);
    }
    if let Some(&retries) = args.get_one::<u32>("retries") {
        config = config.with_part_retries(retries);
    }
    config
}

pub async fn upload(storage: Storage, args: &ArgMatches) -> anyhow::Result<()> {
    let file = args
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("missing FILE"))?;
    let bucket = bucket(args)?;
    let key = object_key(args, file)?;
    let quiet = args.get_flag("quiet");

    let store: Arc<dyn ObjectStore> = Arc::new(storage);
    let mut coordinator = Coordinator::new(store, upload_config(args))?;
    if !quiet {
        coordinator = coordinator.with_progress(|progress| println!("{}", progress));
    }

    info!(
        "Uploading {} to {}/{} (part size {}, concurrency {})",
        file.display(),
        bucket,
        key,
        coordinator.config().part_size,
        coordinator.config().concurrency
    );

    match coordinator.upload_file(&bucket, &key, file).await {
        Ok(result) => {
            println!(
                "uploaded {}/{}: {} bytes, etag {}",
                bucket,
                result.object_key,
                result.size.unwrap_or_default(),
                result.etag.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Err(e) => {
            let result = UploadResult::failed(key, &e);
            error!(
                "Upload of {} failed during {} ({:?})",
                file.display(),
                e.phase(),
                result.error_kind
            );
            Err(anyhow::Error::new(e).context(format!("upload of {} failed", file.display())))
        }
    }
}

pub fn get(storage: &Storage, args: &ArgMatches) -> anyhow::Result<()> {
    let bucket = bucket(args)?;
    let key = Key::new(
        args.get_one::<String>("key")
            .ok_or_else(|| anyhow!("--key is required"))?,
    )?;
    let out = args
        .get_one::<PathBuf>("out")
        .ok_or_else(|| anyhow!("missing OUT"))?;

    if storage.get_metadata(&bucket, &key)?.is_none() {
        return Err(anyhow!("no object {}/{}", bucket, key));
    }

    let mut writer = BufWriter::new(
        File::create(out).with_context(|| format!("cannot create {}", out.display()))?,
    );
    let metadata = storage
        .write_object(&bucket, &key, &mut writer)?
        .ok_or_else(|| anyhow!("object {}/{} vanished during read", bucket, key))?;
    writer.flush()?;

    println!("wrote {} bytes to {}", metadata.size, out.display());
    Ok(())
}

pub fn list(storage: &Storage, args: &ArgMatches) -> anyhow::Result<()> {
    let bucket = bucket(args)?;
    let prefix = args.get_one::<String>("prefix").map(String::as_str).unwrap_or("");
    let limit = args.get_one::<usize>("limit").copied();

    for key in storage.list_objects(&bucket, prefix, limit)? {
        match storage.get_metadata(&bucket, &key)? {
            Some(metadata) => println!(
                "{}\t{}\t{}\t{}",
                key,
                metadata.size,
                metadata.version,
                metadata.etag()
            ),
            None => println!("{}", key),
        }
    }
    Ok(())
}

pub fn uploads(storage: &Storage) -> anyhow::Result<()> {
    for session in storage.list_uploads()? {
        println!("{}\t{}/{}", session.session_token, session.bucket, session.key);
    }
    Ok(())
}
