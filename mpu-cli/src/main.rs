//! mpu: upload files into a local chunked object store

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use mpu_engine::{Storage, StorageEngine};

mod commands;

fn cli() -> Command {
    Command::new("mpu")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Concurrent multipart uploads into a local object store")
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("PATH")
                .help("Store directory")
                .default_value("./data")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log output format")
                .value_parser(["text", "json"])
                .default_value("text")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("upload")
                .about("Upload a file as one object")
                .arg(Arg::new("file").value_name("FILE").required(true).value_parser(value_parser!(PathBuf)))
                .arg(bucket_arg())
                .arg(
                    Arg::new("key")
                        .long("key")
                        .value_name("KEY")
                        .help("Object key (defaults to the file name)"),
                )
                .arg(
                    Arg::new("part-size")
                        .long("part-size")
                        .value_name("BYTES")
                        .help("Bytes per part")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_name("N")
                        .help("Parts uploading at once")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("retries")
                        .long("retries")
                        .value_name("N")
                        .help("Extra attempts per part after a retryable failure")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("quiet")
                        .long("quiet")
                        .short('q')
                        .help("Do not print progress")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Write an object to a file")
                .arg(bucket_arg())
                .arg(Arg::new("key").long("key").value_name("KEY").required(true))
                .arg(Arg::new("out").value_name("OUT").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("ls")
                .about("List objects in a bucket")
                .arg(bucket_arg())
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .value_name("PREFIX")
                        .default_value(""),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(Command::new("uploads").about("List open upload sessions"))
}

fn bucket_arg() -> Arg {
    Arg::new("bucket")
        .long("bucket")
        .value_name("BUCKET")
        .required(true)
}

fn init_tracing(matches: &ArgMatches) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match matches.get_one::<String>("log-format").map(String::as_str) {
        Some("json") => builder.json().init(),
        _ => builder.init(),
    }
}

fn open_store(matches: &ArgMatches) -> anyhow::Result<Storage> {
    let data_dir = matches
        .get_one::<PathBuf>("data-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("./data"));

    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        info!("Created data directory: {}", data_dir.display());
    }

    let engine = StorageEngine::new(&data_dir)
        .map_err(|e| anyhow::anyhow!("failed to open store at {}: {}", data_dir.display(), e))?;
    Ok(Storage::new(engine))
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    let storage = open_store(&matches)?;

    match matches.subcommand() {
        Some(("upload", args)) => commands::upload(storage, args).await,
        Some(("get", args)) => commands::get(&storage, args),
        Some(("ls", args)) => commands::list(&storage, args),
        Some(("uploads", _)) => commands::uploads(&storage),
        _ => unreachable!("subcommand_required is set"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(&matches);

    match run(matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
