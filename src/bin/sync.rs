//! `rds-sync`: the `--ds1`/`--ds2` sync driver (spec.md §6), grounded in
//! `sync_datastores.py`'s `get_datastore`/`break_url`/`Command.handle`.

use std::process::ExitCode;

use clap::Parser;
use reldatasync::config::init_tracing;
use reldatasync::datastore::postgres::PostgresBackend;
use reldatasync::datastore::sqlite::SqliteBackend;
use reldatasync::datastore::{Datastore, Store};
use reldatasync::replicator::Replicator;
use sqlx::{PgPool, SqlitePool};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "rds-sync", about = "Synchronize two datastores")]
struct Args {
    #[arg(long)]
    ds1: String,

    #[arg(long)]
    ds2: String,

    #[arg(long, default_value_t = 100)]
    chunk_size: u32,
}

/// Parses `postgresql://user:pw@host/db/table?datastore=NAME` or
/// `sqlite:///path/table?datastore=NAME`, mirroring `break_url` + the
/// `urlparse` dispatch in `get_datastore`.
async fn open_datastore(url_str: &str) -> anyhow::Result<Box<dyn Datastore>> {
    let url = Url::parse(url_str)?;
    let datastore_name = url
        .query_pairs()
        .find(|(k, _)| k == "datastore")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow::anyhow!("missing datastore query parameter in URL: {url_str}"))?;

    let path_components: Vec<&str> = url.path().trim_start_matches('/').split('/').collect();
    let (db_part, table) = match path_components.as_slice() {
        [db, table] => (*db, *table),
        _ => anyhow::bail!("expected /<db>/<table> in URL path: {url_str}"),
    };

    match url.scheme() {
        "postgresql" => {
            let dsn = format!(
                "postgresql://{}:{}@{}/{}",
                url.username(),
                url.password().unwrap_or(""),
                url.host_str().unwrap_or("localhost"),
                db_part,
            );
            let pool = PgPool::connect(&dsn).await?;
            let backend = PostgresBackend::acquire(pool, table, datastore_name, None, None).await?;
            Ok(Box::new(Store::new(backend)))
        }
        "sqlite" => {
            let pool = SqlitePool::connect(db_part).await?;
            let backend = SqliteBackend::acquire(pool, table, datastore_name, None, None).await?;
            Ok(Box::new(Store::new(backend)))
        }
        other => anyhow::bail!("unknown datastore URL scheme {other}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rds-sync: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let ds1 = open_datastore(&args.ds1).await?;
    let ds2 = open_datastore(&args.ds2).await?;

    Replicator::sync_both_directions(ds1.as_ref(), ds2.as_ref(), args.chunk_size).await?;

    let ok1 = ds1.check().await?;
    let ok2 = ds2.check().await?;
    if !ok1 || !ok2 {
        anyhow::bail!("post-sync check() failed: ds1={ok1} ds2={ok2}");
    }

    println!(
        "ds1 seq: {}, ds2 seq: {}",
        ds1.sequence_id().await?,
        ds2.sequence_id().await?
    );
    Ok(())
}
