//! Herald agent — secret sync for deploy pre-hooks.
//!
//! Talks to a running Herald service: `sync` materializes a stack's env file
//! (bypassing the cache so deploys always get fresh values) and `health`
//! checks service liveness for wrapper scripts.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "herald-agent")]
#[command(about = "Herald agent — secret sync for deploy hooks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve secrets for a stack and write the resolved env to stdout or a file
    Sync {
        /// Stack name
        #[arg(long)]
        stack: String,

        /// Output path: '-' prints to stdout
        #[arg(long, default_value = "-")]
        out: String,

        /// Herald service URL
        #[arg(long, env = "HERALD_URL", default_value = "http://herald:8765")]
        url: String,

        /// Herald API bearer token
        #[arg(long, env = "HERALD_API_TOKEN", default_value = "")]
        token: String,

        /// Number of retries on transient failure
        #[arg(long, default_value_t = 3)]
        retries: u32,

        /// Path to env file to scan for op:// refs (use - for stdin)
        #[arg(long, default_value = "")]
        env_file: String,

        /// Resolve secrets and report stats without writing output
        #[arg(long)]
        dry_run: bool,
    },

    /// Check Herald service health (exits 0 if healthy, 1 if not)
    Health {
        /// Herald service URL
        #[arg(long, env = "HERALD_URL", default_value = "http://herald:8765")]
        url: String,
    },
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    resolved: u64,
    #[serde(default)]
    cache_hits: u64,
    #[serde(default)]
    failed: u64,
    #[serde(default)]
    duration_ms: i64,
}

/// 4xx responses are permanent: retrying cannot help.
#[derive(Debug)]
enum SyncError {
    Permanent(String),
    Transient(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Permanent(msg) | SyncError::Transient(msg) => f.write_str(msg),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Sync { stack, out, url, token, retries, env_file, dry_run } => {
            run_sync(&stack, &out, &url, &token, retries, &env_file, dry_run).await
        }
        Commands::Health { url } => run_health(&url).await,
    };
    if let Err(e) = result {
        eprintln!("herald-agent: {e}");
        std::process::exit(1);
    }
}

async fn run_sync(
    stack: &str,
    out: &str,
    url: &str,
    token: &str,
    retries: u32,
    env_file: &str,
    dry_run: bool,
) -> Result<()> {
    let env_content = read_env_content(env_file)?;

    let out_path = if out == "-" || dry_run { "" } else { out };
    let payload = json!({
        "stack": stack,
        "out_path": out_path,
        "env_content": env_content,
        "bypass_cache": true,
    });

    let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;

    let mut last_err: Option<SyncError> = None;
    let mut resp: Option<SyncResponse> = None;
    for attempt in 0..=retries {
        if attempt > 0 {
            eprintln!(
                "herald-agent: retry {attempt}/{retries} after error: {}",
                last_err.as_ref().expect("retry implies a previous error")
            );
            // Linear backoff: 2 s × attempt
            tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
        }

        match do_sync(&client, url, token, &payload).await {
            Ok(r) => {
                resp = Some(r);
                last_err = None;
                break;
            }
            Err(e @ SyncError::Permanent(_)) => {
                eprintln!("herald-agent: permanent error (no retry): {e}");
                last_err = Some(e);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }

    let Some(resp) = resp else {
        let e = last_err.expect("no response implies an error");
        bail!("failed after {retries} retries: {e}");
    };

    if dry_run {
        eprintln!(
            "herald-agent: dry run — resolved={} cache_hits={} failed={} duration_ms={}",
            resp.resolved, resp.cache_hits, resp.failed, resp.duration_ms
        );
        if resp.failed > 0 {
            bail!("{} secret(s) failed to resolve", resp.failed);
        }
        return Ok(());
    }

    if out == "-" {
        print!("{}", resp.content);
    } else {
        write_restricted(out, &resp.content)?;
        eprintln!("herald-agent: secrets written to {out}");
    }
    Ok(())
}

async fn do_sync(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    payload: &serde_json::Value,
) -> std::result::Result<SyncResponse, SyncError> {
    let mut req = client.post(format!("{url}/v1/materialize/env")).json(payload);
    if !token.is_empty() {
        req = req.bearer_auth(token);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| SyncError::Transient(format!("connect to herald: {e}")))?;

    let status = resp.status().as_u16();
    if status != 200 {
        let msg = format!("herald returned HTTP {status}");
        if (400..500).contains(&status) {
            return Err(SyncError::Permanent(msg));
        }
        return Err(SyncError::Transient(msg));
    }

    resp.json::<SyncResponse>()
        .await
        .map_err(|e| SyncError::Transient(format!("decode response: {e}")))
}

/// Read env content from a path, stdin (`-`), or return empty.
fn read_env_content(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("read env file {path:?}"))
}

fn write_restricted(path: &str, content: &str) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("open output file {path:?}"))?;
    file.write_all(content.as_bytes()).with_context(|| format!("write output file {path:?}"))
}

async fn run_health(url: &str) -> Result<()> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
    let resp = client
        .get(format!("{url}/v1/health"))
        .send()
        .await
        .map_err(|e| anyhow!("health check failed: {e}"))?;

    let http_status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    let status = body.get("status").and_then(|s| s.as_str()).unwrap_or_default();

    if http_status == 200 && status == "ok" {
        println!("herald: ok");
        return Ok(());
    }
    bail!("unhealthy (status={status} http={http_status})");
}
