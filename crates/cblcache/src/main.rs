use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cblcache::{Cache, CacheConfig, RedisStore, Ttl};

/// cblcache - Inspect and drive a namespaced Redis cache
#[derive(Parser, Debug)]
#[command(name = "cblcache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Application name used as the key prefix
    #[arg(long, short, global = true, env = "CACHE_APP_NAME")]
    app: Option<String>,

    /// Full Redis URL (overrides REDIS_ADDR, REDIS_PASSWORD and REDIS_DB)
    #[arg(long, global = true, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a string value
    Get { key: String },

    /// Store a string value
    Set {
        key: String,
        value: String,
        /// Expiry in milliseconds (0 means none)
        #[arg(long, default_value_t = 0)]
        ttl_ms: u64,
    },

    /// Delete a key
    Del { key: String },

    /// Print the remaining time to live of a key
    Ttl { key: String },

    /// Take a lock once and print the ticket on success
    Lock {
        name: String,
        /// Ticket to lock with (random when omitted)
        #[arg(long)]
        ticket: Option<String>,
        /// Lock expiry in milliseconds
        #[arg(long, default_value_t = 30_000)]
        expire_ms: u64,
    },

    /// Release a lock held by a ticket
    Unlock { name: String, ticket: String },

    /// Push a payload onto a queue
    Push { queue: String, payload: String },

    /// Pop the head of a queue
    Pop {
        queue: String,
        /// Wait up to this many seconds for a payload
        #[arg(long)]
        block_secs: Option<u64>,
    },

    /// Print the length of a queue
    Len { queue: String },

    /// Drop a queue
    Purge { queue: String },

    /// Increment a counter
    Incr {
        counter: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
        /// Expiry refreshed on every increment, in milliseconds
        #[arg(long, default_value_t = 0)]
        expire_ms: u64,
    },

    /// Decrement a counter
    Decr {
        counter: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
        /// Refuse to go below zero (decrements by one)
        #[arg(long, conflicts_with = "by")]
        min_zero: bool,
    },

    /// Add members to a set
    Sadd {
        set: String,
        #[arg(required = true)]
        members: Vec<String>,
    },

    /// Print the members of a set
    Smembers { set: String },
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn format_ttl(ttl: Ttl) -> String {
    match ttl {
        Ttl::Expires(d) => format!("{}ms", d.as_millis()),
        Ttl::Persistent => "no expiry".to_string(),
        Ttl::Missing => "missing".to_string(),
    }
}

async fn run(cache: &Cache<RedisStore>, command: Command) -> Result<()> {
    match command {
        Command::Get { key } => {
            println!("{}", cache.get_string(&key).await?);
        }
        Command::Set { key, value, ttl_ms } => {
            cache.set_string(&key, &value, millis(ttl_ms)).await?;
        }
        Command::Del { key } => {
            println!("{}", cache.delete(&key).await?);
        }
        Command::Ttl { key } => {
            let ttl = cache.pttl(&key).await.into_result()?;
            println!("{}", format_ttl(ttl));
        }
        Command::Lock {
            name,
            ticket,
            expire_ms,
        } => {
            let ticket = ticket.unwrap_or_else(cblcache::new_ticket);
            let acquired = cache
                .locks()
                .lock(&name, &ticket, Duration::from_millis(expire_ms))
                .await?;
            if !acquired {
                anyhow::bail!("lock {name} is held");
            }
            println!("{ticket}");
        }
        Command::Unlock { name, ticket } => {
            cache.locks().unlock(&name, &ticket).await?;
        }
        Command::Push { queue, payload } => {
            cache.queues().push(&queue, payload.as_bytes()).await?;
        }
        Command::Pop { queue, block_secs } => {
            let payload = match block_secs {
                Some(secs) => {
                    cache
                        .queues()
                        .blocking_pop(&queue, Duration::from_secs(secs))
                        .await?
                }
                None => cache.queues().pop(&queue).await?,
            };
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Command::Len { queue } => {
            println!("{}", cache.queues().length(&queue).await.into_result()?);
        }
        Command::Purge { queue } => {
            println!("{}", cache.queues().purge(&queue).await.into_result()?);
        }
        Command::Incr {
            counter,
            by,
            expire_ms,
        } => {
            let value = cache
                .counters()
                .incr_by(&counter, by, millis(expire_ms))
                .await?;
            println!("{value}");
        }
        Command::Decr {
            counter,
            by,
            min_zero,
        } => {
            let value = if min_zero {
                cache.counters().decr_min_zero(&counter).await?
            } else {
                cache.counters().decr_by(&counter, by).await?
            };
            println!("{value}");
        }
        Command::Sadd { set, members } => {
            println!("{}", cache.sets().add(&set, &members).await?);
        }
        Command::Smembers { set } => {
            for member in cache.sets().members(&set).await? {
                println!("{member}");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cblcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = CacheConfig::from_env();
    if let Some(app) = cli.app {
        config.app_name = app;
    }
    if let Some(url) = cli.redis_url {
        config.redis_url = Some(url);
    }

    let cache = Cache::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}", config.redis_addr))?;

    let result = run(&cache, cli.command).await;
    cache.close().await?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cblcache",
            "incr",
            "visits",
            "--by",
            "5",
            "--app",
            "shop",
        ])
        .unwrap();

        assert_eq!(cli.app.as_deref(), Some("shop"));
        assert!(matches!(
            cli.command,
            Command::Incr { by: 5, expire_ms: 0, .. }
        ));
    }

    #[test]
    fn test_decr_min_zero_conflicts_with_by() {
        let result = Cli::try_parse_from(["cblcache", "decr", "c", "--by", "2", "--min-zero"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_millis_is_no_expiry() {
        assert_eq!(millis(0), None);
        assert_eq!(millis(250), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_format_ttl() {
        assert_eq!(format_ttl(Ttl::Persistent), "no expiry");
        assert_eq!(format_ttl(Ttl::Missing), "missing");
        assert_eq!(format_ttl(Ttl::Expires(Duration::from_millis(1500))), "1500ms");
    }
}
