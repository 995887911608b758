use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for a ledger node")]
struct Cli {
    #[command(flatten)]
    target: Target,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the node's pool
    Submit {
        /// Payload; parsed as JSON when possible, otherwise sent as a string
        data: String,
        /// Unix milliseconds, RFC 3339 or RFC 2822; defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Start or stop mining
    Mine {
        #[arg(value_enum)]
        toggle: Toggle,
    },
    /// Show the current height and tip hash
    Head,
    /// Fetch one block; -1 is the latest
    Block {
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        number: i64,
    },
    /// Fetch every block in order
    Blocks,
    /// List transactions waiting to be mined
    Pending,
    /// Discard every transaction waiting to be mined
    Clear,
    /// Ask the node to re-verify the whole chain
    Verify,
}

#[derive(Serialize)]
struct Tx {
    timestamp: Value,
    data: Value,
}

fn payload(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn timestamp(raw: Option<String>) -> Value {
    match raw {
        Some(ts) => match ts.parse::<i64>() {
            Ok(ms) => Value::from(ms),
            Err(_) => Value::String(ts),
        },
        None => Value::from(chrono::Utc::now().timestamp_millis()),
    }
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    debug!(%status, "node responded");
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    if !status.is_success() {
        bail!("node returned {status}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.target.node.trim_end_matches('/');
    let client = reqwest::Client::new();
    let res = match cli.cmd {
        Command::Submit { data, timestamp: ts } => {
            let tx = Tx {
                timestamp: timestamp(ts),
                data: payload(data),
            };
            client.post(format!("{node}/tx")).json(&tx).send().await?
        }
        Command::Mine { toggle } => {
            let enable = matches!(toggle, Toggle::On);
            client
                .post(format!("{node}/mining"))
                .json(&serde_json::json!({ "enable": enable }))
                .send()
                .await?
        }
        Command::Head => client.get(format!("{node}/chain/head")).send().await?,
        Command::Block { number } => client.get(format!("{node}/blocks/{number}")).send().await?,
        Command::Blocks => client.get(format!("{node}/blocks")).send().await?,
        Command::Pending => client.get(format!("{node}/mempool")).send().await?,
        Command::Clear => client.delete(format!("{node}/mempool")).send().await?,
        Command::Verify => client.get(format!("{node}/chain/verify")).send().await?,
    };
    print_response(res).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_prefers_json() {
        assert_eq!(payload(r#"{"a":1}"#.into())["a"], 1);
        assert_eq!(payload("hello".into()), Value::String("hello".into()));
    }

    #[test]
    fn timestamp_forms() {
        assert_eq!(timestamp(Some("1700000000000".into())), Value::from(1_700_000_000_000i64));
        assert!(timestamp(Some("2024-01-01T00:00:00Z".into())).is_string());
        assert!(timestamp(None).is_i64());
    }

    #[test]
    fn parses_latest_block() {
        let cli = Cli::try_parse_from(["ledger-cli", "block", "-1"]).unwrap();
        assert!(matches!(cli.cmd, Command::Block { number: -1 }));
        let cli = Cli::try_parse_from(["ledger-cli", "--node", "http://x:1", "mine", "off"]).unwrap();
        assert_eq!(cli.target.node, "http://x:1");
        assert!(matches!(cli.cmd, Command::Mine { toggle: Toggle::Off }));
    }
}
