//! linker - Linker-IM command-line client
//!
//! Connects to a broker, subscribes and pushes as asked on the command
//! line, then prints incoming messages until interrupted.

use linker_client::{Client, ClientConfig, Endpoint, ReplyCallback, SessionHandler};
use linker_protocol::{Message, ProtocolUnit, UnitBody};
use linker_utils::logging::LOG_ENV;
use linker_utils::{init_logging_with_config, LinkerError, LogConfig, Result};

mod cli;

use cli::Args;

/// Prints messages to stdout; only authentication failures are fatal
struct PrintHandler;

impl SessionHandler for PrintHandler {
    fn on_connected(&mut self) {
        eprintln!("Connected.");
    }

    fn on_closed(&mut self) {
        eprintln!("Connection closed.");
    }

    fn on_message(&mut self, msg: &Message) {
        println!(
            "[{}#{}] {}: {}",
            msg.timestamp,
            msg.sequence,
            msg.group,
            String::from_utf8_lossy(&msg.message)
        );
    }

    fn on_error(&mut self, err: LinkerError) -> Result<()> {
        if matches!(err, LinkerError::Auth(_)) {
            return Err(err);
        }
        eprintln!("Error: {}", err);
        Ok(())
    }
}

fn log_reply(what: String) -> ReplyCallback {
    Box::new(move |unit: &ProtocolUnit| match &unit.body {
        UnitBody::Error(reply) if !reply.is_success() => {
            tracing::warn!(request = %what, error = %reply.message, "Request rejected");
        }
        _ => tracing::info!(request = %what, reply = %unit.unit_type(), "Request acknowledged"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    let log_config = if args.verbose && std::env::var(LOG_ENV).is_err() {
        LogConfig::verbose()
    } else {
        LogConfig::client()
    };
    init_logging_with_config(log_config)?;
    tracing::info!("linker client starting");
    tracing::debug!("CLI args: {:?}", args);

    match run(args).await {
        Ok(()) => {
            tracing::info!("linker client exiting normally");
            Ok(())
        }
        Err(e) => {
            tracing::error!("linker client error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => ClientConfig::load()?,
    };
    config.validate()?;

    let addr = config.resolve_addr(args.addr.as_deref().unwrap_or(&config.addr));
    let namespace = args
        .namespace
        .or_else(|| config.namespace.clone())
        .ok_or_else(|| LinkerError::config("a namespace is required (--namespace)"))?;
    let credential = args
        .credential
        .or_else(|| config.credential.clone())
        .unwrap_or_default();

    let endpoint = Endpoint::parse(&addr)?;
    tracing::info!(endpoint = %endpoint, namespace = %namespace, "Connecting");

    let mut client = Client::with_options(endpoint, config.transport_options(), PrintHandler);
    client.connect(namespace, credential)?;
    client.wait_connected().await?;

    for group in &args.subscribe {
        client.subscribe(group, Some(log_reply(format!("subscribe {}", group))))?;
    }
    if !args.push.is_empty() {
        let count = args.push.len();
        client.push(args.push, Some(log_reply(format!("push {} message(s)", count))))?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            alive = client.poll_event() => {
                if !alive? {
                    return Ok(());
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, closing");
                break;
            }
        }
    }

    client.close()?;
    client.run().await
}
