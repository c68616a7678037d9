//! Command-line argument parsing for the linker client

use std::fmt;
use std::path::PathBuf;

use clap::Parser;

use linker_protocol::PushMessage;

/// linker - Linker-IM command-line client
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Broker address or remote alias
    ///
    /// Example: ws://127.0.0.1:12360/ws or tcp://10.0.0.2:9000
    #[arg(long, env = "LINKER_ADDR")]
    pub addr: Option<String>,

    /// Namespace to authenticate into
    #[arg(long, short = 'n', env = "LINKER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Credential for the namespace
    #[arg(long, short = 'c', env = "LINKER_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Group to subscribe to (repeatable)
    #[arg(long = "subscribe", short = 's', value_name = "GROUP")]
    pub subscribe: Vec<String>,

    /// Message to push once connected, as GROUP=DATA (repeatable)
    #[arg(long = "push", short = 'p', value_name = "GROUP=DATA", value_parser = parse_push)]
    pub push: Vec<PushMessage>,

    /// Debug logging for the linker crates (ignored when LINKER_LOG is set)
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("addr", &self.addr)
            .field("namespace", &self.namespace)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("config", &self.config)
            .field("subscribe", &self.subscribe)
            .field("push", &self.push)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_push(arg: &str) -> Result<PushMessage, String> {
    match arg.split_once('=') {
        Some((group, data)) if !group.is_empty() => {
            Ok(PushMessage::new(group, data.as_bytes().to_vec()))
        }
        _ => Err(format!("expected GROUP=DATA, got '{}'", arg)),
    }
}
