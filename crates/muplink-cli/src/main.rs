//! `muplink` entry point.

mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configure MUP1/CoAP devices over serial or TCP.
#[derive(Parser, Debug)]
#[command(name = "muplink")]
#[command(about = "Talk CoAP-over-MUP1 to an embedded device, with YANG/CBOR payloads")]
#[command(version)]
struct Cli {
    /// Carrier URI: termhub://host:port, telnet://host:port, or a serial
    /// device path
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Normalized YANG schema input (JSON produced by the module parser);
    /// repeatable
    #[arg(long = "yang", global = true)]
    yang: Vec<PathBuf>,

    /// Directory of normalized YANG schema inputs (every *.json inside is
    /// loaded, in addition to any --yang files)
    #[arg(long, global = true)]
    yang_dir: Option<PathBuf>,

    /// Directory holding the resolved-schema cache (default:
    /// $XDG_CACHE_HOME/muplink, falling back to ~/.cache/muplink)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// File formats for data in and out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// YAML text.
    Yaml,
    /// JSON text.
    Json,
    /// Raw CBOR as sent on the wire.
    Cbor,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// GET a resource and print the decoded data
    Get {
        /// CoAP path on the device
        #[arg(default_value = "/c")]
        path: String,
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        output: Format,
    },

    /// FETCH specific data nodes by instance-identifier
    Fetch {
        /// Instance-identifiers, e.g. /ietf-system:system/hostname
        iids: Vec<String>,
        /// CoAP path on the device
        #[arg(short, long, default_value = "/c")]
        path: String,
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        output: Format,
    },

    /// PUT a configuration datastore
    Put {
        /// Data file (YAML/JSON/CBOR by extension)
        file: PathBuf,
        /// CoAP path on the device
        #[arg(short, long, default_value = "/c")]
        path: String,
    },

    /// Apply an iPATCH of {instance-identifier: value} items
    Ipatch {
        /// Data file (YAML/JSON/CBOR by extension)
        file: PathBuf,
        /// CoAP path on the device
        #[arg(short, long, default_value = "/c")]
        path: String,
    },

    /// POST rpc/action invocations
    Post {
        /// Data file (YAML/JSON/CBOR by extension)
        file: PathBuf,
        /// CoAP path on the device
        #[arg(short, long, default_value = "/c")]
        path: String,
    },

    /// DELETE a resource
    Delete {
        /// CoAP path on the device
        path: String,
    },

    /// Convert between YAML/JSON and wire CBOR without a device
    Conv {
        /// Input file
        file: PathBuf,
        /// Input format (default: by file extension)
        #[arg(long, value_enum)]
        input: Option<Format>,
        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        output: Format,
        /// Payload layout
        #[arg(long, default_value = "yang")]
        content: String,
        /// Fail on the first codec error instead of skipping items
        #[arg(long)]
        strict: bool,
    },

    /// Emit a draft-07 JSON Schema for the loaded YANG inputs
    Schema {
        /// Payload layout the schema should describe
        #[arg(long, default_value = "yang")]
        content: String,
    },

    /// MUP1 ping round-trip
    Ping,

    /// Attach to the device console (frames are filtered out)
    Console,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    commands::run(cli)
}
