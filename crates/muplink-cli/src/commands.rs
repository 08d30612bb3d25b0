//! Command implementations.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use muplink_client::{Driver, Outcome, RequestSpec, RetryPolicy, SystemEnv};
use muplink_proto::coap::{Method, content_format};
use muplink_yang::{Codec, ContentMode, Schema, cache, jsonschema};
use tracing::{debug, info};

use crate::{Cli, Command, Format};

type CmdResult = Result<(), Box<dyn Error>>;

/// Dispatch one parsed invocation.
pub fn run(cli: Cli) -> CmdResult {
    match &cli.command {
        Command::Get { path, output } => {
            let schema = load_schema(&cli)?;
            let outcome = request(&cli, RequestSpec {
                method: Method::Get,
                uri: path.clone(),
                payload: None,
                content_format: None,
                accept: Some(content_format::YANG_DATA_CBOR),
            })?;
            let payload = expect_success(&outcome)?;
            emit(&Codec::new(&schema, ContentMode::Get), &payload, *output)
        },

        Command::Fetch { iids, path, output } => {
            let schema = load_schema(&cli)?;
            let req = serde_json::Value::Array(
                iids.iter().cloned().map(serde_json::Value::String).collect(),
            );
            let payload = Codec::new(&schema, ContentMode::Fetch).strict().encode_payload(&req)?;
            let outcome = request(&cli, RequestSpec {
                method: Method::Fetch,
                uri: path.clone(),
                payload: Some(payload),
                content_format: Some(content_format::YANG_IDENTIFIERS_CBOR),
                accept: Some(content_format::YANG_INSTANCES_CBOR),
            })?;
            let payload = expect_success(&outcome)?;
            emit(&Codec::new(&schema, ContentMode::Fetch), &payload, *output)
        },

        Command::Put { file, path } => {
            let schema = load_schema(&cli)?;
            let codec = Codec::new(&schema, ContentMode::Put).strict();
            let payload = codec.encode_payload(&read_data(file, None, &codec)?)?;
            let outcome = request(&cli, RequestSpec {
                method: Method::Put,
                uri: path.clone(),
                payload: Some(payload),
                content_format: Some(content_format::YANG_DATA_CBOR),
                accept: None,
            })?;
            report(&outcome)
        },

        Command::Ipatch { file, path } => {
            let schema = load_schema(&cli)?;
            let codec = Codec::new(&schema, ContentMode::Ipatch).strict();
            let payload = codec.encode_payload(&read_data(file, None, &codec)?)?;
            let outcome = request(&cli, RequestSpec {
                method: Method::Ipatch,
                uri: path.clone(),
                payload: Some(payload),
                content_format: Some(content_format::YANG_INSTANCES_CBOR),
                accept: None,
            })?;
            report(&outcome)
        },

        Command::Post { file, path } => {
            let schema = load_schema(&cli)?;
            let codec = Codec::new(&schema, ContentMode::Post).strict();
            let payload = codec.encode_payload(&read_data(file, None, &codec)?)?;
            let outcome = request(&cli, RequestSpec {
                method: Method::Post,
                uri: path.clone(),
                payload: Some(payload),
                content_format: Some(content_format::YANG_INSTANCES_CBOR),
                accept: Some(content_format::YANG_INSTANCES_CBOR),
            })?;
            report(&outcome)
        },

        Command::Delete { path } => {
            let outcome = request(&cli, RequestSpec::new(Method::Delete, path.clone()))?;
            report(&outcome)
        },

        Command::Conv { file, input, output, content, strict } => {
            let schema = load_schema(&cli)?;
            let mode: ContentMode = content.parse()?;
            let codec = Codec::new(&schema, mode);
            let codec = if *strict { codec.strict() } else { codec };
            let value = read_data(file, *input, &codec)?;
            emit_value(&codec, &value, *output)
        },

        Command::Schema { content } => {
            let schema = load_schema(&cli)?;
            let mode: ContentMode = content.parse()?;
            let doc = jsonschema::Generator::new(&schema, mode).document();
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        },

        Command::Ping => {
            let mut driver = open_driver(&cli)?;
            let pong = driver.ping(Duration::from_secs(3))?;
            if let Some(announce) = driver.handler().announcement() {
                info!(announce = %String::from_utf8_lossy(announce), "device announcement");
            }
            println!("pong ({} bytes)", pong.len());
            Ok(())
        },

        Command::Console => {
            let mut driver = open_driver(&cli)?;
            driver.handler().set_console(Box::new(std::io::stdout()));
            driver.run_console()?;
            Ok(())
        },
    }
}

/// Load the resolved schema, through the on-disk cache when it is fresh.
fn load_schema(cli: &Cli) -> Result<Schema, Box<dyn Error>> {
    let inputs = schema_inputs(cli)?;
    if inputs.is_empty() {
        return Err("no YANG inputs; pass --yang <file> or --yang-dir <dir>".into());
    }
    let key = cache::cache_key(&inputs)?;
    let cache_path = cache_path(cli);
    if let Some(schema) = cache::load(&cache_path, &key) {
        debug!(path = %cache_path.display(), "schema cache hit");
        return Ok(schema);
    }
    let schema = Schema::from_files(&inputs)?;
    cache::store(&cache_path, &key, &schema);
    Ok(schema)
}

/// The schema input set: explicit `--yang` files plus every `*.json` in
/// `--yang-dir`, sorted so the cache key is stable.
fn schema_inputs(cli: &Cli) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut inputs = cli.yang.clone();
    if let Some(dir) = &cli.yang_dir {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                inputs.push(path);
            }
        }
    }
    inputs.sort();
    inputs.dedup();
    Ok(inputs)
}

fn cache_path(cli: &Cli) -> PathBuf {
    let dir = cli.cache_dir.clone().unwrap_or_else(|| {
        std::env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("muplink")
    });
    dir.join("schema.cache")
}

fn open_driver(cli: &Cli) -> Result<Driver<SystemEnv>, Box<dyn Error>> {
    let uri = cli.device.as_deref().ok_or("no device; pass --device <uri>")?;
    let carrier = muplink_client::open(uri)?;
    Ok(Driver::new(SystemEnv, carrier, RetryPolicy::default()))
}

fn request(cli: &Cli, spec: RequestSpec) -> Result<Outcome, Box<dyn Error>> {
    let mut driver = open_driver(cli)?;
    debug!(method = ?spec.method, uri = %spec.uri, "issuing request");
    Ok(driver.request(spec)?)
}

/// A successful response's payload, or a descriptive error.
fn expect_success(outcome: &Outcome) -> Result<Vec<u8>, Box<dyn Error>> {
    match outcome.code {
        Some(code) if code.is_success() => Ok(outcome.payload.clone()),
        Some(code) => Err(format!(
            "device returned {code}{}",
            if outcome.payload.is_empty() {
                String::new()
            } else {
                format!(": {}", String::from_utf8_lossy(&outcome.payload))
            }
        )
        .into()),
        None => Err("no response from device (retries exhausted)".into()),
    }
}

fn report(outcome: &Outcome) -> CmdResult {
    let payload = expect_success(outcome)?;
    if let Some(code) = outcome.code {
        println!("{code}");
    }
    if !payload.is_empty() {
        println!("{}", String::from_utf8_lossy(&payload));
    }
    Ok(())
}

/// Read a data file into its JSON form, decoding wire CBOR through the
/// codec when needed.
fn read_data(
    path: &Path,
    format: Option<Format>,
    codec: &Codec<'_>,
) -> Result<serde_json::Value, Box<dyn Error>> {
    let format = format.unwrap_or_else(|| detect_format(path));
    match format {
        Format::Yaml => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&text)?)
        },
        Format::Json => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        },
        Format::Cbor => {
            let bytes = std::fs::read(path)?;
            Ok(codec.decode_payload(&bytes)?)
        },
    }
}

fn detect_format(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Format::Yaml,
        Some("json") => Format::Json,
        Some("cbor" | "bin") => Format::Cbor,
        _ => Format::Json,
    }
}

/// Decode a wire payload and print it in the requested format.
fn emit(codec: &Codec<'_>, payload: &[u8], output: Format) -> CmdResult {
    let value = codec.decode_payload(payload)?;
    emit_value(codec, &value, output)
}

/// Print a JSON-form value as YAML/JSON text or wire CBOR.
fn emit_value(codec: &Codec<'_>, value: &serde_json::Value, output: Format) -> CmdResult {
    match output {
        Format::Yaml => print!("{}", serde_yaml::to_string(value)?),
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Cbor => {
            use std::io::Write as _;
            let bytes = codec.encode_payload(value)?;
            std::io::stdout().write_all(&bytes)?;
        },
    }
    Ok(())
}
