use anyhow::Result;
use clap::{Parser, Subcommand};
use fhir_rest_client::{
    BearerTokenInterceptor, ClientError, ClientFactory, ClientInterceptor, FactoryConfig,
    OutputEnvelope, ProtocolVersion, ValidationMode, VersionTag,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Parser)]
#[command(name = "fhir-client")]
#[command(about = "Check and query FHIR-style REST servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Server base URL
    #[arg(value_name = "URL")]
    url: String,

    /// Protocol version spoken by this client (dstu1, dstu2, dstu2_hl7org)
    #[arg(long, global = true, default_value = "dstu2")]
    fhir_version: String,

    /// Server validation mode (never, once, always)
    #[arg(long, global = true)]
    validation: Option<String>,

    /// Connect timeout in milliseconds (0 = no limit)
    #[arg(long, global = true)]
    connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds (0 = no limit)
    #[arg(long, global = true)]
    read_timeout_ms: Option<u64>,

    /// Overall request timeout in milliseconds (0 = no limit)
    #[arg(long, global = true)]
    request_timeout_ms: Option<u64>,

    /// Bearer token sent with every request
    #[arg(long, global = true)]
    token: Option<String>,

    /// TOML file with a [client] section
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server speaks a compatible protocol version
    Validate,

    /// Print the server's capability statement
    Metadata,

    /// Read one resource
    Read {
        /// Resource type (e.g., "Patient")
        #[arg(value_name = "TYPE")]
        resource_type: String,

        /// Logical id
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays a single JSON document.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    debug!("fhir-client v{} - target {}", fhir_rest_client::VERSION, cli.url);

    let envelope = match run(&cli).await {
        Ok(envelope) => envelope,
        Err(err) => {
            println!("{}", OutputEnvelope::from_error(&err).to_json()?);
            std::process::exit(1);
        }
    };

    println!("{}", envelope.to_json()?);
    Ok(())
}

async fn run(cli: &Cli) -> Result<OutputEnvelope, ClientError> {
    let factory = build_factory(cli)?;
    let interceptors = interceptors(cli);
    let start = Instant::now();

    match &cli.command {
        Commands::Validate => {
            let tag = factory
                .validate_server_base(&cli.url, &interceptors)
                .await?;
            let server_version = match tag {
                VersionTag::Known(version) => version.as_str(),
                VersionTag::Unknown => "unknown",
            };
            Ok(OutputEnvelope::success(
                "validation_result",
                &ClientFactory::normalize_endpoint(&cli.url),
                json!({
                    "status": "validated",
                    "client_version": factory.protocol_version().as_str(),
                    "server_version": server_version,
                }),
                Some(elapsed_ms(start)),
            ))
        }
        Commands::Metadata => {
            let mut client = factory.new_generic_client(&cli.url)?;
            for interceptor in interceptors {
                client.register_interceptor(interceptor);
            }
            let statement = client.fetch_capabilities().await?;
            Ok(OutputEnvelope::success(
                "capabilities",
                client.endpoint(),
                statement,
                Some(elapsed_ms(start)),
            ))
        }
        Commands::Read { resource_type, id } => {
            let mut client = factory.new_generic_client(&cli.url)?;
            for interceptor in interceptors {
                client.register_interceptor(interceptor);
            }
            let resource = client.read(resource_type, id).await?;
            Ok(OutputEnvelope::success(
                "read_result",
                client.endpoint(),
                resource,
                Some(elapsed_ms(start)),
            ))
        }
    }
}

/// Config file first, then command-line flags on top
fn build_factory(cli: &Cli) -> Result<ClientFactory, ClientError> {
    let version: ProtocolVersion = cli.fhir_version.parse()?;
    let mut builder = ClientFactory::builder(version);

    if let Some(path) = &cli.config {
        builder = builder.config(&FactoryConfig::load_from_file(path)?)?;
    }

    let factory = builder.build();
    if let Some(mode) = &cli.validation {
        factory.set_validation_mode(mode.parse::<ValidationMode>()?);
    }
    if let Some(ms) = cli.connect_timeout_ms {
        factory.set_connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.read_timeout_ms {
        factory.set_read_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.request_timeout_ms {
        factory.set_request_timeout(Duration::from_millis(ms));
    }

    Ok(factory)
}

fn interceptors(cli: &Cli) -> Vec<Arc<dyn ClientInterceptor>> {
    cli.token
        .iter()
        .map(|token| Arc::new(BearerTokenInterceptor::new(token.clone())) as Arc<dyn ClientInterceptor>)
        .collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
