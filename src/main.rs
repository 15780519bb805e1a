use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use cors_relay::{
    adapters::{
        AxumServer, FileSystemAdapter, HttpClientAdapter, HttpHandler, SystemInterfaces, router,
    },
    config::{ServerConfig, ServerConfigValidator, load_config},
    core::{ClientIpCache, ForwardMode, GatewayService, UpstreamRegistry},
    ports::{http_client::HttpClient, http_server::HttpServer},
    tracing_setup,
    utils::{GracefulShutdown, ShutdownReason},
};

/// Config file picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "cors-relay.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML, YAML, JSON or INI)
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Listen port, overriding configuration and PORT
    #[clap(short, long, global = true)]
    port: Option<u16>,
}

#[derive(Parser, Debug, Clone, Copy)]
enum Commands {
    /// Start the relay (default)
    Serve,
    /// Validate configuration file
    Validate,
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let explicit_path = args.config.as_deref();
    let config_path = explicit_path.unwrap_or(DEFAULT_CONFIG_PATH);

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => return validate_config_command(config_path, args.port),
        Commands::Init => return init_config_command(config_path).await,
        Commands::Serve => {}
    }

    // A named file must exist; the default one is optional.
    let mut config = load_config(Some(config_path), explicit_path.is_some())
        .wrap_err("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    ServerConfigValidator::validate(&config).wrap_err("Invalid configuration")?;

    tracing_setup::init_tracing(&config.logging)?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    run_server(config).await
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .wrap_err_with(|| format!("Invalid listen address {}", config.listen_addr()))?;
    let refresh_interval = config
        .ip_cache
        .refresh_interval()
        .wrap_err("Invalid ip_cache.refresh_interval")?;
    let timeout = config.proxy.timeout().wrap_err("Invalid proxy.timeout")?;

    let registry = Arc::new(
        UpstreamRegistry::with_overrides(&config.upstreams)
            .wrap_err("Failed to build upstream registry")?,
    );
    let ip_cache = Arc::new(ClientIpCache::new(Arc::new(SystemInterfaces)));
    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::with_timeout(timeout).wrap_err("Failed to create HTTP client")?,
    );

    let gateway_service = Arc::new(GatewayService::new(
        registry.clone(),
        ip_cache.clone(),
        http_client,
        config.proxy.unknown_upstream,
        timeout,
    ));
    let http_handler = Arc::new(HttpHandler::new(
        gateway_service,
        Arc::new(FileSystemAdapter::new()),
        config.static_files.clone(),
    ));
    let app = router(http_handler, Arc::new(config.cors.clone()));

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let sweeper = ip_cache.spawn_sweeper(refresh_interval, graceful_shutdown.shutdown_token());

    if !FileSystemAdapter::bundle_present(&config.static_files.root) {
        tracing::warn!(
            "Front-end bundle '{}' not found; non-proxy paths will answer 404",
            config.static_files.root
        );
    }
    log_endpoints(&config, &registry);

    let server = AxumServer::new(addr, app, graceful_shutdown.shutdown_token());
    let server_result = server.run().await;

    // Stops the sweeper when the server exits on its own.
    graceful_shutdown.trigger_shutdown(ShutdownReason::Requested);
    if let Err(e) = sweeper.await {
        tracing::warn!("Client IP sweeper ended abnormally: {}", e);
    }

    server_result?;
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

fn log_endpoints(config: &ServerConfig, registry: &UpstreamRegistry) {
    let base = format!("http://localhost:{}", config.port);

    tracing::info!("cors-relay listening on port {}", config.port);
    for target in registry.iter() {
        match target.mode {
            ForwardMode::Streaming => tracing::info!(
                "  {}{} -> {}",
                base,
                target.path_prefix,
                target
                    .base_url
                    .as_ref()
                    .map(|u| u.as_str())
                    .unwrap_or_default()
            ),
            ForwardMode::SingleShot => {
                tracing::info!("  {}{}?url=<target>", base, target.path_prefix)
            }
            ForwardMode::Direct => {}
        }
    }
    tracing::info!("  {}/health", base);
    tracing::info!("  {}/status", base);
    tracing::info!("Serving front-end from {}", config.static_files.root);
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str, port: Option<u16>) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let mut config = match load_config(Some(config_path), true) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };
    if let Some(port) = port {
        config.port = port;
    }

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr());
            println!("   • Front-end Root: {}", config.static_files.root);
            println!(
                "   • IP Cache Refresh: {}",
                config.ip_cache.refresh_interval
            );
            println!(
                "   • Upstream Timeout: {}",
                config.proxy.timeout.as_deref().unwrap_or("none")
            );
            println!(
                "   • Allowed Origins: {}",
                config.cors.allowed_origins.join(", ")
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure upstream URLs start with http:// or https://");
            println!("   • Use an IP literal for host (e.g. '0.0.0.0' or '127.0.0.1')");
            println!("   • Durations use humantime units (e.g. '30s', '5m')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# cors-relay configuration

# Address and port to listen on (PORT and --port override the port)
host = "0.0.0.0"
port = 3001

# Pre-built front-end bundle; unknown paths fall back to the index document
[static_files]
root = "dist/game-iframe-app"
index_file = "index.html"

# The shared client IP sent upstream is recomputed after this interval
[ip_cache]
refresh_interval = "5m"

# Base URL overrides (also CORS_ANYWHERE_URL / ALLORIGINS_URL / CORSPROXY_URL)
[upstreams]
# cors_anywhere = "https://cors-anywhere.herokuapp.com/"
# allorigins = "https://api.allorigins.win/"
# corsproxy = "https://corsproxy.io/"

[proxy]
# timeout = "30s"
# "spa" serves the front-end for unknown /proxy/<id> paths, "not_found" answers 404
unknown_upstream = "spa"

# Origins allowed to call the relay itself (also CORS_ORIGIN, comma-separated)
[cors]
allowed_origins = ["http://localhost:4200", "http://localhost:3000"]
allow_credentials = true

[logging]
level = "info"
json = false
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'cors-relay serve --config {config_path}' to start the relay");
    Ok(())
}
