//! drive_preview CLI - Run the Drive Gateway, manage share tokens and browse folders.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use drive_preview::access::cached_thumbnail_url;
use drive_preview::gateway::{self, GatewayConfig, GatewayState};
use drive_preview::preview_search::{
    find_folder_preview_image, find_stl_preview_image, FolderRef, DEFAULT_MAX_DEPTH,
};
use drive_preview::token::peek;
use drive_preview::url_parser::share_link;
use drive_preview::{
    extract_id, extract_share_token, AccessContext, ClientConfig, ContentCache, ContentClient,
    ListingOptions, Navigator, ResourceType, ServiceAccountAuth, ShareSecret, SortOrder,
    TokenService,
};

/// Browse and share Google Drive folders of STL files and images.
#[derive(Parser)]
#[command(name = "drive_preview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Drive Gateway.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,

        /// Secret used to sign share tokens.
        #[arg(long, env = "SHARE_TOKEN_SECRET", hide_env_values = true)]
        secret: String,

        /// Path to service account JSON credentials file.
        #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
        credentials: PathBuf,

        /// Drive API base URL.
        #[arg(long, default_value = drive_preview::client::DRIVE_API_BASE)]
        drive_api_base: String,

        /// Timeout for each outbound Drive request, in seconds.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Cache lifetime advertised for relayed files, in seconds.
        #[arg(long, default_value_t = 300)]
        cache_max_age: u64,

        /// How far below a shared folder a sub-folder or file may be.
        #[arg(long, default_value_t = 32)]
        max_scope_depth: usize,
    },

    /// Issue a share token for a file or folder.
    Issue {
        /// File or folder URL or ID.
        resource: String,

        /// Kind of resource being shared.
        #[arg(long = "type", short = 't', default_value = "file")]
        resource_type: ResourceType,

        /// Lifetime of the token, in minutes.
        #[arg(long, default_value_t = 60)]
        ttl: u64,

        /// Secret used to sign share tokens.
        #[arg(long, env = "SHARE_TOKEN_SECRET", hide_env_values = true)]
        secret: String,

        /// Application URL; prints a preview link instead of the bare token.
        #[arg(long, env = "DRIVE_PREVIEW_APP_URL")]
        app_url: Option<String>,
    },

    /// Check a share token or preview link.
    Validate {
        /// Token or preview link.
        token: String,

        /// Secret used to sign share tokens.
        #[arg(long, env = "SHARE_TOKEN_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// List a folder's contents.
    Browse {
        /// Folder URL or ID. Defaults to the shared folder of a preview token.
        folder: Option<String>,

        /// Owner bearer token, or `preview:<share token>`.
        #[arg(long, env = "DRIVE_CREDENTIAL", hide_env_values = true)]
        credential: String,

        /// Drive Gateway base URL, required for preview credentials.
        #[arg(long, env = "DRIVE_GATEWAY_URL")]
        gateway_url: Option<String>,

        /// Send owner requests through the Gateway's relay.
        #[arg(long)]
        relay: bool,

        /// Display name of the folder.
        #[arg(long, default_value = "Root")]
        name: String,

        /// Sort order within each group.
        #[arg(long, value_enum, default_value_t = SortOrder::Alphabetical)]
        sort: SortOrder,

        /// Include names starting with a dot.
        #[arg(long)]
        show_hidden: bool,

        /// Look up preview images for sub-folders and STL files, and image thumbnails.
        #[arg(long)]
        previews: bool,
    },
}

fn init_tracing(log_level: tracing::Level) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn token_service(secret: &str) -> Result<TokenService> {
    let secret = ShareSecret::new(secret).context("Share token secret must not be empty")?;
    Ok(TokenService::new(secret))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match cli.command {
        Commands::Serve {
            listen,
            secret,
            credentials,
            drive_api_base,
            timeout_secs,
            cache_max_age,
            max_scope_depth,
        } => {
            let auth = ServiceAccountAuth::from_file(&credentials)
                .with_context(|| format!("Failed to load credentials from {:?}", credentials))?;
            tracing::info!(service_account = auth.client_email(), "loaded service account");

            let mut config = GatewayConfig::new(listen, drive_api_base)
                .context("Invalid gateway configuration")?;
            config.upstream_timeout = Duration::from_secs(timeout_secs);
            config.cache_max_age = Duration::from_secs(cache_max_age);
            config.max_scope_depth = max_scope_depth;
            config.log_level = cli.log_level;

            let state = GatewayState::new(config, token_service(&secret)?, Arc::new(auth))
                .context("Failed to create gateway state")?;

            let (shutdown_tx, shutdown_rx) = watch::channel(());
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for ctrl+c: {}", e);
                    return;
                }
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
            });

            gateway::run(state, shutdown_rx)
                .await
                .context("Gateway server failed")?;
            tracing::info!("Gateway stopped");
        }

        Commands::Issue {
            resource,
            resource_type,
            ttl,
            secret,
            app_url,
        } => {
            let resource_id = extract_id(&resource)
                .with_context(|| format!("Invalid file or folder URL or ID: {}", resource))?;
            let token = token_service(&secret)?
                .issue(&resource_id, resource_type, ttl)
                .context("Failed to issue share token")?;

            match app_url {
                Some(app_url) => println!("{}", share_link(&app_url, &token)),
                None => println!("{}", token),
            }
        }

        Commands::Validate { token, secret } => {
            let token = extract_share_token(&token)
                .with_context(|| format!("Not a share token or preview link: {}", token))?;
            let claims = token_service(&secret)?
                .validate(&token)
                .context("Share token rejected")?;

            println!("Resource: {} ({})", claims.resource_id, claims.resource_type);
            println!("Issued:   {}", claims.iat);
            println!("Expires:  {}", claims.exp);
        }

        Commands::Browse {
            folder,
            credential,
            gateway_url,
            relay,
            name,
            sort,
            show_hidden,
            previews,
        } => {
            let context = AccessContext::from_credential(&credential);
            let folder_id = match (folder, &context) {
                (Some(folder), _) => extract_id(&folder)
                    .with_context(|| format!("Invalid folder URL or ID: {}", folder))?,
                (None, AccessContext::Preview(token)) => {
                    let claims = peek(token).context("Share token payload is unreadable")?;
                    if claims.resource_type != ResourceType::Folder {
                        anyhow::bail!("This share token is for a single file, not a folder");
                    }
                    claims.resource_id
                }
                (None, AccessContext::Owner(_)) => {
                    anyhow::bail!("A folder URL or ID is required with an owner credential")
                }
            };

            let config = ClientConfig {
                gateway_url,
                use_relay: relay,
                ..Default::default()
            };
            let client = ContentClient::new(context, &config).context("Failed to create client")?;
            let cache = Arc::new(ContentCache::new());
            let options = ListingOptions { show_hidden, sort };

            let mut nav = Navigator::with_options(client, cache.clone(), options);
            nav.initialize(&folder_id, &name)
                .await
                .with_context(|| format!("Failed to load folder: {}", folder_id))?;

            println!("{}", nav.breadcrumb_display());
            let contents = nav.contents();
            if contents.is_empty() {
                println!("No folders, images or STL files found.");
                return Ok(());
            }

            let preview_images = if previews {
                let cancel = CancellationToken::new();
                let searches = contents.folders.iter().map(|f| {
                    find_folder_preview_image(
                        nav.client(),
                        &cache,
                        FolderRef {
                            id: &f.id,
                            name: &f.name,
                            parent_id: Some(folder_id.as_str()),
                        },
                        DEFAULT_MAX_DEPTH,
                        &cancel,
                    )
                });
                futures::future::join_all(searches).await
            } else {
                Vec::new()
            };

            println!("{:<44} {:>10} {:<30} {}", "ID", "SIZE", "TYPE", "NAME");
            println!("{}", "-".repeat(100));
            for (idx, entry) in contents.folders.iter().enumerate() {
                match preview_images.get(idx) {
                    Some(Ok(Some(image_id))) => println!("{}\t[preview {}]", entry, image_id),
                    Some(Err(e)) => println!("{}\t[preview failed: {}]", entry, e),
                    _ => println!("{}", entry),
                }
            }
            for entry in &contents.images {
                if !previews {
                    println!("{}", entry);
                    continue;
                }
                match cached_thumbnail_url(nav.client(), &cache, &entry.id).await {
                    Ok(url) => println!("{}\t[thumbnail {}]", entry, url),
                    Err(e) => println!("{}\t[thumbnail failed: {}]", entry, e),
                }
            }
            for entry in &contents.stl_files {
                if !previews {
                    println!("{}", entry);
                    continue;
                }
                match find_stl_preview_image(nav.client(), &folder_id, entry).await {
                    Ok(Some(image)) => println!("{}\t[preview {}]", entry, image.id),
                    Ok(None) => println!("{}", entry),
                    Err(e) => println!("{}\t[preview failed: {}]", entry, e),
                }
            }
        }
    }

    Ok(())
}
