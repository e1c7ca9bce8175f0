use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use reqwest::Client;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use postroom_backend::{
    config::Config,
    db::{
        postgres_channel_repository::PostgresChannelRepository,
        postgres_post_repository::PostgresPostRepository,
        postgres_user_repository::PostgresUserRepository,
        postgres_workspace_repository::PostgresWorkspaceRepository,
    },
    responses::JsonResponse,
    routes,
    services::{
        channel_service::ChannelService,
        platforms::{LinkedInAdapter, PlatformRegistry},
        post_service::PostService,
        smtp_mailer::SmtpMailer,
        storage::FsContentStorage,
        workspace_service::WorkspaceService,
    },
    utils::{encryption::TokenCipher, jwt::JwtSettings},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit.per_millisecond)
            .burst_size(config.rate_limit.burst)
            .use_headers()
            .error_handler(|_err| too_many_requests())
            .finish()
            .context("invalid global rate limiter settings")?,
    );
    // Stricter limiter for /api/auth/*
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit.auth_per_second)
            .burst_size(config.rate_limit.auth_burst)
            .use_headers()
            .error_handler(|_err| too_many_requests())
            .finish()
            .context("invalid auth rate limiter settings")?,
    );

    // Periodically drop idle client entries from both limiters
    let global_limiter = governor_conf.limiter().clone();
    let auth_limiter = auth_governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            global_limiter.retain_recent();
            auth_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await?;
    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("failed to run database migrations")?;

    let users = Arc::new(PostgresUserRepository {
        pool: pg_pool.clone(),
    });
    let workspace_repo = Arc::new(PostgresWorkspaceRepository {
        pool: pg_pool.clone(),
    });
    let channel_repo = Arc::new(PostgresChannelRepository {
        pool: pg_pool.clone(),
    });
    let post_repo = Arc::new(PostgresPostRepository {
        pool: pg_pool.clone(),
    });

    let mailer = Arc::new(
        SmtpMailer::from_settings(&config.smtp).context("failed to initialize mailer")?,
    );
    let storage = Arc::new(FsContentStorage::new(&config.media));
    let media_signer = Arc::new(storage.signer().clone());

    let http_client = Client::builder()
        .timeout(config.platform_timeout)
        .build()
        .context("failed to build HTTP client")?;
    let platforms = PlatformRegistry::new().register(Arc::new(LinkedInAdapter::new(
        http_client,
        &config.linkedin_api_base,
        storage.clone(),
    )));

    let cipher = TokenCipher::new(&config.token_encryption_key)
        .context("invalid token encryption key")?;
    let jwt = JwtSettings::new(&config.jwt_secret, &config.jwt_issuer, &config.jwt_audience)
        .context("invalid JWT settings")?;

    let workspaces = Arc::new(WorkspaceService::new(
        users.clone(),
        workspace_repo,
        mailer,
        jwt.clone(),
        &config.frontend_origin,
    ));
    let policy = workspaces.policy().clone();
    let channels = Arc::new(ChannelService::new(
        channel_repo.clone(),
        policy.clone(),
        cipher.clone(),
        platforms.clone(),
    ));
    let posts = Arc::new(PostService::new(
        post_repo,
        channel_repo,
        policy,
        storage.clone(),
        platforms,
        cipher,
    ));

    let frontend_origin = config
        .frontend_origin
        .parse::<HeaderValue>()
        .context("FRONTEND_ORIGIN is not a valid header value")?;
    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_credentials(true);

    let bind_addr = config.bind_addr;
    let state = AppState {
        config: Arc::new(config),
        users,
        workspaces,
        channels,
        posts,
        storage,
        media_signer,
        jwt: Arc::new(jwt),
    };

    let app = Router::new()
        .route("/", get(root))
        .nest(
            "/api/auth",
            routes::auth_routes().layer(GovernorLayer {
                config: auth_governor_conf,
            }),
        )
        .nest("/api", routes::api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!(%bind_addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}

/// `RUST_LOG` drives the filter; `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn too_many_requests() -> Response {
    JsonResponse::too_many_requests("Too many requests. Please wait a moment and try again.")
        .into_response()
}

async fn root() -> Response {
    JsonResponse::success("Hello, Postroom!").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("successfully connected to the database");
    Ok(pool)
}
