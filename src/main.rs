use std::net::SocketAddr;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hokengate::repositories::IpBlockRepository;
use hokengate::{config::Config, handlers, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("hokengate 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, "設定読み込み完了");

    // サーバーアドレスを先に構築（config が move される前に）
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    // データベース接続プール作成
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "データベース接続に失敗");
            anyhow::anyhow!("Failed to connect to database: {}", e)
        })?;

    tracing::info!("データベース接続完了");

    // CORS レイヤー（ブラウザーポータルから呼ばれるため）
    let cors_layer = build_cors_layer(config.cors_allow_origin.as_deref())?;

    // AppState 構築
    let state = AppState::new(db_pool, config).map_err(|e| {
        tracing::error!(error = ?e, "AppState の構築に失敗");
        anyhow::anyhow!("Failed to create AppState: {}", e)
    })?;

    // 失効済みIPブロックの定期掃除
    spawn_block_sweeper(state.db_pool.clone());

    // Router 構築
    let app = create_router(state).layer(cors_layer);

    // サーバー起動
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // Graceful shutdown 対応
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hokengate=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// CORS レイヤーの構築（オリジン未設定時は全許可 - 開発用）
fn build_cors_layer(allow_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);

    match allow_origin {
        Some(origin) => {
            let value: HeaderValue = origin.parse().map_err(|e| {
                tracing::error!(error = ?e, origin = %origin, "CORSオリジンのパースに失敗");
                anyhow::anyhow!("Failed to parse CORS origin: {}", e)
            })?;
            Ok(layer.allow_origin(value))
        }
        None => Ok(layer.allow_origin(Any)),
    }
}

/// 失効済みIPブロックを1時間ごとに削除するバックグラウンドタスク
///
/// ブロック判定自体は `expires_at` の比較で自然失効するため、
/// この掃除はテーブル肥大化を防ぐだけの保守処理。
fn spawn_block_sweeper(pool: sqlx::PgPool) {
    tokio::spawn(async move {
        let repo = IpBlockRepository::new(pool);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match repo.prune_expired().await {
                Ok(0) => {}
                Ok(pruned) => tracing::info!(pruned, "失効済みIPブロックを削除"),
                Err(e) => tracing::error!(error = ?e, "IPブロック掃除に失敗"),
            }
        }
    });
}

/// Router の構築
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // 二要素認証ファクター
        .route("/api/factor/enroll", post(handlers::enroll_factor))
        .route("/api/factor/verify", post(handlers::verify_factor))
        .route("/api/factor/reset", post(handlers::reset_factor))
        // メールOTP
        .route("/api/email-code/issue", post(handlers::issue_email_code))
        .route("/api/email-code/verify", post(handlers::verify_email_code))
        // パスワード変更（再認証付き）
        .route("/api/password/change", post(handlers::change_password))
        // ブルートフォースガードへのログイン結果報告
        .route("/api/login/report", post(handlers::report_login_outcome))
        .with_state(state)
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
