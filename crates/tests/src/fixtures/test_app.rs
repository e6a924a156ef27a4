use mongodb::{Client, Database, options::ClientOptions};
use stagecast_api::{build_router, state::AppState};
use stagecast_config::Settings;
use stagecast_db::indexes::ensure_indexes;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A running test server with its own MongoDB database and a temporary
/// HLS storage directory.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub db: Database,
    pub settings: Settings,
    pub client: reqwest::Client,
    _hls_dir: tempfile::TempDir,
}

impl TestApp {
    /// Spawn a new test server connected to the test MongoDB.
    ///
    /// Requires a running MongoDB at localhost:27017 and the mediasoup
    /// worker binary built by the `mediasoup` crate. Set
    /// STAGECAST__DATABASE__URL to override the connection string. Each
    /// test gets a unique database name for isolation.
    pub async fn spawn() -> Self {
        let db_name = format!("stagecast_test_{}", uuid::Uuid::new_v4().simple());

        let mut settings = test_settings();
        if let Ok(url) = std::env::var("STAGECAST__DATABASE__URL") {
            settings.database.url = url;
        }
        settings.database.name = db_name.clone();

        let hls_dir = tempfile::tempdir().expect("Failed to create temp HLS dir");
        settings.hls.storage_path = hls_dir.path().display().to_string();

        let client_options = ClientOptions::parse(&settings.database.url)
            .await
            .expect("Failed to parse MongoDB URL");
        let mongo_client =
            Client::with_options(client_options).expect("Failed to create MongoDB client");
        let db = mongo_client.database(&db_name);

        ensure_indexes(&db).await.expect("Failed to create indexes");

        let app_state = AppState::new(db.clone(), settings.clone())
            .await
            .expect("Failed to create AppState");
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::new();

        Self {
            addr,
            base_url,
            db,
            settings,
            client,
            _hls_dir: hls_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let db = self.db.clone();
        // Best effort cleanup: drop the test database
        tokio::spawn(async move {
            let _ = db.drop().await;
        });
    }
}

fn test_settings() -> Settings {
    Settings {
        app: stagecast_config::AppSettings {
            env: stagecast_config::AppEnv::Test,
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: stagecast_config::DatabaseSettings {
            url: "mongodb://localhost:27017".to_string(),
            name: "stagecast_test".to_string(),
            max_pool_size: Some(5),
            min_pool_size: Some(1),
        },
        cache: stagecast_config::CacheSettings { url: None },
        media: stagecast_config::MediaSettings {
            num_workers: 1,
            listen_ip: "127.0.0.1".to_string(),
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 40100,
            force_tcp: false,
        },
        hls: stagecast_config::HlsSettings {
            storage_path: "./hls-test".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        },
    }
}
