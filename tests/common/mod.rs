use std::sync::Arc;

use axum::Router;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

use story_paths::app::{build_router, AppState};
use story_paths::db::models::InsertAck;
use story_paths::db::repository::{MongoStoryRepository, StoryRepository};

pub const TEST_ORIGIN: &str = "https://stories.example.com";

/// Holds the running MongoDB container and provides the Axum router for
/// integration tests.
///
/// The container is kept alive for as long as this struct lives.
pub struct TestEnv {
    _mongo: ContainerAsync<Mongo>,
    pub router: Router,
    pub repo: Arc<dyn StoryRepository>,
}

impl TestEnv {
    /// Start MongoDB and build a router wired to the real repository.
    pub async fn start() -> Self {
        let mongo_container = Mongo::default()
            .start()
            .await
            .expect("Failed to start MongoDB container");

        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let mongo_uri = format!("mongodb://127.0.0.1:{}", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let mongo_db = mongo_client.database("story_paths_test");
        let repo: Arc<dyn StoryRepository> = Arc::new(MongoStoryRepository::new(&mongo_db));

        let router = build_router(
            AppState {
                story_repo: repo.clone(),
            },
            &[TEST_ORIGIN.to_string()],
        );

        Self {
            _mongo: mongo_container,
            router,
            repo,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .expect_success_by_default()
            .build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Helper: create a story with two branches and return its identifier.
    pub async fn create_story(
        &self,
        server: &axum_test::TestServer,
        title: &str,
        author_email: &str,
    ) -> String {
        let ack: InsertAck = server
            .post("/api/stories")
            .json(&serde_json::json!({
                "title": title,
                "author": "Test Author",
                "author_email": author_email,
                "layers": {
                    "branch_1": { "text": "You stand at a fork in the road." },
                    "branch_2": { "text": "You take the left path." }
                }
            }))
            .await
            .json();

        assert!(ack.acknowledged);
        ack.inserted_id
    }
}

/// A unique author email so tests sharing a database never see each other's stories.
pub fn unique_email() -> String {
    format!("author-{}@example.com", uuid::Uuid::new_v4().simple())
}
