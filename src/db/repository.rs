use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::Document;

use crate::db::models::{Story, DEFAULT_BRANCH};
use crate::error::AppError;

/// Name of the collection holding every story.
pub const STORIES_COLLECTION: &str = "stories";

/// Repository trait for story operations.
///
/// This trait allows mocking the database layer in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryRepository: Send + Sync {
    /// All stories whose `author_email` matches exactly, with every field.
    async fn find_by_author_email(&self, email: &str) -> Result<Vec<Story>, AppError>;

    /// All stories, each projected to identifier, title, author and the
    /// default branch only.
    async fn list_summaries(&self) -> Result<Vec<Story>, AppError>;

    /// Insert a story document as-is and return the generated identifier.
    async fn insert(&self, story: Document) -> Result<ObjectId, AppError>;

    /// Add one view to `layers.<branch>` and return the story as it is after
    /// the increment, projected to identifier, author and that branch.
    ///
    /// Returns `None` if no story has the given identifier.
    async fn increment_views(&self, id: ObjectId, branch: &str)
        -> Result<Option<Story>, AppError>;

    /// Add `delta` to `layers.<branch>.timeSpent` and return the new total.
    ///
    /// Returns `None` if no story has the given identifier.
    async fn add_time_spent(
        &self,
        id: ObjectId,
        branch: &str,
        delta: f64,
    ) -> Result<Option<f64>, AppError>;
}

/// MongoDB implementation of the StoryRepository.
///
/// Counter updates use `$inc` inside a single `findOneAndUpdate`, so
/// concurrent requests on the same branch never lose an increment.
pub struct MongoStoryRepository {
    collection: mongodb::Collection<Story>,
}

impl MongoStoryRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(STORIES_COLLECTION),
        }
    }

    async fn find_many(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Story>, AppError> {
        use futures::TryStreamExt;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder().projection(projection).build();

        let cursor = self
            .collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(store_error)?;

        cursor
            .try_collect()
            .await
            .map_err(store_error)
    }
}

/// Server error codes caused by the shape of the submitted or stored
/// document rather than by the store being unavailable.
const CLIENT_DATA_ERROR_CODES: [i32; 6] = [
    2,  // BadValue
    14, // TypeMismatch: $inc on a non-numeric counter
    28, // PathNotViable: $inc below a branch that is not a sub-document
    52, // DollarPrefixedFieldName
    56, // EmptyFieldName
    57, // DottedFieldName
];

fn is_client_data_error(code: i32) -> bool {
    CLIENT_DATA_ERROR_CODES.contains(&code)
}

/// Maps a driver error to `BadRequest` when the data is at fault and to
/// `Database` otherwise.
fn store_error(err: mongodb::error::Error) -> AppError {
    use mongodb::error::{ErrorKind, WriteFailure};

    let code = match err.kind.as_ref() {
        ErrorKind::Command(command_error) => Some(command_error.code),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        _ => None,
    };

    match code {
        Some(code) if is_client_data_error(code) => {
            tracing::debug!("Store rejected story data: {}", err);
            AppError::BadRequest(format!("Story data rejected by the store: {}", err))
        }
        _ => AppError::Database(err.to_string()),
    }
}

fn branch_projection(branch: &str) -> Document {
    use bson::doc;

    let mut projection = doc! { "_id": 1, "author": 1 };
    projection.insert(format!("layers.{}", branch), 1);
    projection
}

#[async_trait]
impl StoryRepository for MongoStoryRepository {
    async fn find_by_author_email(&self, email: &str) -> Result<Vec<Story>, AppError> {
        use bson::doc;

        self.find_many(doc! { "author_email": email }, None).await
    }

    async fn list_summaries(&self) -> Result<Vec<Story>, AppError> {
        use bson::doc;

        let mut projection = doc! { "_id": 1, "title": 1, "author": 1 };
        projection.insert(format!("layers.{}", DEFAULT_BRANCH), 1);

        self.find_many(doc! {}, Some(projection)).await
    }

    async fn insert(&self, story: Document) -> Result<ObjectId, AppError> {
        let result = self
            .collection
            .clone_with_type::<Document>()
            .insert_one(story)
            .await
            .map_err(store_error)?;

        result.inserted_id.as_object_id().ok_or_else(|| {
            AppError::Internal(format!(
                "Store returned a non-ObjectId identifier: {}",
                result.inserted_id
            ))
        })
    }

    async fn increment_views(
        &self,
        id: ObjectId,
        branch: &str,
    ) -> Result<Option<Story>, AppError> {
        use bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let mut inc = Document::new();
        inc.insert(format!("layers.{}.views", branch), 1_i64);

        let options = FindOneAndUpdateOptions::builder()
            .projection(branch_projection(branch))
            .return_document(ReturnDocument::After)
            .build();

        self.collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$inc": inc })
            .with_options(options)
            .await
            .map_err(store_error)
    }

    async fn add_time_spent(
        &self,
        id: ObjectId,
        branch: &str,
        delta: f64,
    ) -> Result<Option<f64>, AppError> {
        use bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let mut inc = Document::new();
        inc.insert(format!("layers.{}.timeSpent", branch), delta);

        let options = FindOneAndUpdateOptions::builder()
            .projection(branch_projection(branch))
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$inc": inc })
            .with_options(options)
            .await
            .map_err(store_error)?;

        Ok(updated.map(|story| {
            story
                .layers
                .get(branch)
                .map(|b| b.time_spent)
                .unwrap_or(delta)
        }))
    }
}
