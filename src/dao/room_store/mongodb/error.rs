use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{code}`")]
    LoadRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update room `{code}`")]
    UpdateRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list questions")]
    ListQuestions {
        #[source]
        source: MongoError,
    },
    #[error("failed to write roster of room `{code}`")]
    WriteRoster {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load roster of room `{code}`")]
    LoadRoster {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to append answer in room `{code}`")]
    AppendAnswer {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load answers of room `{code}`")]
    LoadAnswers {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("{message}")]
    Corrupt { message: String },
}

/// Whether a write failed because a unique index already holds the key.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}
