use std::time::Duration;

use mongodb::{Client, Database, bson::doc, error::Error as MongoError, options::ClientOptions};
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

/// Pings tried before giving up; the storage supervisor owns the long backoff.
const PING_ATTEMPTS: u32 = 3;
const PING_PAUSE: Duration = Duration::from_millis(300);

/// Round-trip a `ping` command against `database`.
pub(super) async fn ping(database: &Database) -> Result<(), MongoError> {
    database.run_command(doc! { "ping": 1 }).await.map(|_| ())
}

/// Open a client on `database_name` and make sure the server answers.
pub(super) async fn open_database(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 1;
    while let Err(source) = ping(&database).await {
        if attempt >= PING_ATTEMPTS {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source,
            });
        }
        debug!(attempt, database = database_name, error = %source, "MongoDB not answering yet");
        tokio::time::sleep(PING_PAUSE * attempt).await;
        attempt += 1;
    }

    Ok((client, database))
}
