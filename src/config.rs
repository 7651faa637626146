//! Application-level configuration loading: question rotation policy and optional seed data.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::{
    models::{QuestionEntity, QuestionId, RoomCode, RoomEntity, RoomStatus},
    room_store::InMemoryRoomStore,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PROMPT_PARTY_CONFIG_PATH";

/// How the next question of a round is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Walk a shuffled copy of the catalog and reshuffle once exhausted.
    #[default]
    Shuffle,
    /// Pick uniformly at random on every round.
    Random,
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rotation: RotationPolicy,
    seed: Option<SeedData>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rotation = ?app_config.rotation,
                        seeded = app_config.seed.is_some(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Configuration with an explicit rotation policy and no seed data.
    pub fn with_rotation(rotation: RotationPolicy) -> Self {
        Self {
            rotation,
            seed: None,
        }
    }

    /// Question rotation policy applied to every room.
    pub fn rotation(&self) -> RotationPolicy {
        self.rotation
    }

    /// Populate an in-memory store with the configured rooms and questions.
    ///
    /// Returns the number of rooms and questions inserted.
    pub fn seed_store(&self, store: &InMemoryRoomStore) -> (usize, usize) {
        let Some(seed) = &self.seed else {
            return (0, 0);
        };

        for room in &seed.rooms {
            let mut entity = RoomEntity::open(RoomCode::new(&room.code));
            entity.status = room.status;
            store.insert_room(entity);
        }
        for question in &seed.questions {
            store.insert_question(question.clone());
        }
        (seed.rooms.len(), seed.questions.len())
    }
}

/// Rooms and questions used to bootstrap the in-memory backend.
#[derive(Debug, Clone, Default)]
struct SeedData {
    rooms: Vec<RawRoom>,
    questions: Vec<QuestionEntity>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    rotation: RotationPolicy,
    #[serde(default)]
    seed: Option<RawSeed>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            rotation: value.rotation,
            seed: value.seed.map(Into::into),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSeed {
    #[serde(default)]
    rooms: Vec<RawRoom>,
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

impl From<RawSeed> for SeedData {
    fn from(value: RawSeed) -> Self {
        Self {
            rooms: value.rooms,
            questions: value.questions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawRoom {
    code: String,
    #[serde(default = "default_status")]
    status: RoomStatus,
}

fn default_status() -> RoomStatus {
    RoomStatus::Open
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    id: QuestionId,
    prompt: String,
    #[serde(default)]
    sort_number: i32,
}

impl From<RawQuestion> for QuestionEntity {
    fn from(value: RawQuestion) -> Self {
        Self {
            id: value.id,
            prompt: value.prompt,
            sort_number: value.sort_number,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::{QuestionCatalog, RoomDirectory};

    #[test]
    fn rotation_defaults_to_shuffle() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.rotation(), RotationPolicy::Shuffle);
    }

    #[tokio::test]
    async fn seed_populates_memory_store() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "rotation": "random",
                "seed": {
                    "rooms": [{"code": "abcd"}, {"code": "shut", "status": "closed"}],
                    "questions": [{"id": 1, "prompt": "Prompt A", "sortNumber": 2}]
                }
            }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.rotation(), RotationPolicy::Random);

        let store = InMemoryRoomStore::new();
        assert_eq!(config.seed_store(&store), (2, 1));

        let room = store.find_room(RoomCode::new("ABCD")).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Open);
        let closed = store.find_room(RoomCode::new("SHUT")).await.unwrap().unwrap();
        assert_eq!(closed.status, RoomStatus::Closed);
        assert_eq!(store.list_questions().await.unwrap().len(), 1);
    }
}
