use serde::{Deserialize, Serialize};

/// Source of fresh document ids.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Built-in id strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Uuid,
    Ulid,
    Nanoid,
}

impl IdGenerator for IdStrategy {
    fn new_id(&self) -> String {
        match self {
            IdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn new_id(&self) -> String {
        self()
    }
}
