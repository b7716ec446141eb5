use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} is still referenced by {count} assessment records")]
    InUse {
        entity: &'static str,
        id: String,
        count: i64,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("skill '{skill_id}': {message}")]
    InvalidSkill { skill_id: String, message: String },

    #[error("skill '{skill_id}': write failed: {source}")]
    Write {
        skill_id: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::Validation(_) => "bad_params",
            RecordError::NotFound { .. } => "not_found",
            RecordError::Store(_) => "db_query_failed",
        }
    }
}
