use crate::firestore::constants::DEFAULT_DATABASE_ID;
use crate::firestore::error::{invalid_argument, missing_project_id, FirestoreResult};
use crate::firestore::model::ResourcePath;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseId {
    project_id: String,
    database: String,
}

impl DatabaseId {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
        }
    }

    pub fn default(project_id: impl Into<String>) -> Self {
        Self::new(project_id, DEFAULT_DATABASE_ID)
    }

    /// Resolves a database identifier that is either a bare database name or a
    /// fully qualified `projects/{project}/databases/{database}` string.
    pub fn parse(project_id: Option<&str>, identifier: Option<&str>) -> FirestoreResult<Self> {
        match identifier.filter(|value| !value.is_empty()) {
            Some(identifier) if identifier.starts_with("projects/") => {
                let segments: Vec<_> = identifier.split('/').collect();
                if segments.len() == 4 && segments[2] == "databases" && !segments[1].is_empty() {
                    return Ok(Self::new(segments[1], segments[3]));
                }
                Err(invalid_argument(
                    "Database identifier must follow projects/{project}/databases/{database}",
                ))
            }
            Some(database) => {
                let project_id = project_id.filter(|p| !p.is_empty()).ok_or_else(missing_project_id)?;
                Ok(Self::new(project_id, database))
            }
            None => {
                let project_id = project_id.filter(|p| !p.is_empty()).ok_or_else(missing_project_id)?;
                Ok(Self::default(project_id))
            }
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `projects/{project}/databases/{database}`
    pub fn database_name(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }

    /// Fully qualified name of a document or collection path, as used on the wire.
    pub fn qualified_path(&self, path: &ResourcePath) -> String {
        if path.is_empty() {
            format!("{}/documents", self.database_name())
        } else {
            format!("{}/documents/{}", self.database_name(), path.canonical_string())
        }
    }
}
