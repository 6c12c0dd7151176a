//! Secret Manager resource names

use std::fmt;

use crate::storage::StoreError;

const MAX_ID_LEN: usize = 255;

/// Reserved because `{id}.json` would collide with the version manifest
const RESERVED_SECRET_ID: &str = "versions";

fn validate_id(kind: &str, id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "{kind} id {id:?} must be 1 to {MAX_ID_LEN} letters, digits, hyphens or underscores"
        )))
    }
}

/// `projects/{project}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectName {
    project: String,
}

impl ProjectName {
    pub fn new(project: &str) -> Result<Self, StoreError> {
        validate_id("project", project)?;
        Ok(Self {
            project: project.to_string(),
        })
    }

    pub fn parse(name: &str) -> Result<Self, StoreError> {
        match name.split('/').collect::<Vec<_>>().as_slice() {
            ["projects", project] => Self::new(project),
            _ => Err(StoreError::InvalidArgument(format!(
                "{name:?} is not a project name of the form projects/{{project}}"
            ))),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Name of the secret `secret_id` in this project
    pub fn secret(&self, secret_id: &str) -> Result<SecretName, StoreError> {
        SecretName::new(self.clone(), secret_id)
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}", self.project)
    }
}

/// `projects/{project}/secrets/{secret}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretName {
    parent: ProjectName,
    secret: String,
}

impl SecretName {
    pub fn new(parent: ProjectName, secret_id: &str) -> Result<Self, StoreError> {
        validate_id("secret", secret_id)?;
        if secret_id == RESERVED_SECRET_ID {
            return Err(StoreError::InvalidArgument(format!(
                "secret id {secret_id:?} is reserved"
            )));
        }
        Ok(Self {
            parent,
            secret: secret_id.to_string(),
        })
    }

    pub fn parse(name: &str) -> Result<Self, StoreError> {
        match name.split('/').collect::<Vec<_>>().as_slice() {
            ["projects", project, "secrets", secret] => {
                Self::new(ProjectName::new(project)?, secret)
            }
            _ => Err(StoreError::InvalidArgument(format!(
                "{name:?} is not a secret name of the form projects/{{project}}/secrets/{{secret}}"
            ))),
        }
    }

    pub fn parent(&self) -> &ProjectName {
        &self.parent
    }

    pub fn id(&self) -> &str {
        &self.secret
    }

    /// Name of version `number` of this secret
    pub fn version(&self, number: u64) -> String {
        format!("{self}/versions/{number}")
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/secrets/{}", self.parent, self.secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secret_name() {
        let name = SecretName::parse("projects/demo/secrets/api_key-1").unwrap();
        assert_eq!(name.parent().project(), "demo");
        assert_eq!(name.id(), "api_key-1");
        assert_eq!(name.to_string(), "projects/demo/secrets/api_key-1");
        assert_eq!(name.version(2), "projects/demo/secrets/api_key-1/versions/2");
    }

    #[test]
    fn test_parse_project_name() {
        let project = ProjectName::parse("projects/demo").unwrap();
        assert_eq!(project.to_string(), "projects/demo");
        assert_eq!(
            project.secret("apikey").unwrap().to_string(),
            "projects/demo/secrets/apikey"
        );
    }

    #[test]
    fn test_rejects_bad_names() {
        for name in [
            "",
            "projects",
            "projects/",
            "projects/demo/secrets",
            "projects/../secrets/x",
            "projects/demo/secrets/a/b",
            "projects/demo/secrets/a.b",
            "folders/demo/secrets/x",
            "projects/demo/secrets/versions",
        ] {
            assert!(
                matches!(SecretName::parse(name), Err(StoreError::InvalidArgument(_))),
                "{name} should be rejected"
            );
        }
        assert!(ProjectName::parse("projects/demo/x").is_err());
        assert!(ProjectName::new(&"a".repeat(256)).is_err());
        assert!(ProjectName::new(&"a".repeat(255)).is_ok());
    }
}
