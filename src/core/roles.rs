use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};

use super::errors::CoreError;
use super::models::RoleRef;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub role_id: String,
    pub role_name: String,
    pub jd_file: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_date: String,
}

impl Role {
    pub fn role_ref(&self) -> RoleRef {
        RoleRef {
            role_id: self.role_id.clone(),
            role_name: self.role_name.clone(),
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RolesFile {
    #[serde(default)]
    roles: Vec<Role>,
}

/// Job roles persisted as `{"roles": [...]}`. Every mutation is written back
/// immediately.
pub struct RoleRegistry {
    file_path: PathBuf,
    roles: Vec<Role>,
}

impl RoleRegistry {
    pub async fn open(file_path: PathBuf) -> anyhow::Result<Self> {
        if !tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
            return Ok(Self {
                file_path,
                roles: Vec::new(),
            });
        }

        let content = tokio::fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("failed to read roles file {}", file_path.display()))?;
        let parsed = serde_json::from_str::<RolesFile>(&content)
            .with_context(|| format!("invalid JSON in roles file {}", file_path.display()))?;

        Ok(Self {
            file_path,
            roles: parsed.roles,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn active_roles(&self) -> Vec<&Role> {
        self.roles.iter().filter(|role| role.active).collect()
    }

    pub fn find_by_id(&self, role_id: &str) -> Option<&Role> {
        self.roles.iter().find(|role| role.role_id == role_id)
    }

    pub fn find_by_name(&self, role_name: &str) -> Option<&Role> {
        let wanted = role_name.trim().to_lowercase();
        self.roles
            .iter()
            .find(|role| role.role_name.to_lowercase() == wanted)
    }

    /// Ids are assigned from the role count, so they are never reused while
    /// roles are only ever deactivated.
    pub async fn add(&mut self, role_name: &str, jd_file: &str) -> anyhow::Result<Role> {
        let role_name = role_name.trim();
        if role_name.is_empty() {
            return Err(CoreError::InvalidRequest("role name is required".to_string()).into());
        }

        let role = Role {
            role_id: format!("ROLE{:03}", self.roles.len() + 1),
            role_name: role_name.to_string(),
            jd_file: jd_file.to_string(),
            active: true,
            created_date: Local::now().format("%Y-%m-%d").to_string(),
        };

        self.roles.push(role.clone());
        self.save().await?;
        Ok(role)
    }

    pub async fn set_active(&mut self, role_id: &str, active: bool) -> anyhow::Result<()> {
        let role = self
            .roles
            .iter_mut()
            .find(|role| role.role_id == role_id)
            .ok_or_else(|| CoreError::RoleNotFound(role_id.to_string()))?;
        role.active = active;
        self.save().await
    }

    async fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&RolesFile {
            roles: self.roles.clone(),
        })?;
        tokio::fs::write(&self.file_path, json).await?;
        Ok(())
    }
}

/// `python_developer.txt` becomes `Python Developer`.
pub fn role_name_from_jd_file(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .unwrap_or_default()
        .replace(['_', '-'], " ");

    stem.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_assigns_sequential_ids_and_persists() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config").join("roles.json");

        let mut registry = RoleRegistry::open(path.clone()).await.unwrap();
        let first = registry
            .add("Python Developer", "jd_files/python_developer.txt")
            .await
            .unwrap();
        let second = registry.add("Data Analyst", "jd_files/data.txt").await.unwrap();
        assert_eq!(first.role_id, "ROLE001");
        assert_eq!(second.role_id, "ROLE002");
        assert!(first.active);

        let reopened = RoleRegistry::open(path).await.unwrap();
        assert_eq!(reopened.roles().len(), 2);
        assert_eq!(reopened.roles()[1], second);
    }

    #[tokio::test]
    async fn lookups_and_activation() {
        let temp = tempfile::tempdir().unwrap();
        let mut registry = RoleRegistry::open(temp.path().join("roles.json"))
            .await
            .unwrap();
        registry.add("Python Developer", "a.txt").await.unwrap();
        registry.add("Data Analyst", "b.txt").await.unwrap();

        assert_eq!(
            registry.find_by_name("python developer").unwrap().role_id,
            "ROLE001"
        );
        assert!(registry.find_by_id("ROLE003").is_none());

        registry.set_active("ROLE001", false).await.unwrap();
        let active: Vec<_> = registry.active_roles().iter().map(|r| r.role_id.clone()).collect();
        assert_eq!(active, vec!["ROLE002"]);

        registry.set_active("ROLE001", true).await.unwrap();
        assert_eq!(registry.active_roles().len(), 2);

        let err = registry.set_active("ROLE009", true).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::RoleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_active_flag_defaults_to_active() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("roles.json");
        tokio::fs::write(
            &path,
            r#"{"roles":[{"role_id":"ROLE001","role_name":"QA","jd_file":"qa.txt","created_date":"2025-01-01"}]}"#,
        )
        .await
        .unwrap();

        let registry = RoleRegistry::open(path).await.unwrap();
        assert_eq!(registry.active_roles().len(), 1);
        assert_eq!(registry.roles()[0].role_ref().role_name, "QA");
    }

    #[tokio::test]
    async fn blank_role_names_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let mut registry = RoleRegistry::open(temp.path().join("roles.json"))
            .await
            .unwrap();
        assert!(registry.add("  ", "x.txt").await.is_err());
        assert!(registry.roles().is_empty());
    }

    #[test]
    fn role_names_derive_from_jd_file_names() {
        assert_eq!(
            role_name_from_jd_file(Path::new("jd_files/python_developer.txt")),
            "Python Developer"
        );
        assert_eq!(
            role_name_from_jd_file(Path::new("SENIOR-data_ENGINEER.txt")),
            "Senior Data Engineer"
        );
    }
}
