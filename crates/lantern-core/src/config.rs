//! Per-project service configuration (`.lantern-setup.json`)

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::constants::SETUP_FILE;
use crate::error::{Error, Result};
use crate::types::{validate_service_name, ServiceKey};

/// Root config file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupFile {
    pub services: Vec<ServiceConfig>,
}

/// One configured service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    /// Shell command line to launch
    pub shell: String,
    /// Working directory relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    /// Hand the service a port through `PORT`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub assign_port: bool,
}

/// A service resolved against its project, ready to launch
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedService {
    pub name: String,
    pub shell: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub assign_port: bool,
    /// Directory holding the config file; scopes processes and logs
    pub project_dir: PathBuf,
}

impl ResolvedService {
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.name.clone(), self.project_dir.clone())
    }
}

impl SetupFile {
    /// Parse and validate config content
    pub fn from_json(content: &str, path: &Path) -> Result<Self> {
        let setup: SetupFile = serde_json::from_str(content)
            .map_err(|e| Error::config_invalid(path, e.to_string()))?;
        setup
            .validate()
            .map_err(|msg| Error::config_invalid(path, msg))?;
        Ok(setup)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, path)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.services.is_empty() {
            return Err("Config must have at least one service".to_string());
        }

        let mut names = HashSet::new();
        let mut defaults = 0;
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err("Each service must have a non-empty \"name\"".to_string());
            }
            if !validate_service_name(&service.name) {
                return Err(format!(
                    "Invalid service name \"{}\": use letters, digits, '.', '_' or '-'",
                    service.name
                ));
            }
            if service.shell.trim().is_empty() {
                return Err(format!(
                    "Service \"{}\" must have a non-empty \"shell\"",
                    service.name
                ));
            }
            if !names.insert(service.name.as_str()) {
                return Err(format!("Duplicate service name: \"{}\"", service.name));
            }
            if service.default {
                defaults += 1;
            }
            if let Some(root) = &service.root {
                if !is_contained_relative(root) {
                    return Err(format!(
                        "Service \"{}\" has invalid root path: \"{}\"",
                        service.name, root
                    ));
                }
            }
        }

        if defaults > 1 {
            return Err("Only one service can be marked as default".to_string());
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Service used when no name is given: the marked default, else the only one
    pub fn default_service(&self) -> Option<&ServiceConfig> {
        self.services
            .iter()
            .find(|s| s.default)
            .or_else(|| match self.services.as_slice() {
                [only] => Some(only),
                _ => None,
            })
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Relative path that stays inside its base directory once normalized
fn is_contained_relative(p: &str) -> bool {
    let path = Path::new(p);
    if path.is_absolute() {
        return false;
    }
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// A located config file and the project it defines
#[derive(Debug, Clone)]
pub struct Project {
    pub config_path: PathBuf,
    pub project_dir: PathBuf,
    pub setup: SetupFile,
}

impl Project {
    /// Walk up from `start_dir` to the nearest config file
    pub fn find(start_dir: &Path) -> Result<Option<Self>> {
        let start = absolutize(start_dir)?;
        for dir in start.ancestors() {
            let config_path = dir.join(SETUP_FILE);
            if config_path.is_file() {
                let setup = SetupFile::load(&config_path)?;
                return Ok(Some(Self {
                    config_path,
                    project_dir: dir.to_path_buf(),
                    setup,
                }));
            }
        }
        Ok(None)
    }

    /// Like [`Project::find`] but a missing config is an error
    pub fn discover(start_dir: &Path) -> Result<Self> {
        Self::find(start_dir)?.ok_or_else(|| Error::ConfigNotFound(start_dir.to_path_buf()))
    }

    /// Resolve a service by name, or the default service when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> Result<ResolvedService> {
        let service = match name {
            Some(name) => self
                .setup
                .service(name)
                .ok_or_else(|| Error::ServiceNotFound {
                    name: name.to_string(),
                    config_path: self.config_path.clone(),
                })?,
            None => self
                .setup
                .default_service()
                .ok_or_else(|| Error::ServiceNameRequired(self.config_path.clone()))?,
        };
        Ok(self.resolve_config(service))
    }

    /// Every configured service, in config order
    pub fn resolve_all(&self) -> Vec<ResolvedService> {
        self.setup
            .services
            .iter()
            .map(|s| self.resolve_config(s))
            .collect()
    }

    fn resolve_config(&self, service: &ServiceConfig) -> ResolvedService {
        ResolvedService {
            name: service.name.clone(),
            shell: service.shell.clone(),
            cwd: self.service_cwd(service),
            env: service.env.clone(),
            assign_port: service.assign_port,
            project_dir: self.project_dir.clone(),
        }
    }

    pub fn service_cwd(&self, service: &ServiceConfig) -> PathBuf {
        match &service.root {
            Some(root) => normalize(&self.project_dir.join(root)),
            None => self.project_dir.clone(),
        }
    }
}

/// Add a service to the config in `dir`, creating the file when missing.
///
/// A new default service clears the flag on every other service. Returns the
/// path written.
pub fn add_service(dir: &Path, service: ServiceConfig) -> Result<PathBuf> {
    let dir = absolutize(dir)?;
    let (config_path, mut setup) = match Project::find(&dir)? {
        Some(project) => (project.config_path, project.setup),
        None => (dir.join(SETUP_FILE), SetupFile::default()),
    };

    if setup.service(&service.name).is_some() {
        return Err(Error::ServiceAlreadyExists(service.name));
    }
    if service.default {
        for existing in &mut setup.services {
            existing.default = false;
        }
    }
    setup.services.push(service);
    setup
        .validate()
        .map_err(|msg| Error::config_invalid(&config_path, msg))?;

    let content = serde_json::to_string_pretty(&setup)?;
    std::fs::write(&config_path, format!("{}\n", content))?;
    Ok(config_path)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, content: &str) {
        std::fs::write(dir.join(SETUP_FILE), content).unwrap();
    }

    #[test]
    fn test_parse_services() {
        let content = r#"{
  "services": [
    { "name": "web", "shell": "npm run dev", "default": true, "assignPort": true },
    { "name": "worker", "shell": "node worker.js", "root": "packages/worker", "env": { "QUEUE": "jobs" } }
  ]
}"#;
        let setup = SetupFile::from_json(content, Path::new("/p/.lantern-setup.json")).unwrap();
        assert_eq!(setup.service_names(), vec!["web", "worker"]);
        assert!(setup.services[0].assign_port);
        assert_eq!(setup.services[1].root.as_deref(), Some("packages/worker"));
        assert_eq!(setup.default_service().unwrap().name, "web");
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            (r#"{"services": []}"#, "at least one service"),
            (r#"{"services": [{"name": "", "shell": "x"}]}"#, "non-empty \"name\""),
            (r#"{"services": [{"name": "a", "shell": ""}]}"#, "non-empty \"shell\""),
            (r#"{"services": [{"name": "../etc", "shell": "x"}]}"#, "Invalid service name"),
            (r#"{"services": [{"name": "my app", "shell": "x"}]}"#, "Invalid service name"),
            (
                r#"{"services": [{"name": "a", "shell": "x"}, {"name": "a", "shell": "y"}]}"#,
                "Duplicate service name",
            ),
            (
                r#"{"services": [{"name": "a", "shell": "x", "default": true}, {"name": "b", "shell": "y", "default": true}]}"#,
                "Only one service",
            ),
            (r#"{"services": [{"name": "a", "shell": "x", "root": "/abs"}]}"#, "invalid root"),
            (r#"{"services": [{"name": "a", "shell": "x", "root": "../up"}]}"#, "invalid root"),
            (r#"{"services": [{"name": "a", "shell": "x", "root": "a/../../up"}]}"#, "invalid root"),
        ];
        for (content, expected) in cases {
            let err = SetupFile::from_json(content, Path::new("/p/cfg")).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{} should fail with {:?}, got {}",
                content,
                expected,
                err
            );
            assert!(err.is_config_error());
        }
    }

    #[test]
    fn test_contained_root_allowed() {
        assert!(is_contained_relative("a/../b"));
        assert!(is_contained_relative("./svc"));
        assert!(!is_contained_relative(".."));
    }

    #[test]
    fn test_find_walks_up() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"{"services": [{"name": "api", "shell": "cargo run", "root": "server"}]}"#,
        );
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let project = Project::discover(&nested).unwrap();
        assert_eq!(project.project_dir, normalize(dir.path()));

        let resolved = project.resolve(None).unwrap();
        assert_eq!(resolved.name, "api");
        assert_eq!(resolved.cwd, normalize(&dir.path().join("server")));
        assert_eq!(resolved.project_dir, project.project_dir);
    }

    #[test]
    fn test_discover_missing() {
        let dir = tempdir().unwrap();
        let err = Project::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn test_resolve_requires_name_without_default() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"{"services": [{"name": "a", "shell": "x"}, {"name": "b", "shell": "y"}]}"#,
        );
        let project = Project::discover(dir.path()).unwrap();
        assert!(matches!(
            project.resolve(None),
            Err(Error::ServiceNameRequired(_))
        ));
        assert!(matches!(
            project.resolve(Some("c")),
            Err(Error::ServiceNotFound { .. })
        ));
        assert_eq!(project.resolve(Some("b")).unwrap().shell, "y");
    }

    #[test]
    fn test_add_service_creates_and_moves_default() {
        let dir = tempdir().unwrap();
        let first = ServiceConfig {
            name: "web".to_string(),
            shell: "npm start".to_string(),
            default: true,
            ..Default::default()
        };
        let path = add_service(dir.path(), first).unwrap();
        assert!(path.ends_with(SETUP_FILE));

        let second = ServiceConfig {
            name: "db".to_string(),
            shell: "postgres".to_string(),
            default: true,
            ..Default::default()
        };
        add_service(dir.path(), second).unwrap();

        let setup = SetupFile::load(&path).unwrap();
        assert_eq!(setup.services.len(), 2);
        assert!(!setup.service("web").unwrap().default);
        assert!(setup.service("db").unwrap().default);

        let dup = ServiceConfig {
            name: "db".to_string(),
            shell: "x".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            add_service(dir.path(), dup),
            Err(Error::ServiceAlreadyExists(_))
        ));
    }
}
