//! Dockerfile loader.
//!
//! Every instruction becomes a `docker_<cmd>` resource; a `docker_dockerfile`
//! resource lists the commands of the whole file. Directives found in any
//! comment apply to every resource of the file.

pub mod parser;

use log::debug;
use std::fs;
use std::path::Path;

use super::files::{self, base_name, relative_source};
use super::output::{AllResourceConfigs, ResourceConfig};
use super::pragma;
use super::{DirScanErr, IacLoader, LoadOptions, LoadOutcome};
use crate::error::IacError;

pub use parser::{Dockerfile, Instruction, parse_dockerfile};

/// Prefix of every docker resource type.
pub const TYPE_PREFIX: &str = "docker_";
const DOCKERFILE_TYPE: &str = "docker_dockerfile";

/// True for `Dockerfile`, `dockerfile`, `*.Dockerfile` and `Dockerfile.*`.
pub fn is_dockerfile(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name == "Dockerfile" || name == "dockerfile" || name.ends_with(".Dockerfile") || name.starts_with("Dockerfile.")
}

/// Stable id suffix of a resource.
pub fn resource_id_hash(source: &str, value: &str, line: usize) -> String {
    let input = format!("{}{}{}", source, value, line);
    blake3::hash(input.as_bytes()).to_hex()[..32].to_string()
}

/// Loader for Dockerfiles.
#[derive(Debug, Clone, Default)]
pub struct DockerLoader;

impl DockerLoader {
    pub fn new() -> Self {
        Self
    }

    fn load_with_source(&self, path: &Path, source: &str) -> Result<AllResourceConfigs, IacError> {
        let content = fs::read_to_string(path)?;
        let dockerfile = parse_dockerfile(&content).map_err(|e| {
            IacError::parse(
                path.display().to_string(),
                format!("error while parsing dockerfile: {}", e),
            )
        })?;
        Ok(to_resources(&dockerfile, &base_name(path), source))
    }
}

/// Build the resources of a parsed Dockerfile.
pub fn to_resources(dockerfile: &Dockerfile, name: &str, source: &str) -> AllResourceConfigs {
    let directives = pragma::parse_directives(&dockerfile.comments);
    if !directives.is_empty() {
        debug!("directives found in {}: {:?}", source, directives);
    }

    let mut all = AllResourceConfigs::new();
    let mut commands = Vec::with_capacity(dockerfile.instructions.len());

    for instruction in &dockerfile.instructions {
        commands.push(serde_json::Value::String(instruction.cmd.clone()));

        let resource_type = format!("{}{}", TYPE_PREFIX, instruction.cmd);
        let mut resource = ResourceConfig {
            id: format!(
                "{}.{}",
                resource_type,
                resource_id_hash(source, &instruction.value, instruction.line)
            ),
            name: name.to_string(),
            source: source.to_string(),
            line: instruction.line,
            resource_type,
            config: serde_json::Value::String(instruction.value.clone()),
            ..Default::default()
        };
        directives.apply(&mut resource);
        all.push(resource);
    }

    let mut dockerfile_resource = ResourceConfig {
        id: format!("{}.{}", DOCKERFILE_TYPE, resource_id_hash(source, "", 1)),
        name: name.to_string(),
        source: source.to_string(),
        line: 1,
        resource_type: DOCKERFILE_TYPE.to_string(),
        config: serde_json::Value::Array(commands),
        ..Default::default()
    };
    directives.apply(&mut dockerfile_resource);
    all.push(dockerfile_resource);

    all
}

impl IacLoader for DockerLoader {
    fn load_iac_dir(&self, root: &Path, options: &LoadOptions) -> LoadOutcome {
        let found = match files::find_files(root, options.non_recursive(), is_dockerfile) {
            Ok(found) => found,
            Err(e) => return LoadOutcome::failed(DirScanErr::new("docker", root.display().to_string(), e)),
        };

        files::load_each("docker", "docker", root, &found, |file| {
            self.load_with_source(file, &relative_source(root, file))
        })
    }

    fn load_iac_file(&self, path: &Path, _options: &LoadOptions) -> Result<AllResourceConfigs, IacError> {
        self.load_with_source(path, &base_name(path))
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOCKERFILE: &str = r#"#ts:skip=AC_DOCKER_0047 apt is pinned elsewhere
#ts:maxseverity=Medium
FROM ubuntu:latest
RUN apt-get update
USER app
"#;

    #[test]
    fn test_is_dockerfile() {
        assert!(is_dockerfile(Path::new("a/Dockerfile")));
        assert!(is_dockerfile(Path::new("dockerfile")));
        assert!(is_dockerfile(Path::new("api.Dockerfile")));
        assert!(is_dockerfile(Path::new("Dockerfile.prod")));
        assert!(!is_dockerfile(Path::new("Dockerfile-notes.md")));
        assert!(!is_dockerfile(Path::new("docker-compose.yml")));
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Dockerfile");
        fs::write(&path, DOCKERFILE).unwrap();

        let all = DockerLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(all.len(), 4);

        let from = &all.get("docker_from").unwrap()[0];
        assert_eq!(from.config, "ubuntu:latest");
        assert_eq!(from.line, 3);
        assert_eq!(from.source, "Dockerfile");
        assert!(from.id.starts_with("docker_from."));
        assert_eq!(from.skip_rules[0].rule, "AC_DOCKER_0047");
        assert_eq!(from.max_severity, "Medium");

        let dockerfile = &all.get("docker_dockerfile").unwrap()[0];
        assert_eq!(dockerfile.config, serde_json::json!(["from", "run", "user"]));
        assert_eq!(dockerfile.skip_rules.len(), 1);
    }

    #[test]
    fn test_ids_are_stable_and_distinct() {
        let a = resource_id_hash("Dockerfile", "ubuntu", 1);
        assert_eq!(a, resource_id_hash("Dockerfile", "ubuntu", 1));
        assert_ne!(a, resource_id_hash("Dockerfile", "ubuntu", 2));
        assert_ne!(a, resource_id_hash("other/Dockerfile", "ubuntu", 1));
    }

    #[test]
    fn test_load_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("api")).unwrap();
        fs::write(dir.path().join("Dockerfile"), DOCKERFILE).unwrap();
        fs::write(dir.path().join("api/Dockerfile"), "FROM alpine:3.19\n").unwrap();
        fs::write(dir.path().join("bad.Dockerfile"), "FROM alpine\nBOGUS x\n").unwrap();

        let outcome = DockerLoader::new().load_iac_dir(dir.path(), &LoadOptions::default());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.resources.get("docker_dockerfile").unwrap().len(), 2);
        let sources: Vec<_> = outcome.resources.get("docker_from").unwrap().iter().map(|r| r.source.clone()).collect();
        assert_eq!(sources, vec!["Dockerfile", "api/Dockerfile"]);
    }
}
