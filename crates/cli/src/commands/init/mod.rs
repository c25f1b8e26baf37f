use clap::{Args, ValueEnum};
use minijinja::{context, Environment};
use serde::Serialize;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_TEMPLATE: &str = include_str!("templates/askdb-project.yml.j2");
const CONNECTIONS_TEMPLATE: &str = include_str!("templates/connections.yml.j2");

#[derive(Debug, Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Openai,
    Ollama,
}

impl Flavor {
    fn defaults(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            Flavor::Openai => ("https://api.openai.com/v1", "gpt-4o-mini", Some("OPENAI_API_KEY")),
            Flavor::Ollama => ("http://localhost:11434", "llama3.1", None),
        }
    }
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[arg(
        long = "dir",
        short = 'd',
        default_value = ".",
        help = "Target path for project"
    )]
    pub(crate) path: PathBuf,
    #[arg(
        long = "project-name",
        short = 'n',
        default_value = "askdb-project",
        help = "project name"
    )]
    pub(crate) project_name: String,
    #[arg(long, default_value = "postgres", help = "database to ask questions of")]
    pub(crate) database: String,
    #[arg(long, value_enum, default_value_t = Flavor::Openai, help = "completion API flavor")]
    pub(crate) flavor: Flavor,
}

enum FileTemplates {
    Project,
    Connections,
}

impl Display for FileTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

impl FileTemplates {
    fn template(&self) -> &'static str {
        match self {
            FileTemplates::Project => PROJECT_TEMPLATE,
            FileTemplates::Connections => CONNECTIONS_TEMPLATE,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            FileTemplates::Project => common::config::loader::PROJECT_FILE,
            FileTemplates::Connections => "connections.yml",
        }
    }
}

fn create_component<S: Serialize>(
    env: &mut Environment,
    project_path: &Path,
    file: FileTemplates,
    ctx: S,
) -> std::io::Result<()> {
    let write_path = project_path.join(file.path());
    if write_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", write_path.display()),
        ));
    }

    env.add_template(file.path(), file.template())
        .map_err(std::io::Error::other)?;
    let rendered = env
        .get_template(file.path())
        .and_then(|t| t.render(ctx))
        .map_err(std::io::Error::other)?;

    fs::write(write_path, rendered)
}

/// Write `askdb-project.yml` and `connections.yml` into `args.path`.
/// Existing files are never overwritten.
pub fn handle_init(args: &InitArgs) -> std::io::Result<()> {
    if args.database.is_empty() || args.database.contains(['/', '\\']) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' is not a usable database name", args.database),
        ));
    }
    fs::create_dir_all(&args.path)?;

    let (base_url, model, api_key_env) = args.flavor.defaults();
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    let ctx = context! {
        project_name => &args.project_name,
        database => &args.database,
        flavor => args.flavor,
        base_url => base_url,
        model => model,
        api_key_env => api_key_env,
    };

    create_component(&mut env, &args.path, FileTemplates::Project, &ctx)?;
    create_component(&mut env, &args.path, FileTemplates::Connections, &ctx)?;
    println!("Created {} and {} in {}", FileTemplates::Project, FileTemplates::Connections, args.path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::loader::read_config_with_env;
    use tempfile::tempdir;

    fn args(path: &Path, flavor: Flavor) -> InitArgs {
        InitArgs {
            path: path.to_path_buf(),
            project_name: "my_proj".to_string(),
            database: "sales".to_string(),
            flavor,
        }
    }

    #[test]
    fn generated_project_loads() {
        let dir = tempdir().unwrap();
        handle_init(&args(dir.path(), Flavor::Openai)).unwrap();

        let cfg = read_config_with_env(Some(dir.path().to_path_buf()), |var| {
            (var == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .expect("generated config should load");
        assert_eq!(cfg.project.name, "my_proj");
        assert_eq!(cfg.project.schema.database, "sales");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        let conn = cfg.get_adapter_connection_details().unwrap();
        assert_eq!(conn.database, "sales");
        assert_eq!(conn.statement_timeout_secs, Some(30));
    }

    #[test]
    fn ollama_project_needs_no_key() {
        let dir = tempdir().unwrap();
        handle_init(&args(dir.path(), Flavor::Ollama)).unwrap();

        let yaml = fs::read_to_string(dir.path().join("askdb-project.yml")).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc["llm"]["flavor"].as_str(), Some("ollama"));
        assert!(doc["llm"].get("api_key_env").is_none());

        let cfg = read_config_with_env(Some(dir.path().to_path_buf()), |_| None).unwrap();
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        handle_init(&args(dir.path(), Flavor::Openai)).unwrap();
        let err = handle_init(&args(dir.path(), Flavor::Openai)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn rejects_path_like_database() {
        let dir = tempdir().unwrap();
        let mut bad = args(dir.path(), Flavor::Openai);
        bad.database = "../x".into();
        assert_eq!(
            handle_init(&bad).unwrap_err().kind(),
            std::io::ErrorKind::InvalidInput
        );
    }
}
