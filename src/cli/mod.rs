//! BR-014: CLI subcommands — init, validate, manifest.

use crate::core::{parser, resolver, types};
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a sample pipeline.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate pipeline.yaml and build its graph
    Validate {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,
    },

    /// List every target of the built graph
    Manifest {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
    Yaml,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Manifest { file, format } => cmd_manifest(&file, format),
    }
}

const SAMPLE_PIPELINE: &str = r#"name: methods-study
description: "Two methods, two data sources, one summary table"

externals: [analyze_data, summarize, bind_rows, seed]

targets:
  random_seed: { command: "seed(42)" }

stages:
  - map:
      templates:
        analysis: { command: "analyze_data($method, $data_source)", pattern: "map(random_seed)" }
        summary: { command: "summarize(analysis)", pattern: "map(analysis)" }
      values:
        - { method: { symbol: method1 }, data_source: NIH }
        - { method: { symbol: method2 }, data_source: NIAID }
      names: [data_source]
      descriptions: [data_source]

  - combine:
      name: all_summaries
      groups: [summary]
      command: "bind_rows($.x)"
      label: data_source
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let pipeline_path = path.join("pipeline.yaml");
    if pipeline_path.exists() {
        return Err(format!("{} already exists", pipeline_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&pipeline_path, SAMPLE_PIPELINE)
        .map_err(|e| format!("cannot write {}: {}", pipeline_path.display(), e))?;

    println!("Initialized branchwright project at {}", path.display());
    println!("  Created: {}", pipeline_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let (name, graph) = load_graph(file)?;
    println!("{}", summary(&name, &graph));
    Ok(())
}

fn summary(name: &str, graph: &resolver::Graph) -> String {
    format!(
        "OK: {} ({} targets: {} static, {} pattern; {} edges; {} externals)",
        name,
        graph.len(),
        graph.count(types::NodeKind::Static),
        graph.count(types::NodeKind::Pattern),
        graph.edges().len(),
        graph.externals().len()
    )
}

fn cmd_manifest(file: &Path, format: Format) -> Result<(), String> {
    let (_, graph) = load_graph(file)?;
    print!("{}", render_manifest(&graph.manifest(), format)?);
    Ok(())
}

/// Parse, validate and build a pipeline file.
fn load_graph(file: &Path) -> Result<(String, resolver::Graph), String> {
    let pipeline = parser::parse_pipeline_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_pipeline(&pipeline);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }
    let graph = parser::build_pipeline(&pipeline).map_err(|e| e.to_string())?;
    Ok((pipeline.name, graph))
}

fn render_manifest(entries: &[types::ManifestEntry], format: Format) -> Result<String, String> {
    match format {
        Format::Json => serde_json::to_string_pretty(entries)
            .map(|s| s + "\n")
            .map_err(|e| format!("JSON error: {}", e)),
        Format::Yaml => {
            serde_yaml_ng::to_string(entries).map_err(|e| format!("YAML error: {}", e))
        }
        Format::Text => Ok(render_text(entries)),
    }
}

fn render_text(entries: &[types::ManifestEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!("{} [{}]\n", entry.name, entry.kind));
        out.push_str(&format!("  command: {}\n", entry.command));
        if let Some(pattern) = &entry.pattern {
            out.push_str(&format!("  pattern: {}\n", pattern));
        }
        if !entry.dependencies.is_empty() {
            out.push_str(&format!("  depends: {}\n", entry.dependencies.join(", ")));
        }
        if let Some(description) = &entry.description {
            out.push_str(&format!("  description: {}\n", description));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pipeline(dir: &Path, yaml: &str) -> PathBuf {
        let file = dir.join("pipeline.yaml");
        std::fs::write(&file, yaml).unwrap();
        file
    }

    #[test]
    fn test_br014_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("study");
        cmd_init(&sub).unwrap();
        assert!(sub.join("pipeline.yaml").exists());
    }

    #[test]
    fn test_br014_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pipeline.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_br014_sample_validates() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        cmd_validate(&dir.path().join("pipeline.yaml")).unwrap();
        let (name, graph) = load_graph(&dir.path().join("pipeline.yaml")).unwrap();
        assert_eq!(name, "methods-study");
        assert_eq!(graph.len(), 6);
        assert_eq!(
            summary(&name, &graph),
            "OK: methods-study (6 targets: 2 static, 4 pattern; 6 edges; 4 externals)"
        );
    }

    #[test]
    fn test_br014_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_pipeline(
            dir.path(),
            r#"
name: ""
stages:
  - {}
"#,
        );
        let err = cmd_validate(&file).unwrap_err();
        assert_eq!(err, "2 validation error(s)");
    }

    #[test]
    fn test_br014_validate_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_pipeline(
            dir.path(),
            r#"
name: bad
stages:
  - map:
      templates:
        fit: { command: "fit($model, $missing)" }
      values:
        - { model: lm }
"#,
        );
        let err = cmd_validate(&file).unwrap_err();
        assert!(err.contains("unknown column 'missing'"), "{}", err);
    }

    #[test]
    fn test_br014_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_validate(&dir.path().join("pipeline.yaml")).unwrap_err();
        assert!(err.contains("cannot read"));
    }

    #[test]
    fn test_br014_manifest_formats() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        let (_, graph) = load_graph(&dir.path().join("pipeline.yaml")).unwrap();
        let manifest = graph.manifest();

        let json = render_manifest(&manifest, Format::Json).unwrap();
        let parsed: Vec<types::ManifestEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);

        let yaml = render_manifest(&manifest, Format::Yaml).unwrap();
        let parsed: Vec<types::ManifestEntry> = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed, manifest);

        let text = render_manifest(&manifest, Format::Text).unwrap();
        assert!(text.contains("summary_NIH [pattern]"));
        assert!(text.contains("  depends: summary_NIH, summary_NIAID"));
        assert!(text.contains("random_seed [static]"));
    }

    #[test]
    fn test_br014_manifest_command() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        cmd_manifest(&dir.path().join("pipeline.yaml"), Format::Text).unwrap();
    }
}
