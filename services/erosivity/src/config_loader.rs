//! Configuration loader for the erosivity pipeline.
//!
//! Reads the YAML run configuration, substitutes `${VAR}` and
//! `${VAR:-default}` from the environment, applies `EROSIVITY_*` overrides,
//! resolves relative paths against the file's folder and validates the
//! result.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::PipelineConfig;

// ============================================================================
// Loading
// ============================================================================

/// Load, expand and validate a pipeline configuration file.
pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<Arc<PipelineConfig>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline config from {:?}", path))?;

    let mut config = parse_pipeline_config(&content)
        .with_context(|| format!("Failed to parse pipeline config from {:?}", path))?;

    config.apply_env_overrides();

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);

    validate_pipeline_config(&config)?;

    debug!(
        config = %path.display(),
        window_start = %config.window.start,
        window_end = %config.window.end,
        targets = ?config.targets,
        "Loaded pipeline configuration"
    );
    Ok(Arc::new(config))
}

/// Parse YAML content after environment substitution.
pub fn parse_pipeline_config(content: &str) -> Result<PipelineConfig> {
    let expanded = expand_env_vars(content)?;
    let config: PipelineConfig =
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse pipeline config YAML")?;
    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content.
/// Supports ${VAR} and ${VAR:-default} syntax.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;

            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        },
        None => std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr)),
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_pipeline_config(config: &PipelineConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid pipeline config: {}", e))?;

    anyhow::ensure!(
        !config.output_dir.as_os_str().is_empty(),
        "output_dir cannot be empty"
    );

    for (kind, dir) in &config.artifacts {
        anyhow::ensure!(
            dir != &config.output_dir.join(kind.key()),
            "artifacts.{} points at the folder the run would write it to",
            kind.key()
        );
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
