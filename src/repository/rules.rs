//! Built-in repository rules

use crate::error::FetchError;
use crate::repository::context::RepositoryContext;
use crate::repository::rule::RepositoryRule;
use crate::repository::spec::{opt_str_attr, str_attr, Attributes};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// Default output path of `http_file`
const DEFAULT_DOWNLOAD_OUTPUT: &str = "file/downloaded";

/// Writes `attrs.files` (relative path to content)
#[derive(Debug, Clone, Copy)]
pub struct FileRule;

#[async_trait]
impl RepositoryRule for FileRule {
    async fn fetch(&self, ctx: &mut RepositoryContext, attrs: &Attributes) -> Result<(), FetchError> {
        let files = match attrs.get("files") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(files)) => files,
            Some(other) => {
                return Err(FetchError::rule(format!(
                    "attribute 'files' must be a table, got {}",
                    other
                )))
            }
        };

        for (path, content) in files {
            let content = content.as_str().ok_or_else(|| {
                FetchError::rule(format!("content of file '{}' must be a string", path))
            })?;
            ctx.write_file(path, content.as_bytes()).await?;
        }
        Ok(())
    }
}

/// Copies the directory at `attrs.path` into the repository
#[derive(Debug, Clone, Copy)]
pub struct LocalPathRule;

#[async_trait]
impl RepositoryRule for LocalPathRule {
    async fn fetch(&self, ctx: &mut RepositoryContext, attrs: &Attributes) -> Result<(), FetchError> {
        let path = str_attr(attrs, "path")?;
        ctx.copy_tree(Path::new(path)).await
    }
}

/// Downloads `attrs.url` into `attrs.output`, checking `attrs.sha256`
#[derive(Debug, Clone, Copy)]
pub struct HttpFileRule;

#[async_trait]
impl RepositoryRule for HttpFileRule {
    async fn fetch(&self, ctx: &mut RepositoryContext, attrs: &Attributes) -> Result<(), FetchError> {
        let url = str_attr(attrs, "url")?;
        let output = opt_str_attr(attrs, "output")?.unwrap_or(DEFAULT_DOWNLOAD_OUTPUT);
        let sha256 = opt_str_attr(attrs, "sha256")?;
        ctx.download(url, output, sha256).await?;
        Ok(())
    }
}

/// Runs `attrs.command` (argv list) inside the repository directory
#[derive(Debug, Clone, Copy)]
pub struct ShellRule;

#[async_trait]
impl RepositoryRule for ShellRule {
    async fn fetch(&self, ctx: &mut RepositoryContext, attrs: &Attributes) -> Result<(), FetchError> {
        let argv: Vec<String> = match attrs.get("command") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| FetchError::rule("command arguments must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(FetchError::rule(format!(
                    "attribute 'command' must be a list, got {}",
                    other
                )))
            }
            None => return Err(FetchError::rule("missing required attribute 'command'")),
        };
        ctx.execute(&argv).await?;
        Ok(())
    }
}
