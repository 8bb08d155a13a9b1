pub mod exec;
pub mod fs;
pub mod process_registry;

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::path_validator::PathValidator;
use fs::ListFilesOptions;
use process_registry::ProcessRegistry;

/// The full tool surface (§4.2), bundling the path validator and the
/// process-wide background-process registry behind one handle each tool
/// wrapper borrows. `cwd` arguments default to `sandbox_root` and are
/// resolved against it before validation.
pub struct ToolSurface {
    validator: PathValidator,
    sandbox_root: PathBuf,
    processes: ProcessRegistry,
}

impl ToolSurface {
    pub fn new(validator: PathValidator, sandbox_root: PathBuf) -> Self {
        Self { validator, sandbox_root, processes: ProcessRegistry::new() }
    }

    fn resolve_cwd(&self, cwd: Option<&str>) -> PathBuf {
        match cwd {
            Some(c) if !c.is_empty() => {
                let p = Path::new(c);
                if p.is_absolute() { p.to_path_buf() } else { self.sandbox_root.join(p) }
            }
            _ => self.sandbox_root.clone(),
        }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() { p.to_path_buf() } else { self.sandbox_root.join(p) }
    }

    pub async fn read_file(
        &self,
        path: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<Value> {
        let result = fs::read_file(&self.validator, &self.resolve_path(path), start_line, end_line).await?;
        Ok(serde_json::to_value(result)?)
    }

    pub async fn write_file(&self, path: &str, content: &str, create_dirs: bool) -> Result<Value> {
        let result = fs::write_file(&self.validator, &self.resolve_path(path), content, create_dirs).await?;
        Ok(Value::String(result))
    }

    pub async fn edit_file(&self, path: &str, old: &str, new: &str) -> Result<Value> {
        let result = fs::edit_file(&self.validator, &self.resolve_path(path), old, new).await?;
        Ok(Value::String(result))
    }

    pub async fn list_files(
        &self,
        directory: &str,
        pattern: Option<&str>,
        recursive: bool,
        include_dirs: bool,
        exclude_patterns: Option<Vec<String>>,
        respect_gitignore: bool,
    ) -> Result<Value> {
        let options = ListFilesOptions {
            pattern: pattern.unwrap_or("*").to_string(),
            recursive,
            include_dirs,
            exclude_patterns,
            respect_gitignore,
        };
        let result = fs::list_files(&self.validator, &self.resolve_path(directory), &options).await?;
        Ok(serde_json::to_value(result)?)
    }

    pub async fn search_in_files(&self, pattern: &str, directory: &str, file_pattern: &str) -> Result<Value> {
        let result = fs::search_in_files(&self.validator, pattern, &self.resolve_path(directory), file_pattern).await?;
        let as_map: serde_json::Map<String, Value> = result
            .into_iter()
            .map(|(file, matches)| (file, serde_json::to_value(matches).unwrap_or(Value::Null)))
            .collect();
        Ok(Value::Object(as_map))
    }

    pub async fn run_command(&self, command: &str, cwd: Option<&str>, timeout: Option<Duration>) -> Result<Value> {
        let result = exec::run_command(command, &self.resolve_cwd(cwd), timeout).await?;
        Ok(serde_json::to_value(result)?)
    }

    pub async fn run_git_command(&self, git_command: &str, cwd: Option<&str>) -> Result<Value> {
        let result = exec::run_git_command(git_command, &self.resolve_cwd(cwd)).await?;
        Ok(Value::String(result))
    }

    pub async fn run_tests(&self, test_path: Option<&str>, cwd: Option<&str>, verbose: bool) -> Result<Value> {
        let result = exec::run_tests(test_path, &self.resolve_cwd(cwd), verbose).await?;
        Ok(serde_json::to_value(result)?)
    }

    pub async fn start_background_process(&self, command: &str, process_id: &str, cwd: Option<&str>) -> Result<Value> {
        let (pid, command) = self.processes.start(command, process_id, &self.resolve_cwd(cwd)).await?;
        Ok(serde_json::json!({"pid": pid, "command": command, "process_id": process_id}))
    }

    pub async fn stop_background_process(&self, process_id: &str) -> Result<Value> {
        self.processes.stop(process_id).await?;
        Ok(Value::String(format!("stopped {process_id}")))
    }

    pub async fn list_background_processes(&self) -> Result<Value> {
        let listed = self.processes.list().await;
        let lines: Vec<String> = listed
            .into_iter()
            .map(|(id, status, pid)| format!("{id}: {status} (pid: {pid})"))
            .collect();
        Ok(Value::String(lines.join("\n")))
    }

    pub async fn get_working_directory(&self) -> Result<Value> {
        Ok(Value::String(fs::get_working_directory(&self.sandbox_root)))
    }

    pub async fn file_exists(&self, path: &str) -> Result<Value> {
        Ok(Value::Bool(fs::file_exists(&self.validator, &self.resolve_path(path)).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(root: &Path) -> ToolSurface {
        ToolSurface::new(PathValidator::new([root]).unwrap(), root.to_path_buf())
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_sandbox_root() {
        let tmp = tempfile::tempdir().unwrap();
        let ts = surface(tmp.path());
        ts.write_file("a.txt", "hi", true).await.unwrap();
        let exists = ts.file_exists("a.txt").await.unwrap();
        assert_eq!(exists, Value::Bool(true));
    }

    #[tokio::test]
    async fn get_working_directory_returns_sandbox_root() {
        let tmp = tempfile::tempdir().unwrap();
        let ts = surface(tmp.path());
        let wd = ts.get_working_directory().await.unwrap();
        assert_eq!(wd, Value::String(tmp.path().display().to_string()));
    }
}
